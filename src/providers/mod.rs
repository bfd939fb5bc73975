//! Sportsbook provider clients
//!
//! Each sportsbook adapter implements [`ProviderClient`] and returns raw,
//! provider-native records. The normalizer turns them into `UnifiedOdds`.

mod http;

pub use http::HttpProviderClient;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::ProviderError;

/// What to fetch from a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropsQuery {
    pub sport: String,
    /// Restrict to one player when set
    pub player_name: Option<String>,
}

impl PropsQuery {
    pub fn new(sport: impl Into<String>, player_name: Option<&str>) -> Self {
        Self {
            sport: sport.into(),
            player_name: player_name.map(str::to_string),
        }
    }
}

/// Trait for sportsbook clients
///
/// Implementations must return `Err` on network, timeout and parse failures
/// so the aggregator can tell "no markets" apart from "failed".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Display name of the sportsbook
    fn name(&self) -> String;

    /// Fetch raw player-prop records
    async fn fetch_player_props(&self, query: &PropsQuery) -> Result<Vec<RawRecord>, ProviderError>;
}

/// One provider-native record, before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    /// JSON object as returned by REST feeds
    Json(Map<String, Value>),
    /// Flat string fields, e.g. scraped tables
    Fields(HashMap<String, String>),
}

/// Borrowed view of a single raw field
#[derive(Debug, Clone, Copy)]
pub enum RawField<'a> {
    Json(&'a Value),
    Text(&'a str),
}

impl RawRecord {
    /// Look up a field, skipping JSON nulls
    pub fn get(&self, key: &str) -> Option<RawField<'_>> {
        match self {
            RawRecord::Json(map) => map
                .get(key)
                .filter(|v| !v.is_null())
                .map(RawField::Json),
            RawRecord::Fields(fields) => fields.get(key).map(|s| RawField::Text(s.as_str())),
        }
    }

    /// First present field among `aliases`, in order
    pub fn first_of(&self, aliases: &[&str]) -> Option<RawField<'_>> {
        aliases.iter().find_map(|k| self.get(k))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawRecord::Json(map) => map.is_empty(),
            RawRecord::Fields(fields) => fields.is_empty(),
        }
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        RawRecord::Json(map)
    }
}

impl From<HashMap<String, String>> for RawRecord {
    fn from(fields: HashMap<String, String>) -> Self {
        RawRecord::Fields(fields)
    }
}

impl TryFrom<Value> for RawRecord {
    type Error = ProviderError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(RawRecord::Json(map)),
            other => Err(ProviderError::Parse(format!(
                "expected object record, got {}",
                json_kind(&other)
            ))),
        }
    }
}

impl<'a> RawField<'a> {
    /// Text form of the field (numbers are rendered, other JSON kinds are not)
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawField::Text(s) => Some(s.trim().to_string()),
            RawField::Json(Value::String(s)) => Some(s.trim().to_string()),
            RawField::Json(Value::Number(n)) => Some(n.to_string()),
            RawField::Json(_) => None,
        }
    }

    /// Numeric form of the field; strings are parsed leniently
    pub fn as_f64(&self) -> Option<f64> {
        let parsed = match self {
            RawField::Json(Value::Number(n)) => n.as_f64(),
            RawField::Json(Value::String(s)) => parse_number(s),
            RawField::Text(s) => parse_number(s),
            RawField::Json(_) => None,
        };
        parsed.filter(|v| v.is_finite())
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    s.strip_prefix('+').unwrap_or(s).parse::<f64>().ok()
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alias_lookup_order() {
        let record = RawRecord::try_from(json!({
            "player": "Aaron Judge",
            "playerName": "A. Judge",
            "bet_type": null,
        }))
        .unwrap();

        let name = record.first_of(&["player_name", "playerName", "player"]).unwrap();
        assert_eq!(name.as_text().as_deref(), Some("A. Judge"));
        // nulls count as missing
        assert!(record.first_of(&["bet_type"]).is_none());
    }

    #[test]
    fn test_lenient_numbers() {
        let mut fields = HashMap::new();
        fields.insert("odds".to_string(), " +150 ".to_string());
        fields.insert("line".to_string(), "not-a-number".to_string());
        let record = RawRecord::from(fields);

        assert_eq!(record.get("odds").and_then(|f| f.as_f64()), Some(150.0));
        assert_eq!(record.get("line").and_then(|f| f.as_f64()), None);
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(RawRecord::try_from(json!([1, 2])).is_err());
    }
}
