//! Generic REST/JSON sportsbook client
//!
//! Fetches `{base_url}/props?sport=..&player=..` and accepts either a bare
//! array of records or an object wrapping one under `data`, `props`,
//! `odds` or `markets`.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::ProviderError;
use crate::providers::{PropsQuery, ProviderClient, RawRecord};

const ENVELOPE_KEYS: [&str; 4] = ["data", "props", "odds", "markets"];

#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpProviderClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn props_url(&self) -> String {
        format!("{}/props", self.base_url)
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn fetch_player_props(&self, query: &PropsQuery) -> Result<Vec<RawRecord>, ProviderError> {
        let mut request = self
            .client
            .get(self.props_url())
            .query(&[("sport", query.sport.as_str())]);
        if let Some(player) = &query.player_name {
            request = request.query(&[("player", player.as_str())]);
        }

        tracing::debug!(provider = %self.name, sport = %query.sport, "Fetching player props");

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body.chars().take(256).collect(),
            });
        }

        let payload: Value = serde_json::from_str(&body)?;
        let records = parse_records(payload)?;

        tracing::debug!(provider = %self.name, count = records.len(), "Player props fetched");
        Ok(records)
    }
}

/// Extract the record list from a response body
pub(crate) fn parse_records(payload: Value) -> Result<Vec<RawRecord>, ProviderError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let key = ENVELOPE_KEYS
                .iter()
                .find(|k| matches!(map.get(**k), Some(Value::Array(_))))
                .ok_or_else(|| ProviderError::Parse("no record array in response".to_string()))?;
            match map.remove(*key) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            }
        }
        _ => return Err(ProviderError::Parse("response is not an array or object".to_string())),
    };

    // Non-object entries are dropped rather than failing the whole feed
    Ok(items
        .into_iter()
        .filter_map(|item| RawRecord::try_from(item).ok())
        .collect())
}
