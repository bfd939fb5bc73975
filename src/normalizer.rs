//! Odds Normalizer - Maps provider-native records onto `UnifiedOdds`
//!
//! Every field is resolved through an ordered alias list and coerced
//! defensively. Normalization is total: anomalies fall back to defaults and
//! are only visible at debug level.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::providers::{RawField, RawRecord};
use crate::types::{american_to_decimal, decimal_to_american, MarketType, OddsStatus, Side, UnifiedOdds};

const EVENT_ID: &[&str] = &["event_id", "eventId", "fixture_id", "fixtureId", "id"];
const MARKET_ID: &[&str] = &["market_id", "marketId"];
const PLAYER_NAME: &[&str] = &["player_name", "playerName", "player"];
const TEAM: &[&str] = &["team", "team_name", "teamName"];
const OPPONENT: &[&str] = &["opponent", "opponent_name", "opp"];
const LEAGUE: &[&str] = &["league", "competition"];
const SPORT: &[&str] = &["sport", "sport_key"];
const MARKET_TYPE: &[&str] = &["market_type", "marketType"];
const BET_TYPE: &[&str] = &["bet_type", "betType", "stat_type", "market"];
const LINE: &[&str] = &["line", "point", "handicap", "points"];
const ODDS: &[&str] = &["odds", "american_odds", "americanOdds", "price", "over_odds"];
const DECIMAL_ODDS: &[&str] = &["decimal_odds", "decimalOdds"];
const SIDE: &[&str] = &["side", "selection", "outcome", "type"];
const TIMESTAMP: &[&str] = &["timestamp", "fetched_at", "updated_at", "last_update", "lastUpdate"];
const GAME_TIME: &[&str] = &["game_time", "gameTime", "start_time", "startTime", "commence_time"];
const STATUS: &[&str] = &["status"];

/// Epoch values above this are taken as milliseconds
const EPOCH_MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// Per-provider context for one batch of records
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    /// Provider display name
    pub provider: String,
    /// Sport the batch was requested for
    pub sport: String,
    /// Instant the batch was fetched, default for missing timestamps
    pub fetched_at: DateTime<Utc>,
    /// Provider reliability at fetch time
    pub confidence_score: f64,
}

impl NormalizeContext {
    pub fn new(provider: impl Into<String>, sport: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            sport: sport.into(),
            fetched_at: Utc::now(),
            confidence_score: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence_score: f64) -> Self {
        self.confidence_score = confidence_score.clamp(0.0, 1.0);
        self
    }

    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = fetched_at;
        self
    }

    /// Short lowercase provider identifier used in synthesized market ids
    fn provider_slug(&self) -> String {
        self.provider
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase()
    }
}

/// Stateless record normalizer
#[derive(Debug, Clone, Default)]
pub struct OddsNormalizer;

impl OddsNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize every record of a provider batch
    pub fn normalize_batch(&self, records: &[RawRecord], ctx: &NormalizeContext) -> Vec<UnifiedOdds> {
        records.iter().map(|r| self.normalize(r, ctx)).collect()
    }

    /// Normalize one raw record. Never fails.
    pub fn normalize(&self, raw: &RawRecord, ctx: &NormalizeContext) -> UnifiedOdds {
        let event_id = text(raw, EVENT_ID);
        let player_name = text(raw, PLAYER_NAME);
        let bet_type = text(raw, BET_TYPE);

        let market_type = raw
            .first_of(MARKET_TYPE)
            .and_then(|f| f.as_text())
            .and_then(|s| MarketType::from_str(&s))
            .unwrap_or(if player_name.is_empty() {
                MarketType::GameLines
            } else {
                MarketType::PlayerProps
            });

        let market_id = match raw.first_of(MARKET_ID).and_then(|f| f.as_text()) {
            Some(id) if !id.is_empty() => id,
            _ => format!("{}_{}_{}", ctx.provider_slug(), event_id, bet_type),
        };

        let odds = self.resolve_odds(raw, &ctx.provider);
        let side = match raw.first_of(SIDE).and_then(|f| f.as_text()) {
            Some(s) => Side::from_str(&s).unwrap_or_else(|| {
                tracing::debug!(provider = %ctx.provider, side = %s, "Unknown side, inferring from odds");
                Side::infer(odds, market_type)
            }),
            None => Side::infer(odds, market_type),
        };

        let sport = match text(raw, SPORT) {
            s if s.is_empty() => ctx.sport.clone(),
            s => s,
        };

        UnifiedOdds {
            provider: ctx.provider.clone(),
            event_id,
            market_id,
            player_name,
            team: text(raw, TEAM),
            opponent: text(raw, OPPONENT),
            league: text(raw, LEAGUE),
            sport,
            market_type,
            bet_type,
            line: raw.first_of(LINE).and_then(|f| f.as_f64()).unwrap_or(0.0),
            odds,
            decimal_odds: american_to_decimal(odds),
            side,
            timestamp: instant(raw, TIMESTAMP).unwrap_or(ctx.fetched_at),
            game_time: instant(raw, GAME_TIME).unwrap_or(ctx.fetched_at),
            status: raw
                .first_of(STATUS)
                .and_then(|f| f.as_text())
                .map(|s| OddsStatus::from_str(&s))
                .unwrap_or_default(),
            confidence_score: ctx.confidence_score,
        }
    }

    /// American price, recovered from decimal odds if the provider omitted it
    fn resolve_odds(&self, raw: &RawRecord, provider: &str) -> i32 {
        let american = raw
            .first_of(ODDS)
            .and_then(|f| f.as_f64())
            .filter(|v| v.abs() < i32::MAX as f64)
            .map(|v| v.round() as i32)
            .unwrap_or(0);
        if american != 0 {
            return american;
        }

        let recovered = raw
            .first_of(DECIMAL_ODDS)
            .and_then(|f| f.as_f64())
            .map(decimal_to_american)
            .unwrap_or(0);
        if recovered == 0 {
            tracing::debug!(provider = %provider, "Record has no usable price, defaulting odds to 0");
        }
        recovered
    }
}

fn text(raw: &RawRecord, aliases: &[&str]) -> String {
    raw.first_of(aliases).and_then(|f| f.as_text()).unwrap_or_default()
}

fn instant(raw: &RawRecord, aliases: &[&str]) -> Option<DateTime<Utc>> {
    aliases.iter().filter_map(|k| raw.get(k)).find_map(parse_instant)
}

/// Parse an ISO-8601 string or an epoch number into a UTC instant
pub fn parse_instant(field: RawField<'_>) -> Option<DateTime<Utc>> {
    if let RawField::Json(serde_json::Value::Number(n)) = field {
        return n.as_f64().and_then(from_epoch);
    }

    let s = field.as_text()?;
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    s.parse::<f64>().ok().and_then(from_epoch)
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let millis = if value >= EPOCH_MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    Utc.timestamp_millis_opt(millis as i64).single()
}
