//! Notification sinks for arbitrage alerts and odds changes
//!
//! Delivery is fire-and-forget: `notify` must return immediately and the
//! core never depends on whether anyone received the event.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::changes::OddsChange;
use crate::types::ArbitrageOpportunity;

/// Arbitrage alerts go stale quickly
const ARBITRAGE_ALERT_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NotificationPayload {
    ArbitrageOpportunity(ArbitrageOpportunity),
    OddsChange(OddsChange),
}

/// Event handed to a [`NotificationSink`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub priority: NotificationPriority,
    pub sport: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payload: NotificationPayload,
}

impl NotificationEvent {
    pub fn arbitrage(sport: &str, opportunity: ArbitrageOpportunity) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            priority: NotificationPriority::High,
            sport: sport.to_string(),
            created_at: now,
            expires_at: Some(now + Duration::minutes(ARBITRAGE_ALERT_TTL_MINUTES)),
            payload: NotificationPayload::ArbitrageOpportunity(opportunity),
        }
    }

    pub fn odds_change(change: OddsChange) -> Self {
        Self {
            id: Uuid::new_v4(),
            priority: NotificationPriority::Medium,
            sport: change.sport.clone(),
            created_at: Utc::now(),
            expires_at: None,
            payload: NotificationPayload::OddsChange(change),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self.payload {
            NotificationPayload::ArbitrageOpportunity(_) => "arbitrage_opportunity",
            NotificationPayload::OddsChange(_) => "odds_change",
        }
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            NotificationPayload::ArbitrageOpportunity(arb) => write!(
                f,
                "Arbitrage: {} {} {} | {:.2}% via {} / {}",
                arb.player_name,
                arb.bet_type,
                arb.line,
                arb.guaranteed_profit_percentage,
                arb.over_provider,
                arb.under_provider
            ),
            NotificationPayload::OddsChange(change) => write!(
                f,
                "Odds changed: {} {} {} {} | {}: {} -> {}",
                change.player_name,
                change.bet_type,
                change.line,
                change.side,
                change.provider,
                change.old_odds,
                change.new_odds
            ),
        }
    }
}

/// Receiver of finished events
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &NotificationEvent);
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _event: &NotificationEvent) {}
}

/// Writes every event as a structured log line
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: &NotificationEvent) {
        tracing::info!(
            event_type = event.event_type(),
            priority = ?event.priority,
            sport = %event.sport,
            id = %event.id,
            "{}",
            event
        );
    }
}

/// Fans events out to subscribers as JSON strings
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<String>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, event: &NotificationEvent) {
        match serde_json::to_string(event) {
            // No receivers is fine
            Ok(json) => {
                let _ = self.tx.send(json);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceLevel, TimeSensitivity};

    fn opportunity() -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            player_name: "Aaron Judge".into(),
            bet_type: "home_runs".into(),
            line: 0.5,
            over_odds: 120,
            over_provider: "DraftKings".into(),
            over_stake_percentage: 48.8,
            under_odds: 110,
            under_provider: "FanDuel".into(),
            under_stake_percentage: 51.2,
            guaranteed_profit_percentage: 6.93,
            minimum_bet_amount: 100.0,
            expected_return: 107.45,
            confidence_level: ConfidenceLevel::Medium,
            time_sensitivity: TimeSensitivity::Urgent,
        }
    }

    #[test]
    fn test_arbitrage_event_shape() {
        let event = NotificationEvent::arbitrage("mlb", opportunity());
        assert_eq!(event.event_type(), "arbitrage_opportunity");
        assert_eq!(event.priority, NotificationPriority::High);
        assert!(event.expires_at.unwrap() > event.created_at);

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "arbitrage_opportunity");
        assert_eq!(json["data"]["over_provider"], "DraftKings");
        assert_eq!(json["priority"], "high");
    }

    #[test]
    fn test_broadcast_without_receivers_is_silent() {
        let sink = BroadcastSink::new(4);
        sink.notify(&NotificationEvent::arbitrage("mlb", opportunity()));
    }

    #[tokio::test]
    async fn test_broadcast_delivers_json() {
        let sink = BroadcastSink::new(4);
        let mut rx = sink.subscribe();
        sink.notify(&NotificationEvent::arbitrage("mlb", opportunity()));

        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("\"arbitrage_opportunity\""));
    }
}
