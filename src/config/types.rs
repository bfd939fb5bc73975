//! Configuration sections

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::aggregator::AggregatorSettings;
use crate::arbitrage::ArbitrageSettings;
use crate::notify::{BroadcastSink, NotificationSink, NullSink, TracingSink};
use crate::resolver::TieBreakConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// Maximum provider fetches in flight
    pub max_concurrent_requests: usize,
    /// Per-attempt timeout in milliseconds
    pub provider_timeout_ms: u64,
    /// Overall aggregation budget in milliseconds (0 = wait for all)
    pub aggregation_deadline_ms: u64,
    /// Extra attempts on retryable errors
    pub max_retries: u32,
    /// Base retry delay in milliseconds, doubled per attempt
    pub retry_backoff_ms: u64,
}

impl From<&AggregatorConfig> for AggregatorSettings {
    fn from(cfg: &AggregatorConfig) -> Self {
        Self {
            max_concurrent_requests: cfg.max_concurrent_requests,
            provider_timeout: Duration::from_millis(cfg.provider_timeout_ms),
            deadline: (cfg.aggregation_deadline_ms > 0).then(|| Duration::from_millis(cfg.aggregation_deadline_ms)),
            max_retries: cfg.max_retries,
            retry_backoff: Duration::from_millis(cfg.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Tie-break order, earliest wins
    pub provider_priority: Vec<String>,
    /// American-odds window in which priority beats price (0 = off)
    pub near_tie_tolerance: u32,
}

impl From<&ResolverConfig> for TieBreakConfig {
    fn from(cfg: &ResolverConfig) -> Self {
        Self {
            provider_priority: cfg.provider_priority.clone(),
            near_tie_tolerance: cfg.near_tie_tolerance,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArbitrageConfig {
    /// Minimum guaranteed profit in percent
    pub min_profit_pct: f64,
    /// Notional stake for expected return
    pub minimum_bet_amount: f64,
    /// Cap on reported opportunities (0 = all)
    pub max_results: usize,
    pub urgent_secs: i64,
    pub moderate_secs: i64,
}

impl From<&ArbitrageConfig> for ArbitrageSettings {
    fn from(cfg: &ArbitrageConfig) -> Self {
        Self {
            minimum_bet_amount: cfg.minimum_bet_amount,
            urgent_secs: cfg.urgent_secs,
            moderate_secs: cfg.moderate_secs,
            max_results: (cfg.max_results > 0).then_some(cfg.max_results),
        }
    }
}

/// Where notification events go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Structured log lines
    Tracing,
    /// JSON events on a broadcast channel
    Broadcast,
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Odds moves of at most this many American points are ignored
    pub odds_change_min_delta: u32,
    pub sink: SinkKind,
    /// Broadcast channel capacity, used by the `broadcast` sink
    pub channel_capacity: usize,
}

impl NotificationsConfig {
    /// The configured sink, plus a subscriber when it is a broadcast channel
    pub fn build_sink(&self) -> (Arc<dyn NotificationSink>, Option<broadcast::Receiver<String>>) {
        match self.sink {
            SinkKind::Tracing => (Arc::new(TracingSink), None),
            SinkKind::None => (Arc::new(NullSink), None),
            SinkKind::Broadcast => {
                let sink = BroadcastSink::new(self.channel_capacity);
                let rx = sink.subscribe();
                (Arc::new(sink), Some(rx))
            }
        }
    }
}

/// One HTTP sportsbook endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEndpoint {
    pub name: String,
    pub base_url: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub sport: String,
    /// Restrict every pass to one player
    #[serde(default)]
    pub player: Option<String>,
    pub poll_interval_secs: u64,
    /// Exit after a single pass
    pub run_once: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive, `RUST_LOG` wins when set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}
