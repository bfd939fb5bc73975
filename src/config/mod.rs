//! Configuration management for OddsBot
//!
//! Built-in defaults, then `config/default` and `config/local` files, then
//! `ODDSBOT__SECTION__KEY` environment variables (a `.env` file is honored).

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::resolver::DEFAULT_PROVIDER_PRIORITY;
use crate::runner::PollSettings;
use crate::service::ServiceSettings;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub aggregator: AggregatorConfig,
    pub resolver: ResolverConfig,
    pub arbitrage: ArbitrageConfig,
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub providers: Vec<ProviderEndpoint>,
    pub run: RunConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("ODDSBOT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("resolver.provider_priority")
                    .try_parsing(true),
            );

        let app_config = Self::from_builder(builder)?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Builder holding only the built-in defaults
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            // Aggregator defaults
            .set_default("aggregator.max_concurrent_requests", 5)?
            .set_default("aggregator.provider_timeout_ms", 30_000)?
            .set_default("aggregator.aggregation_deadline_ms", 0)?
            .set_default("aggregator.max_retries", 0)?
            .set_default("aggregator.retry_backoff_ms", 250)?
            // Resolver defaults
            .set_default("resolver.provider_priority", DEFAULT_PROVIDER_PRIORITY.to_vec())?
            .set_default("resolver.near_tie_tolerance", 0)?
            // Arbitrage defaults
            .set_default("arbitrage.min_profit_pct", 2.0)?
            .set_default("arbitrage.minimum_bet_amount", 100.0)?
            .set_default("arbitrage.max_results", 50)?
            .set_default("arbitrage.urgent_secs", 300)?
            .set_default("arbitrage.moderate_secs", 1800)?
            // Notification defaults
            .set_default("notifications.odds_change_min_delta", 10)?
            .set_default("notifications.sink", "tracing")?
            .set_default("notifications.channel_capacity", 256)?
            // Run loop defaults
            .set_default("run.sport", "nba")?
            .set_default("run.poll_interval_secs", 60)?
            .set_default("run.run_once", false)?
            // Logging defaults
            .set_default("logging.level", "oddsbot=info")?
            .set_default("logging.json", false)?;
        Ok(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.aggregator.max_concurrent_requests == 0 {
            bail!("aggregator.max_concurrent_requests must be at least 1");
        }
        if self.aggregator.provider_timeout_ms == 0 {
            bail!("aggregator.provider_timeout_ms must be positive");
        }
        if self.arbitrage.min_profit_pct.is_nan() || self.arbitrage.min_profit_pct < 0.0 {
            bail!("arbitrage.min_profit_pct must be non-negative");
        }
        if self.arbitrage.minimum_bet_amount.is_nan() || self.arbitrage.minimum_bet_amount <= 0.0 {
            bail!("arbitrage.minimum_bet_amount must be positive");
        }
        if self.arbitrage.urgent_secs < 0 || self.arbitrage.moderate_secs < self.arbitrage.urgent_secs {
            bail!("arbitrage.urgent_secs must be non-negative and not above arbitrage.moderate_secs");
        }
        if self.notifications.channel_capacity == 0 {
            bail!("notifications.channel_capacity must be at least 1");
        }
        if !self.run.run_once && self.run.poll_interval_secs == 0 {
            bail!("run.poll_interval_secs must be positive unless run.run_once is set");
        }
        for endpoint in &self.providers {
            if endpoint.name.trim().is_empty() || endpoint.base_url.trim().is_empty() {
                bail!("Every provider needs a name and a base_url");
            }
        }
        Ok(())
    }

    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderEndpoint> {
        self.providers.iter().filter(|p| p.enabled)
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            aggregator: (&self.aggregator).into(),
            tie_break: (&self.resolver).into(),
            arbitrage: (&self.arbitrage).into(),
            odds_change_min_delta: self.notifications.odds_change_min_delta,
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            sport: self.run.sport.clone(),
            player: self.run.player.clone(),
            interval: Duration::from_secs(self.run.poll_interval_secs),
            run_once: self.run.run_once,
            min_profit: self.arbitrage.min_profit_pct,
        }
    }

    /// One-line summary for startup logging
    pub fn digest(&self) -> String {
        let enabled: Vec<&str> = self.enabled_providers().map(|p| p.name.as_str()).collect();
        format!(
            "sport={} providers={:?} concurrency={} timeout_ms={} deadline_ms={} retries={} min_profit={:.2}",
            self.run.sport,
            enabled,
            self.aggregator.max_concurrent_requests,
            self.aggregator.provider_timeout_ms,
            self.aggregator.aggregation_deadline_ms,
            self.aggregator.max_retries,
            self.arbitrage.min_profit_pct
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use tokio::sync::broadcast;

    fn with_toml(toml: &str) -> Result<AppConfig> {
        AppConfig::from_builder(AppConfig::defaults()?.add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_builder(AppConfig::defaults().unwrap()).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.aggregator.max_concurrent_requests, 5);
        assert_eq!(cfg.resolver.provider_priority[0], "DraftKings");
        assert_eq!(cfg.arbitrage.max_results, 50);
        assert!(cfg.providers.is_empty());

        let settings = cfg.service_settings();
        assert!(settings.aggregator.deadline.is_none());
        assert_eq!(settings.arbitrage.max_results, Some(50));
    }

    #[test]
    fn test_file_overrides() {
        let cfg = with_toml(
            r#"
            [aggregator]
            aggregation_deadline_ms = 1500

            [[providers]]
            name = "DraftKings"
            base_url = "http://localhost:9001"

            [[providers]]
            name = "Caesars"
            base_url = "http://localhost:9002"
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(cfg.providers.len(), 2);
        assert_eq!(cfg.enabled_providers().count(), 1);
        assert_eq!(
            cfg.service_settings().aggregator.deadline,
            Some(std::time::Duration::from_millis(1500))
        );
        assert!(cfg.digest().contains("DraftKings"));
    }

    #[test]
    fn test_broadcast_sink_uses_channel_capacity() {
        use crate::changes::OddsChange;
        use crate::notify::NotificationEvent;
        use crate::types::{american_cents, Side};

        let default_cfg = with_toml("").unwrap();
        assert_eq!(default_cfg.notifications.sink, SinkKind::Tracing);
        assert!(default_cfg.notifications.build_sink().1.is_none());

        let cfg = with_toml("[notifications]\nsink = \"broadcast\"\nchannel_capacity = 2").unwrap();
        let (sink, rx) = cfg.notifications.build_sink();
        let mut rx = rx.unwrap();

        let event = |new_odds: i32| {
            NotificationEvent::odds_change(OddsChange {
                provider: "DraftKings".into(),
                sport: "nba".into(),
                event_id: "evt-1".into(),
                player_name: "Jayson Tatum".into(),
                bet_type: "points".into(),
                line: 26.5,
                side: Side::Over,
                old_odds: -120,
                new_odds,
                delta: american_cents(new_odds) - american_cents(-120),
                change_percent: 1.0,
                observed_at: chrono::Utc::now(),
            })
        };
        for odds in [-105, -100, 100] {
            sink.notify(&event(odds));
        }
        // Three sends into a channel of two: the oldest was overwritten
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Lagged(1))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_concurrency = with_toml("[aggregator]\nmax_concurrent_requests = 0").unwrap();
        assert!(zero_concurrency.validate().is_err());

        let negative_profit = with_toml("[arbitrage]\nmin_profit_pct = -1.0").unwrap();
        assert!(negative_profit.validate().is_err());

        let missing_url = with_toml("[[providers]]\nname = \"FanDuel\"\nbase_url = \"\"").unwrap();
        assert!(missing_url.validate().is_err());
    }
}
