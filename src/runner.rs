//! Polling loop around [`UnifiedSportsbookService`]
//!
//! One shutdown future lives for the whole loop and is raced against both
//! the idle wait and every pass, so a signal during a slow pass is not lost.

use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::service::UnifiedSportsbookService;
use crate::types::UnifiedOdds;

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub sport: String,
    pub player: Option<String>,
    pub interval: Duration,
    /// Stop after the first completed pass
    pub run_once: bool,
    /// Arbitrage floor in percent
    pub min_profit: f64,
}

/// Counts from one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub quotes: usize,
    pub markets: usize,
    pub arbitrage: usize,
    pub odds_changes: usize,
}

/// Run passes until `shutdown` resolves (or once, with `run_once`).
/// Returns the number of completed passes.
pub async fn run_until<F>(service: &UnifiedSportsbookService, settings: &PollSettings, shutdown: F) -> usize
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(settings.interval.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut previous: Vec<UnifiedOdds> = Vec::new();
    let mut passes = 0usize;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }

        let pass = tokio::select! {
            result = run_pass(service, settings, &previous) => Some(result),
            _ = &mut shutdown => None,
        };
        let Some((odds, _summary)) = pass else {
            info!("Shutdown signal received mid-pass, abandoning it");
            break;
        };

        previous = odds;
        passes += 1;
        if settings.run_once {
            break;
        }
    }
    passes
}

/// Fetch, resolve, detect arbitrage and odds moves, log health
pub async fn run_pass(
    service: &UnifiedSportsbookService,
    settings: &PollSettings,
    previous: &[UnifiedOdds],
) -> (Vec<UnifiedOdds>, PassSummary) {
    let outcome = service.aggregate(&settings.sport, settings.player.as_deref()).await;
    for failure in &outcome.failed {
        warn!(provider = %failure.provider, reason = %failure.reason, "Provider skipped this pass");
    }

    let best = service.find_best_odds(&outcome.odds);
    let arbs = service
        .find_arbitrage_opportunities(&outcome.odds, settings.min_profit)
        .await;
    let changes = if previous.is_empty() {
        Vec::new()
    } else {
        service.publish_odds_changes(previous, &outcome.odds)
    };

    let summary = PassSummary {
        quotes: outcome.odds.len(),
        markets: best.len(),
        arbitrage: arbs.len(),
        odds_changes: changes.len(),
    };

    let report = service.get_performance_report();
    info!(
        quotes = summary.quotes,
        markets = summary.markets,
        arbitrage = summary.arbitrage,
        odds_changes = summary.odds_changes,
        pending = outcome.pending.len(),
        healthy = report.summary.healthy_providers,
        degraded = report.summary.degraded_providers,
        fastest = report.summary.fastest_provider.as_deref().unwrap_or("-"),
        "Pass complete"
    );

    (outcome.odds, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::{PropsQuery, ProviderClient, RawRecord};
    use crate::service::ServiceSettings;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct SlowBook {
        delay: Duration,
    }

    #[async_trait]
    impl ProviderClient for SlowBook {
        fn name(&self) -> String {
            "DraftKings".to_string()
        }

        async fn fetch_player_props(&self, _query: &PropsQuery) -> Result<Vec<RawRecord>, ProviderError> {
            tokio::time::sleep(self.delay).await;
            let raw = json!({
                "player_name": "Anthony Edwards",
                "bet_type": "points",
                "line": 26.5,
                "odds": -110,
                "side": "over",
            });
            Ok(vec![RawRecord::try_from(raw)?])
        }
    }

    fn service(delay: Duration) -> UnifiedSportsbookService {
        UnifiedSportsbookService::new(vec![Arc::new(SlowBook { delay })], ServiceSettings::default())
    }

    fn settings(run_once: bool) -> PollSettings {
        PollSettings {
            sport: "nba".into(),
            player: None,
            interval: Duration::from_secs(60),
            run_once,
            min_profit: 2.0,
        }
    }

    #[tokio::test]
    async fn test_run_once_completes_one_pass() {
        let passes = run_until(&service(Duration::ZERO), &settings(true), std::future::pending()).await;
        assert_eq!(passes, 1);
    }

    #[tokio::test]
    async fn test_shutdown_during_pass_is_honored() {
        let svc = service(Duration::from_secs(20));
        let shutdown = tokio::time::sleep(Duration::from_millis(100));

        let passes = tokio::time::timeout(Duration::from_secs(5), run_until(&svc, &settings(false), shutdown))
            .await
            .expect("loop ignored shutdown during a pass");
        assert_eq!(passes, 0);
    }

    #[tokio::test]
    async fn test_shutdown_between_passes_is_honored() {
        let svc = service(Duration::ZERO);
        let shutdown = tokio::time::sleep(Duration::from_millis(200));

        let passes = tokio::time::timeout(Duration::from_secs(5), run_until(&svc, &settings(false), shutdown))
            .await
            .expect("loop ignored shutdown while idle");
        assert_eq!(passes, 1);
    }

    #[tokio::test]
    async fn test_second_pass_reports_odds_changes() {
        let svc = service(Duration::ZERO);
        let mut previous = run_pass(&svc, &settings(true), &[]).await.0;
        for quote in &mut previous {
            quote.odds = -140;
        }

        let (odds, summary) = run_pass(&svc, &settings(true), &previous).await;
        assert_eq!(odds.len(), 1);
        assert_eq!(summary.odds_changes, 1);
        assert_eq!(summary.markets, 1);
    }
}
