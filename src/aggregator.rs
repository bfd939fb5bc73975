//! Odds Aggregator - Concurrent fan-out over every configured sportsbook
//!
//! One task per provider on a `JoinSet`, bounded by a shared semaphore.
//! Each attempt has its own timeout and panic guard, so a slow or broken
//! provider only ever costs its own quotes.

use futures_util::FutureExt;
use rand::Rng;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::normalizer::{NormalizeContext, OddsNormalizer};
use crate::providers::{PropsQuery, ProviderClient, RawRecord};
use crate::tracker::PerformanceTracker;
use crate::types::UnifiedOdds;

/// Upper bound of the random share added to each backoff
const MAX_JITTER_FRACTION: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    /// In-flight provider fetches allowed at once
    pub max_concurrent_requests: usize,
    /// Budget for a single attempt
    pub provider_timeout: Duration,
    /// Overall budget for one aggregation call, `None` waits for everyone
    pub deadline: Option<Duration>,
    /// Extra attempts after a retryable failure
    pub max_retries: u32,
    /// Base delay, doubled per attempt
    pub retry_backoff: Duration,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 5,
            provider_timeout: Duration::from_secs(30),
            deadline: None,
            max_retries: 0,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// A provider that did not contribute quotes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: String,
}

/// Everything one aggregation call produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregationOutcome {
    pub odds: Vec<UnifiedOdds>,
    pub succeeded: Vec<String>,
    pub failed: Vec<ProviderFailure>,
    /// Still running when the deadline hit
    pub pending: Vec<String>,
    pub elapsed: Duration,
}

pub struct OddsAggregator {
    providers: Vec<Arc<dyn ProviderClient>>,
    tracker: Arc<PerformanceTracker>,
    normalizer: OddsNormalizer,
    settings: AggregatorSettings,
    semaphore: Arc<Semaphore>,
}

impl OddsAggregator {
    pub fn new(
        providers: Vec<Arc<dyn ProviderClient>>,
        tracker: Arc<PerformanceTracker>,
        settings: AggregatorSettings,
    ) -> Self {
        for provider in &providers {
            tracker.register(provider.name());
        }
        let semaphore = Arc::new(Semaphore::new(settings.max_concurrent_requests.max(1)));
        Self {
            providers,
            tracker,
            normalizer: OddsNormalizer::new(),
            settings,
            semaphore,
        }
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    /// Merged quotes from every provider that answered
    pub async fn fetch_all(&self, sport: &str, player_name: Option<&str>) -> Vec<UnifiedOdds> {
        self.fetch_all_detailed(sport, player_name).await.odds
    }

    pub async fn fetch_all_detailed(&self, sport: &str, player_name: Option<&str>) -> AggregationOutcome {
        self.fetch_with_deadline(sport, player_name, self.settings.deadline).await
    }

    /// Same as [`fetch_all_detailed`](Self::fetch_all_detailed) with a
    /// per-call deadline instead of the configured one
    pub async fn fetch_with_deadline(
        &self,
        sport: &str,
        player_name: Option<&str>,
        deadline: Option<Duration>,
    ) -> AggregationOutcome {
        let started = Instant::now();

        if self.providers.is_empty() {
            debug!(sport = %sport, "No providers configured");
            return AggregationOutcome::default();
        }

        let query = Arc::new(PropsQuery::new(sport, player_name));
        let mut tasks = JoinSet::new();
        let mut outstanding: Vec<String> = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let name = provider.name();
            outstanding.push(name.clone());

            let job = ProviderJob {
                name,
                provider: provider.clone(),
                query: query.clone(),
                tracker: self.tracker.clone(),
                normalizer: self.normalizer.clone(),
                semaphore: self.semaphore.clone(),
                settings: self.settings.clone(),
            };
            tasks.spawn(job.run());
        }

        let deadline_at = deadline.map(|d| started + d);
        let mut collector = Collector::new(outstanding);

        loop {
            let joined = match deadline_at {
                Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tasks.abort_all();
                        collector.expire();
                        warn!(
                            sport = %sport,
                            pending = ?collector.outcome.pending,
                            "Aggregation deadline reached, returning partial results"
                        );
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            let Some(joined) = joined else { break };
            collector.absorb(joined);
        }

        let outcome = collector.finish(&self.tracker, started.elapsed());

        info!(
            sport = %sport,
            quotes = outcome.odds.len(),
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            pending = outcome.pending.len(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Aggregation complete"
        );
        outcome
    }
}

type TaskOutput = (String, Result<Vec<UnifiedOdds>, ProviderError>);

/// Bookkeeping for one aggregation call
struct Collector {
    outcome: AggregationOutcome,
    /// Providers that have not reported back yet
    outstanding: Vec<String>,
    /// Errors of tasks that ended without reporting back
    lost: Vec<String>,
}

impl Collector {
    fn new(outstanding: Vec<String>) -> Self {
        Self {
            outcome: AggregationOutcome::default(),
            outstanding,
            lost: Vec::new(),
        }
    }

    fn absorb(&mut self, joined: Result<TaskOutput, JoinError>) {
        match joined {
            Ok((name, result)) => {
                if let Some(pos) = self.outstanding.iter().position(|n| *n == name) {
                    self.outstanding.swap_remove(pos);
                }
                match result {
                    Ok(odds) => {
                        self.outcome.odds.extend(odds);
                        self.outcome.succeeded.push(name);
                    }
                    Err(e) => self.outcome.failed.push(ProviderFailure {
                        provider: name,
                        reason: e.to_string(),
                    }),
                }
            }
            Err(e) => {
                warn!(error = %e, "Provider task did not complete");
                self.lost.push(e.to_string());
            }
        }
    }

    /// Deadline hit: whoever is still running is pending, not failed
    fn expire(&mut self) {
        self.outstanding.sort();
        self.outcome.pending = std::mem::take(&mut self.outstanding);
    }

    fn finish(mut self, tracker: &PerformanceTracker, elapsed: Duration) -> AggregationOutcome {
        // A join error carries no provider name, so pair leftovers with the
        // collected errors in any order
        self.outstanding.sort();
        for name in std::mem::take(&mut self.outstanding) {
            let reason = self
                .lost
                .pop()
                .unwrap_or_else(|| "provider task did not complete".to_string());
            tracker.record_failure(&name, None);
            self.outcome.failed.push(ProviderFailure { provider: name, reason });
        }

        self.outcome.elapsed = elapsed;
        self.outcome.succeeded.sort();
        self.outcome.failed.sort_by(|a, b| a.provider.cmp(&b.provider));
        self.outcome
    }
}

/// Everything one provider task owns
struct ProviderJob {
    name: String,
    provider: Arc<dyn ProviderClient>,
    query: Arc<PropsQuery>,
    tracker: Arc<PerformanceTracker>,
    normalizer: OddsNormalizer,
    semaphore: Arc<Semaphore>,
    settings: AggregatorSettings,
}

impl ProviderJob {
    async fn run(self) -> TaskOutput {
        let mut attempt: u32 = 0;
        loop {
            match self.attempt().await {
                Ok(records) => {
                    let ctx = NormalizeContext::new(self.name.as_str(), self.query.sport.as_str())
                        .with_confidence(self.tracker.reliability(&self.name));
                    let odds = self.normalizer.normalize_batch(&records, &ctx);
                    debug!(provider = %self.name, records = odds.len(), "Provider fetch succeeded");
                    return (self.name, Ok(odds));
                }
                Err(e) if e.is_retryable() && attempt < self.settings.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        provider = %self.name,
                        error = %e,
                        attempt = attempt + 1,
                        retry_in_ms = delay.as_millis() as u64,
                        "Provider fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(provider = %self.name, error = %e, "Provider fetch failed");
                    return (self.name, Err(e));
                }
            }
        }
    }

    /// One timed, panic-guarded call, recorded in the tracker
    async fn attempt(&self) -> Result<Vec<RawRecord>, ProviderError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("semaphore closed: {}", e)))?;

        let started = Instant::now();
        // The call itself sits inside the async block so a panic while
        // building the future is caught too
        let guarded = AssertUnwindSafe(async { self.provider.fetch_player_props(&self.query).await })
            .catch_unwind();

        let result = match tokio::time::timeout(self.settings.provider_timeout, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ProviderError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(ProviderError::Timeout(self.settings.provider_timeout)),
        };
        let latency = started.elapsed();

        match &result {
            Ok(_) => self.tracker.record_success(&self.name, latency),
            Err(_) => self.tracker.record_failure(&self.name, Some(latency)),
        }
        result
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.settings.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
        let jitter = rand::thread_rng().gen_range(0.0..=MAX_JITTER_FRACTION);
        base + base.mul_f64(jitter)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockProviderClient;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(player: &str, odds: i32, side: &str) -> RawRecord {
        RawRecord::try_from(json!({
            "player_name": player,
            "bet_type": "points",
            "line": 25.5,
            "odds": odds,
            "side": side,
        }))
        .unwrap()
    }

    fn mock(name: &'static str, result: Result<Vec<RawRecord>, ProviderError>) -> Arc<dyn ProviderClient> {
        let mut mock = MockProviderClient::new();
        mock.expect_name().return_const(name.to_string());
        mock.expect_fetch_player_props()
            .returning(move |_| result.clone());
        Arc::new(mock)
    }

    fn aggregator(providers: Vec<Arc<dyn ProviderClient>>, settings: AggregatorSettings) -> OddsAggregator {
        OddsAggregator::new(providers, Arc::new(PerformanceTracker::new()), settings)
    }

    #[tokio::test]
    async fn test_merges_successful_providers() {
        let agg = aggregator(
            vec![
                mock("DraftKings", Ok(vec![record("LeBron James", -110, "over")])),
                mock("FanDuel", Ok(vec![record("LeBron James", -105, "under"), record("Luka Doncic", 120, "over")])),
            ],
            AggregatorSettings::default(),
        );

        let outcome = agg.fetch_all_detailed("nba", None).await;
        assert_eq!(outcome.odds.len(), 3);
        assert_eq!(outcome.succeeded, vec!["DraftKings", "FanDuel"]);
        assert!(outcome.failed.is_empty());
        // First success ever: reliability 1.0 feeds the confidence score
        assert!(outcome.odds.iter().all(|o| o.confidence_score == 1.0));
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_recorded() {
        let agg = aggregator(
            vec![
                mock("Caesars", Err(ProviderError::Transport("connection reset".into()))),
                mock("BetMGM", Ok(vec![record("Jayson Tatum", 100, "over")])),
            ],
            AggregatorSettings::default(),
        );

        let odds = agg.fetch_all("nba", None).await;
        assert_eq!(odds.len(), 1);
        assert_eq!(odds[0].provider, "BetMGM");

        let stats = agg.tracker().stats("Caesars").unwrap();
        assert_eq!((stats.requests, stats.failures), (1, 1));
    }

    #[tokio::test]
    async fn test_panic_becomes_provider_failure() {
        let mut broken = MockProviderClient::new();
        broken.expect_name().return_const("PointsBet".to_string());
        broken.expect_fetch_player_props().returning(|_| panic!("feed exploded"));

        let agg = aggregator(
            vec![Arc::new(broken), mock("DraftKings", Ok(vec![record("Joel Embiid", -120, "over")]))],
            AggregatorSettings::default(),
        );

        let outcome = agg.fetch_all_detailed("nba", None).await;
        assert_eq!(outcome.odds.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].reason.contains("feed exploded"));
        assert_eq!(agg.tracker().stats("PointsBet").unwrap().failures, 1);
    }

    #[tokio::test]
    async fn test_retries_retryable_errors_only() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut flaky = MockProviderClient::new();
        flaky.expect_name().return_const("FanDuel".to_string());
        flaky.expect_fetch_player_props().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ProviderError::Status { status: 503, body: String::new() })
            } else {
                Ok(vec![record("Nikola Jokic", -115, "over")])
            }
        });

        let settings = AggregatorSettings {
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
            ..AggregatorSettings::default()
        };
        let agg = aggregator(
            vec![Arc::new(flaky), mock("BetMGM", Err(ProviderError::Parse("bad json".into())))],
            settings,
        );

        let outcome = agg.fetch_all_detailed("nba", None).await;
        assert_eq!(outcome.odds.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let fanduel = agg.tracker().stats("FanDuel").unwrap();
        assert_eq!((fanduel.requests, fanduel.failures, fanduel.successes), (2, 1, 1));
        // Parse errors are final
        assert_eq!(agg.tracker().stats("BetMGM").unwrap().requests, 1);
    }

    #[tokio::test]
    async fn test_no_providers_is_empty() {
        let agg = aggregator(Vec::new(), AggregatorSettings::default());
        let outcome = agg.fetch_all_detailed("nba", Some("Anyone")).await;
        assert!(outcome.odds.is_empty());
        assert!(outcome.succeeded.is_empty() && outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn test_task_that_dies_is_reported_failed() {
        let mut set = JoinSet::new();
        set.spawn(async {
            let output: TaskOutput = (String::new(), Ok(Vec::new()));
            if output.0.is_empty() {
                panic!("task lost");
            }
            output
        });
        let err = set.join_next().await.unwrap().unwrap_err();

        let tracker = PerformanceTracker::with_providers(["DraftKings", "FanDuel"]);
        let mut collector = Collector::new(vec!["DraftKings".into(), "FanDuel".into()]);
        collector.absorb(Ok(("FanDuel".into(), Ok(Vec::new()))));
        collector.absorb(Err(err));

        let outcome = collector.finish(&tracker, Duration::ZERO);
        assert_eq!(outcome.succeeded, vec!["FanDuel"]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].provider, "DraftKings");
        assert!(outcome.pending.is_empty());
        assert_eq!(tracker.stats("DraftKings").unwrap().failures, 1);
    }

    #[test]
    fn test_expired_providers_are_pending_not_failed() {
        let tracker = PerformanceTracker::with_providers(["BetMGM", "Caesars"]);
        let mut collector = Collector::new(vec!["Caesars".into(), "BetMGM".into()]);
        collector.expire();

        let outcome = collector.finish(&tracker, Duration::ZERO);
        assert_eq!(outcome.pending, vec!["BetMGM", "Caesars"]);
        assert!(outcome.failed.is_empty());
        assert_eq!(tracker.stats("BetMGM").unwrap().requests, 0);
    }

    #[test]
    fn test_backoff_grows_with_bounded_jitter() {
        let job = ProviderJob {
            name: "DraftKings".into(),
            provider: mock("DraftKings", Ok(Vec::new())),
            query: Arc::new(PropsQuery::new("nba", None)),
            tracker: Arc::new(PerformanceTracker::new()),
            normalizer: OddsNormalizer::new(),
            semaphore: Arc::new(Semaphore::new(1)),
            settings: AggregatorSettings {
                retry_backoff: Duration::from_millis(100),
                ..AggregatorSettings::default()
            },
        };
        for attempt in 0..4 {
            let base = Duration::from_millis(100 * 2u64.pow(attempt));
            let delay = job.backoff(attempt);
            assert!(delay >= base);
            assert!(delay <= base.mul_f64(1.0 + MAX_JITTER_FRACTION));
        }
    }
}
