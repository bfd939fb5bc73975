//! Performance Tracker - Rolling reliability and latency per provider
//!
//! Each provider owns its own `Mutex<ProviderStats>`. The outer map is only
//! write-locked to register a provider, so concurrent completions from
//! different providers never contend with each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Reliability above which a provider counts as healthy
pub const HEALTHY_RELIABILITY: f64 = 0.8;

/// Counters for one provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    /// Running mean over attempts with timing
    pub avg_response_time_ms: f64,
    pub last_success: Option<DateTime<Utc>>,
    /// successes / requests, 0 before the first request
    pub reliability_score: f64,
    #[serde(skip)]
    timed_attempts: u64,
}

impl ProviderStats {
    fn record(&mut self, success: bool, latency: Option<Duration>) {
        self.requests += 1;
        if success {
            self.successes += 1;
            self.last_success = Some(Utc::now());
        } else {
            self.failures += 1;
        }
        self.reliability_score = self.successes as f64 / self.requests as f64;

        if let Some(latency) = latency {
            let ms = latency.as_secs_f64() * 1000.0;
            self.timed_attempts += 1;
            self.avg_response_time_ms += (ms - self.avg_response_time_ms) / self.timed_attempts as f64;
        }
    }

    pub fn has_timing(&self) -> bool {
        self.timed_attempts > 0
    }
}

/// Fleet-wide health summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_providers: usize,
    pub healthy_providers: usize,
    pub degraded_providers: usize,
    pub avg_reliability: f64,
    /// Lowest mean latency among providers with timing samples
    pub fastest_provider: Option<String>,
}

/// Snapshot returned by [`PerformanceTracker::report`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub providers: BTreeMap<String, ProviderStats>,
    pub summary: PerformanceSummary,
}

#[derive(Debug, Default)]
pub struct PerformanceTracker {
    stats: RwLock<HashMap<String, Arc<Mutex<ProviderStats>>>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker with the given providers pre-registered
    pub fn with_providers<I, S>(providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tracker = Self::new();
        for provider in providers {
            tracker.register(provider);
        }
        tracker
    }

    /// Register a provider; no-op if already known
    pub fn register(&self, provider: impl Into<String>) {
        let provider = provider.into();
        let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
        stats.entry(provider).or_default();
    }

    fn slot(&self, provider: &str) -> Arc<Mutex<ProviderStats>> {
        if let Some(slot) = self
            .stats
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(provider)
        {
            return slot.clone();
        }
        let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
        stats.entry(provider.to_string()).or_default().clone()
    }

    pub fn record_success(&self, provider: &str, latency: Duration) {
        let slot = self.slot(provider);
        let mut stats = slot.lock().unwrap_or_else(|e| e.into_inner());
        stats.record(true, Some(latency));
    }

    /// Record a failed attempt; `latency` is `None` when no timing is available
    pub fn record_failure(&self, provider: &str, latency: Option<Duration>) {
        let slot = self.slot(provider);
        let mut stats = slot.lock().unwrap_or_else(|e| e.into_inner());
        stats.record(false, latency);
    }

    pub fn stats(&self, provider: &str) -> Option<ProviderStats> {
        let map = self.stats.read().unwrap_or_else(|e| e.into_inner());
        map.get(provider)
            .map(|slot| slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    /// Current reliability score, 0 for unknown providers
    pub fn reliability(&self, provider: &str) -> f64 {
        self.stats(provider).map(|s| s.reliability_score).unwrap_or(0.0)
    }

    /// Clear one provider's counters (operator action)
    pub fn reset(&self, provider: &str) {
        if let Some(slot) = self.stats.read().unwrap_or_else(|e| e.into_inner()).get(provider) {
            *slot.lock().unwrap_or_else(|e| e.into_inner()) = ProviderStats::default();
        }
    }

    pub fn reset_all(&self) {
        let map = self.stats.read().unwrap_or_else(|e| e.into_inner());
        for slot in map.values() {
            *slot.lock().unwrap_or_else(|e| e.into_inner()) = ProviderStats::default();
        }
    }

    pub fn report(&self) -> PerformanceReport {
        let providers: BTreeMap<String, ProviderStats> = {
            let map = self.stats.read().unwrap_or_else(|e| e.into_inner());
            map.iter()
                .map(|(name, slot)| {
                    let stats = slot.lock().unwrap_or_else(|e| e.into_inner()).clone();
                    (name.clone(), stats)
                })
                .collect()
        };

        let total_providers = providers.len();
        let healthy_providers = providers
            .values()
            .filter(|s| s.reliability_score > HEALTHY_RELIABILITY)
            .count();
        let avg_reliability = if total_providers == 0 {
            0.0
        } else {
            providers.values().map(|s| s.reliability_score).sum::<f64>() / total_providers as f64
        };
        // BTreeMap order makes ties resolve alphabetically
        let fastest_provider = providers
            .iter()
            .filter(|(_, s)| s.has_timing())
            .min_by(|a, b| a.1.avg_response_time_ms.total_cmp(&b.1.avg_response_time_ms))
            .map(|(name, _)| name.clone());

        PerformanceReport {
            summary: PerformanceSummary {
                total_providers,
                healthy_providers,
                degraded_providers: total_providers - healthy_providers,
                avg_reliability,
                fastest_provider,
            },
            providers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_reliability() {
        let tracker = PerformanceTracker::with_providers(["DraftKings"]);
        assert_eq!(tracker.reliability("DraftKings"), 0.0);

        tracker.record_success("DraftKings", Duration::from_millis(100));
        tracker.record_success("DraftKings", Duration::from_millis(300));
        tracker.record_failure("DraftKings", Some(Duration::from_millis(200)));

        let stats = tracker.stats("DraftKings").unwrap();
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 1);
        assert!((stats.reliability_score - 2.0 / 3.0).abs() < 1e-9);
        assert!((stats.avg_response_time_ms - 200.0).abs() < 1e-6);
        assert!(stats.last_success.is_some());
    }

    #[test]
    fn test_untimed_failure_keeps_mean() {
        let tracker = PerformanceTracker::new();
        tracker.record_success("FanDuel", Duration::from_millis(50));
        tracker.record_failure("FanDuel", None);

        let stats = tracker.stats("FanDuel").unwrap();
        assert_eq!(stats.requests, 2);
        assert!((stats.avg_response_time_ms - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_report_summary() {
        let tracker = PerformanceTracker::with_providers(["BetMGM", "Caesars", "DraftKings"]);
        for _ in 0..9 {
            tracker.record_success("DraftKings", Duration::from_millis(120));
        }
        tracker.record_failure("DraftKings", None);
        tracker.record_success("Caesars", Duration::from_millis(40));
        tracker.record_failure("Caesars", Some(Duration::from_millis(40)));

        let report = tracker.report();
        assert_eq!(report.summary.total_providers, 3);
        // DraftKings 0.9 is healthy, Caesars 0.5 and idle BetMGM 0.0 are not
        assert_eq!(report.summary.healthy_providers, 1);
        assert_eq!(report.summary.degraded_providers, 2);
        assert!((report.summary.avg_reliability - (0.9 + 0.5 + 0.0) / 3.0).abs() < 1e-9);
        assert_eq!(report.summary.fastest_provider.as_deref(), Some("Caesars"));
    }

    #[test]
    fn test_empty_report() {
        let report = PerformanceTracker::new().report();
        assert_eq!(report.summary.total_providers, 0);
        assert_eq!(report.summary.avg_reliability, 0.0);
        assert!(report.summary.fastest_provider.is_none());
    }

    #[test]
    fn test_reset() {
        let tracker = PerformanceTracker::new();
        tracker.record_failure("PointsBet", None);
        tracker.reset("PointsBet");
        assert_eq!(tracker.stats("PointsBet").unwrap(), ProviderStats::default());
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let tracker = Arc::new(PerformanceTracker::with_providers(["A", "B"]));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    let provider = if i % 2 == 0 { "A" } else { "B" };
                    for _ in 0..100 {
                        tracker.record_success(provider, Duration::from_millis(1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.stats("A").unwrap().requests, 400);
        assert_eq!(tracker.stats("B").unwrap().requests, 400);
    }
}
