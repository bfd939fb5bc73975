//! Unified sportsbook service
//!
//! Owns the aggregator, resolver, arbitrage detector and tracker for one
//! deployment. Nothing here is global: two services never share stats.

use std::sync::Arc;

use crate::aggregator::{AggregationOutcome, AggregatorSettings, OddsAggregator};
use crate::arbitrage::{ArbitrageDetector, ArbitrageSettings};
use crate::changes::{detect_odds_changes, OddsChange};
use crate::notify::{NotificationEvent, NotificationSink, NullSink};
use crate::providers::ProviderClient;
use crate::resolver::{BestOddsFilter, BestOddsResolver, TieBreakConfig};
use crate::tracker::{PerformanceReport, PerformanceTracker};
use crate::types::{ArbitrageOpportunity, BestOdds, UnifiedOdds};

/// Tunables for every stage of the pipeline
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub aggregator: AggregatorSettings,
    pub tie_break: TieBreakConfig,
    pub arbitrage: ArbitrageSettings,
    /// Moves of at most this many American points are not reported
    pub odds_change_min_delta: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            aggregator: AggregatorSettings::default(),
            tie_break: TieBreakConfig::default(),
            arbitrage: ArbitrageSettings::default(),
            odds_change_min_delta: 10,
        }
    }
}

pub struct UnifiedSportsbookService {
    aggregator: OddsAggregator,
    resolver: BestOddsResolver,
    detector: ArbitrageDetector,
    tracker: Arc<PerformanceTracker>,
    sink: Arc<dyn NotificationSink>,
    odds_change_min_delta: u32,
}

impl UnifiedSportsbookService {
    pub fn new(providers: Vec<Arc<dyn ProviderClient>>, settings: ServiceSettings) -> Self {
        let tracker = Arc::new(PerformanceTracker::new());
        let aggregator = OddsAggregator::new(providers, tracker.clone(), settings.aggregator);
        Self {
            aggregator,
            resolver: BestOddsResolver::new(settings.tie_break),
            detector: ArbitrageDetector::new(settings.arbitrage),
            tracker,
            sink: Arc::new(NullSink),
            odds_change_min_delta: settings.odds_change_min_delta,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.aggregator.provider_names()
    }

    /// Merged quotes from every provider; failures only shrink the list
    pub async fn get_all_player_props(&self, sport: &str, player_name: Option<&str>) -> Vec<UnifiedOdds> {
        self.aggregator.fetch_all(sport, player_name).await
    }

    /// Like [`get_all_player_props`](Self::get_all_player_props) with the
    /// per-provider outcome attached
    pub async fn aggregate(&self, sport: &str, player_name: Option<&str>) -> AggregationOutcome {
        self.aggregator.fetch_all_detailed(sport, player_name).await
    }

    pub fn find_best_odds(&self, odds: &[UnifiedOdds]) -> Vec<BestOdds> {
        self.resolver.find_best_odds(odds)
    }

    pub fn find_best_odds_filtered(&self, odds: &[UnifiedOdds], filter: &BestOddsFilter) -> Vec<BestOdds> {
        self.resolver.find_best_odds_filtered(odds, filter)
    }

    /// Resolve, detect, and notify the sink once per opportunity
    pub async fn find_arbitrage_opportunities(
        &self,
        odds: &[UnifiedOdds],
        min_profit: f64,
    ) -> Vec<ArbitrageOpportunity> {
        let best = self.resolver.find_best_odds(odds);
        let opportunities = self.detector.find_opportunities(&best, min_profit);

        if !opportunities.is_empty() {
            tracing::info!(
                markets = best.len(),
                opportunities = opportunities.len(),
                min_profit = min_profit,
                "Arbitrage opportunities found"
            );
        }

        let sport = odds.first().map(|o| o.sport.as_str()).unwrap_or_default();
        for opportunity in &opportunities {
            self.sink.notify(&NotificationEvent::arbitrage(sport, opportunity.clone()));
        }
        opportunities
    }

    /// Compare two snapshots and notify the sink once per reportable move
    pub fn publish_odds_changes(&self, previous: &[UnifiedOdds], current: &[UnifiedOdds]) -> Vec<OddsChange> {
        let changes = detect_odds_changes(previous, current, self.odds_change_min_delta);
        for change in &changes {
            self.sink.notify(&NotificationEvent::odds_change(change.clone()));
        }
        changes
    }

    pub fn get_performance_report(&self) -> PerformanceReport {
        self.tracker.report()
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }
}
