//! Best-Odds Resolver - Groups quotes into markets and picks the best price
//!
//! Markets are keyed by `(subject, bet_type, line)`. Within each leg the
//! highest American price wins; equal prices go to the provider earliest in
//! the configured priority list. The result does not depend on input order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::arbitrage::ArbitrageDetector;
use crate::types::{BestOdds, Leg, UnifiedOdds};

/// Default tie-break ordering
pub const DEFAULT_PROVIDER_PRIORITY: [&str; 5] = ["DraftKings", "FanDuel", "BetMGM", "Caesars", "PointsBet"];

/// Tie-break configuration
#[derive(Debug, Clone)]
pub struct TieBreakConfig {
    /// Earlier providers win ties
    pub provider_priority: Vec<String>,
    /// Candidates within this many American-odds points of the best compete
    /// on priority first. 0 disables.
    pub near_tie_tolerance: u32,
}

impl Default for TieBreakConfig {
    fn default() -> Self {
        Self {
            provider_priority: DEFAULT_PROVIDER_PRIORITY.iter().map(|s| s.to_string()).collect(),
            near_tie_tolerance: 0,
        }
    }
}

/// Quote-level and market-level filters for best-odds queries
#[derive(Debug, Clone, Default)]
pub struct BestOddsFilter {
    /// Case-insensitive bet type match
    pub bet_type: Option<String>,
    /// Inclusive lower bound on American odds
    pub min_odds: Option<i32>,
    /// Inclusive upper bound on American odds
    pub max_odds: Option<i32>,
    /// Keep only markets flagged as arbitrage
    pub only_arbitrage: bool,
}

impl BestOddsFilter {
    fn accepts(&self, odds: &UnifiedOdds) -> bool {
        if let Some(bet_type) = &self.bet_type {
            if !odds.bet_type.eq_ignore_ascii_case(bet_type) {
                return false;
            }
        }
        self.min_odds.map_or(true, |min| odds.odds >= min) && self.max_odds.map_or(true, |max| odds.odds <= max)
    }
}

/// Total-ordered line value so `24.5` from two providers groups together
#[derive(Debug, Clone, Copy)]
struct LineKey(f64);

impl PartialEq for LineKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LineKey {}

impl PartialOrd for LineKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LineKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // -0.0 and 0.0 are the same line
        let norm = |v: f64| if v == 0.0 { 0.0 } else { v };
        norm(self.0).total_cmp(&norm(other.0))
    }
}

type MarketKey = (String, String, LineKey);

#[derive(Default)]
struct MarketGroup<'a> {
    first: Vec<&'a UnifiedOdds>,
    second: Vec<&'a UnifiedOdds>,
}

#[derive(Debug, Clone)]
pub struct BestOddsResolver {
    tie_break: TieBreakConfig,
    priority_keys: Vec<String>,
}

impl Default for BestOddsResolver {
    fn default() -> Self {
        Self::new(TieBreakConfig::default())
    }
}

impl BestOddsResolver {
    pub fn new(tie_break: TieBreakConfig) -> Self {
        let priority_keys = tie_break.provider_priority.iter().map(|p| provider_key(p)).collect();
        Self {
            tie_break,
            priority_keys,
        }
    }

    pub fn tie_break(&self) -> &TieBreakConfig {
        &self.tie_break
    }

    /// Resolve the best price per side for every market in `odds`
    pub fn find_best_odds(&self, odds: &[UnifiedOdds]) -> Vec<BestOdds> {
        self.resolve(odds.iter())
    }

    /// Same as [`find_best_odds`](Self::find_best_odds) with quote and market filters
    pub fn find_best_odds_filtered(&self, odds: &[UnifiedOdds], filter: &BestOddsFilter) -> Vec<BestOdds> {
        let mut best = self.resolve(odds.iter().filter(|o| filter.accepts(o)));
        if filter.only_arbitrage {
            best.retain(|b| b.arbitrage_opportunity);
        }
        best
    }

    fn resolve<'a>(&self, odds: impl Iterator<Item = &'a UnifiedOdds>) -> Vec<BestOdds> {
        let mut groups: BTreeMap<MarketKey, MarketGroup<'a>> = BTreeMap::new();
        let mut skipped = 0usize;

        for quote in odds {
            if !quote.is_usable() {
                skipped += 1;
                continue;
            }
            let key = (quote.subject(), quote.bet_type.clone(), LineKey(quote.line));
            let group = groups.entry(key).or_default();
            match quote.side.leg() {
                Leg::First => group.first.push(quote),
                Leg::Second => group.second.push(quote),
            }
        }

        if skipped > 0 {
            tracing::debug!(skipped, "Skipped unusable quotes while grouping");
        }

        groups
            .into_iter()
            .map(|((subject, bet_type, line), group)| self.build(subject, bet_type, line.0, group))
            .collect()
    }

    fn build(&self, subject: String, bet_type: String, line: f64, group: MarketGroup<'_>) -> BestOdds {
        let over = self.select_best(&group.first);
        let under = self.select_best(&group.second);

        let total_books = group
            .first
            .iter()
            .chain(group.second.iter())
            .map(|o| provider_key(&o.provider))
            .collect::<BTreeSet<_>>()
            .len();

        let (arbitrage_opportunity, arbitrage_profit) = match (over, under) {
            (Some(o), Some(u)) => {
                let check = ArbitrageDetector::check(o.decimal_odds, u.decimal_odds);
                (check.is_arbitrage, check.profit_percentage)
            }
            _ => (false, 0.0),
        };

        BestOdds {
            player_name: subject,
            bet_type,
            line,
            best_over_odds: over.map(|o| o.odds).unwrap_or(0),
            best_over_provider: over.map(|o| o.provider.clone()).unwrap_or_default(),
            best_over_decimal: over.map(|o| o.decimal_odds).unwrap_or(0.0),
            best_under_odds: under.map(|o| o.odds).unwrap_or(0),
            best_under_provider: under.map(|o| o.provider.clone()).unwrap_or_default(),
            best_under_decimal: under.map(|o| o.decimal_odds).unwrap_or(0.0),
            total_books,
            line_consensus: line,
            arbitrage_opportunity,
            arbitrage_profit,
            all_odds: group.first.iter().chain(group.second.iter()).map(|o| (*o).clone()).collect(),
        }
    }

    /// Best candidate of one leg
    fn select_best<'a>(&self, candidates: &[&'a UnifiedOdds]) -> Option<&'a UnifiedOdds> {
        let best_price = candidates.iter().map(|o| o.odds).max()?;
        let tolerance = i32::try_from(self.tie_break.near_tie_tolerance).unwrap_or(i32::MAX);
        let floor = best_price.saturating_sub(tolerance);

        candidates
            .iter()
            .copied()
            .filter(|o| o.odds >= floor)
            .min_by(|a, b| self.compare(a, b))
    }

    /// Ordering where `Less` means "preferred"
    fn compare(&self, a: &UnifiedOdds, b: &UnifiedOdds) -> Ordering {
        let by_price = b.odds.cmp(&a.odds);
        let by_priority = self.rank(&a.provider).cmp(&self.rank(&b.provider));

        let primary = if self.tie_break.near_tie_tolerance > 0 {
            by_priority.then(by_price)
        } else {
            by_price.then(by_priority)
        };

        primary
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.market_id.cmp(&b.market_id))
    }

    /// Priority rank: listed providers by position, unlisted after them alphabetically
    fn rank(&self, provider: &str) -> (usize, String) {
        let key = provider_key(provider);
        match self.priority_keys.iter().position(|p| *p == key) {
            Some(idx) => (idx, String::new()),
            None => (self.priority_keys.len(), key),
        }
    }
}

/// Case- and punctuation-insensitive provider identity
fn provider_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
