//! Arbitrage Detector - Implied-probability math over two opposing prices
//!
//! A pair of best prices is an arbitrage when their implied probabilities
//! sum to less than one. Profit is `(1 - sum) * 100`, rounded to cents of a
//! percent.

use chrono::{DateTime, Utc};

use crate::types::{
    implied_probability, ArbitrageOpportunity, BestOdds, ConfidenceLevel, TimeSensitivity,
};

/// Detector thresholds
#[derive(Debug, Clone)]
pub struct ArbitrageSettings {
    /// Notional stake used for `expected_return`
    pub minimum_bet_amount: f64,
    /// Quotes newer than this are urgent
    pub urgent_secs: i64,
    /// Quotes newer than this (but not urgent) are moderate
    pub moderate_secs: i64,
    /// Cap on returned opportunities, `None` for all
    pub max_results: Option<usize>,
}

impl Default for ArbitrageSettings {
    fn default() -> Self {
        Self {
            minimum_bet_amount: 100.0,
            urgent_secs: 300,   // 5 minutes
            moderate_secs: 1800, // 30 minutes
            max_results: None,
        }
    }
}

/// Outcome of checking one price pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArbitrageCheck {
    pub is_arbitrage: bool,
    /// Percent, 0.0 when no arbitrage
    pub profit_percentage: f64,
    /// Sum of implied probabilities, 0.0 when inputs were unusable
    pub total_implied: f64,
}

impl ArbitrageCheck {
    const NONE: ArbitrageCheck = ArbitrageCheck {
        is_arbitrage: false,
        profit_percentage: 0.0,
        total_implied: 0.0,
    };
}

#[derive(Debug, Clone, Default)]
pub struct ArbitrageDetector {
    settings: ArbitrageSettings,
}

impl ArbitrageDetector {
    pub fn new(settings: ArbitrageSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ArbitrageSettings {
        &self.settings
    }

    /// Check two opposing decimal prices. Never fails; unusable inputs are
    /// "no arbitrage".
    pub fn check(decimal_over: f64, decimal_under: f64) -> ArbitrageCheck {
        let usable = |d: f64| d.is_finite() && d > 0.0;
        if !usable(decimal_over) || !usable(decimal_under) {
            return ArbitrageCheck::NONE;
        }

        let total_implied = implied_probability(decimal_over) + implied_probability(decimal_under);
        if total_implied < 1.0 {
            ArbitrageCheck {
                is_arbitrage: true,
                profit_percentage: round2((1.0 - total_implied) * 100.0),
                total_implied,
            }
        } else {
            ArbitrageCheck {
                total_implied,
                ..ArbitrageCheck::NONE
            }
        }
    }

    /// Build opportunities from resolved markets, newest quotes judged against now
    pub fn find_opportunities(&self, best: &[BestOdds], min_profit: f64) -> Vec<ArbitrageOpportunity> {
        self.find_opportunities_at(best, min_profit, Utc::now())
    }

    pub fn find_opportunities_at(
        &self,
        best: &[BestOdds],
        min_profit: f64,
        now: DateTime<Utc>,
    ) -> Vec<ArbitrageOpportunity> {
        let mut opportunities: Vec<ArbitrageOpportunity> = best
            .iter()
            .filter(|b| b.arbitrage_opportunity && b.arbitrage_profit >= min_profit)
            .filter_map(|b| self.build(b, now))
            .collect();

        opportunities.sort_by(|a, b| {
            b.guaranteed_profit_percentage
                .total_cmp(&a.guaranteed_profit_percentage)
                .then_with(|| a.player_name.cmp(&b.player_name))
                .then_with(|| a.bet_type.cmp(&b.bet_type))
                .then_with(|| a.line.total_cmp(&b.line))
        });

        if let Some(max) = self.settings.max_results {
            opportunities.truncate(max);
        }
        opportunities
    }

    fn build(&self, best: &BestOdds, now: DateTime<Utc>) -> Option<ArbitrageOpportunity> {
        let check = Self::check(best.best_over_decimal, best.best_under_decimal);
        if !check.is_arbitrage {
            return None;
        }

        let stake_pct = |decimal: f64| implied_probability(decimal) / check.total_implied * 100.0;
        let minimum_bet_amount = self.settings.minimum_bet_amount;

        Some(ArbitrageOpportunity {
            player_name: best.player_name.clone(),
            bet_type: best.bet_type.clone(),
            line: best.line,
            over_odds: best.best_over_odds,
            over_provider: best.best_over_provider.clone(),
            over_stake_percentage: stake_pct(best.best_over_decimal),
            under_odds: best.best_under_odds,
            under_provider: best.best_under_provider.clone(),
            under_stake_percentage: stake_pct(best.best_under_decimal),
            guaranteed_profit_percentage: best.arbitrage_profit,
            minimum_bet_amount,
            expected_return: round2(minimum_bet_amount / check.total_implied),
            confidence_level: confidence_level(best.total_books, best.arbitrage_profit),
            time_sensitivity: self.time_sensitivity(best, now),
        })
    }

    fn time_sensitivity(&self, best: &BestOdds, now: DateTime<Utc>) -> TimeSensitivity {
        let Some(newest) = best.most_recent_quote() else {
            return TimeSensitivity::Stable;
        };
        let age = (now - newest).num_seconds();
        if age < self.settings.urgent_secs {
            TimeSensitivity::Urgent
        } else if age < self.settings.moderate_secs {
            TimeSensitivity::Moderate
        } else {
            TimeSensitivity::Stable
        }
    }
}

pub fn confidence_level(total_books: usize, profit: f64) -> ConfidenceLevel {
    if total_books >= 3 && profit >= 5.0 {
        ConfidenceLevel::High
    } else if total_books >= 2 && profit >= 3.0 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
