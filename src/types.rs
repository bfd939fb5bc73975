//! Core types used throughout OddsBot
//!
//! Defines the unified odds schema, best-odds results, arbitrage
//! opportunities, and the American/decimal odds conversions they rely on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Convert American odds to decimal odds.
///
/// Returns `0.0` for `0`, which is not a valid American price; callers treat
/// a non-positive decimal as "no usable price".
pub fn american_to_decimal(odds: i32) -> f64 {
    if odds > 0 {
        odds as f64 / 100.0 + 1.0
    } else if odds < 0 {
        100.0 / (odds as f64).abs() + 1.0
    } else {
        0.0
    }
}

/// Convert decimal odds back to the nearest American price.
///
/// Returns `0` for decimals that cannot encode a price (`<= 1.0`, NaN).
pub fn decimal_to_american(decimal: f64) -> i32 {
    if !decimal.is_finite() || decimal <= 1.0 {
        return 0;
    }
    if decimal >= 2.0 {
        ((decimal - 1.0) * 100.0).round() as i32
    } else {
        (-100.0 / (decimal - 1.0)).round() as i32
    }
}

/// Position of an American price on a continuous scale with even money at 0.
///
/// American odds jump from `-100` to `+100` at the same price; this drops
/// the gap so `-110 -> +110` is a move of 20, not 220. Values strictly
/// inside the gap (not valid prices) sit at even money.
pub fn american_cents(odds: i32) -> i64 {
    let odds = i64::from(odds);
    if odds >= 100 {
        odds - 100
    } else if odds <= -100 {
        odds + 100
    } else {
        0
    }
}

/// Implied win probability of a decimal price, `0.0` when unusable.
pub fn implied_probability(decimal: f64) -> f64 {
    if decimal.is_finite() && decimal > 0.0 {
        1.0 / decimal
    } else {
        0.0
    }
}

/// Market category of a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    PlayerProps,
    GameLines,
}

impl Default for MarketType {
    fn default() -> Self {
        MarketType::PlayerProps
    }
}

impl MarketType {
    /// Parse from a provider string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "player_props" | "player_prop" | "props" | "player" => Some(MarketType::PlayerProps),
            "game_lines" | "game_line" | "game" | "lines" => Some(MarketType::GameLines),
            _ => None,
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::PlayerProps => write!(f, "player_props"),
            MarketType::GameLines => write!(f, "game_lines"),
        }
    }
}

/// Which side of a two-way market a quote prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Over,
    Under,
    Home,
    Away,
}

impl Side {
    /// Parse from a provider string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "over" | "o" => Some(Side::Over),
            "under" | "u" => Some(Side::Under),
            "home" | "h" => Some(Side::Home),
            "away" | "a" => Some(Side::Away),
            _ => None,
        }
    }

    /// Infer a side for a quote that did not state one.
    ///
    /// A negative price is the favorite (over/home), anything else the other leg.
    pub fn infer(odds: i32, market_type: MarketType) -> Self {
        match (odds < 0, market_type) {
            (true, MarketType::PlayerProps) => Side::Over,
            (false, MarketType::PlayerProps) => Side::Under,
            (true, MarketType::GameLines) => Side::Home,
            (false, MarketType::GameLines) => Side::Away,
        }
    }

    /// Which leg of the market this side belongs to
    pub fn leg(&self) -> Leg {
        match self {
            Side::Over | Side::Home => Leg::First,
            Side::Under | Side::Away => Leg::Second,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Over => write!(f, "over"),
            Side::Under => write!(f, "under"),
            Side::Home => write!(f, "home"),
            Side::Away => write!(f, "away"),
        }
    }
}

/// The two opposing legs of a market (over/home vs under/away)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    First,
    Second,
}

/// Quote status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OddsStatus {
    Active,
    Live,
}

impl Default for OddsStatus {
    fn default() -> Self {
        OddsStatus::Active
    }
}

impl OddsStatus {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "live" | "in_play" | "inplay" | "in-play" => OddsStatus::Live,
            _ => OddsStatus::Active,
        }
    }
}

impl fmt::Display for OddsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OddsStatus::Active => write!(f, "active"),
            OddsStatus::Live => write!(f, "live"),
        }
    }
}

/// One quoted price from one provider for one side of one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedOdds {
    /// Provider display name
    pub provider: String,
    pub event_id: String,
    pub market_id: String,
    /// Empty for game-level lines
    pub player_name: String,
    pub team: String,
    pub opponent: String,
    pub league: String,
    pub sport: String,
    pub market_type: MarketType,
    /// e.g. "hits", "points", "spread"
    pub bet_type: String,
    /// Numeric threshold of the market
    pub line: f64,
    /// American odds (negative = favorite)
    pub odds: i32,
    /// Always derived from `odds`
    pub decimal_odds: f64,
    pub side: Side,
    /// When the quote was fetched
    pub timestamp: DateTime<Utc>,
    /// Scheduled start of the event
    pub game_time: DateTime<Utc>,
    pub status: OddsStatus,
    /// Provider reliability (0.0 - 1.0) at fetch time
    pub confidence_score: f64,
}

impl UnifiedOdds {
    /// Subject of the market: the player, or for game lines the matchup.
    ///
    /// The matchup label is order-independent so home and away quotes of
    /// the same game share a subject.
    pub fn subject(&self) -> String {
        if !self.player_name.is_empty() {
            return self.player_name.clone();
        }
        let mut teams = [self.team.as_str(), self.opponent.as_str()];
        teams.sort_unstable();
        match teams {
            ["", ""] => String::new(),
            ["", t] | [t, ""] => t.to_string(),
            [a, b] => format!("{} vs {}", a, b),
        }
    }

    /// Whether the quote can be grouped and priced
    pub fn is_usable(&self) -> bool {
        self.odds != 0 && !self.bet_type.is_empty() && !self.subject().is_empty()
    }

    /// Implied win probability of this quote
    pub fn implied_probability(&self) -> f64 {
        implied_probability(self.decimal_odds)
    }
}

/// Best price per side for one `(player_name, bet_type, line)` market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestOdds {
    pub player_name: String,
    pub bet_type: String,
    pub line: f64,

    /// Best over/home price (0 if no candidate)
    pub best_over_odds: i32,
    pub best_over_provider: String,
    pub best_over_decimal: f64,

    /// Best under/away price (0 if no candidate)
    pub best_under_odds: i32,
    pub best_under_provider: String,
    pub best_under_decimal: f64,

    /// Distinct providers quoting this market across both sides
    pub total_books: usize,
    pub line_consensus: f64,
    pub arbitrage_opportunity: bool,
    /// Guaranteed profit in percent when `arbitrage_opportunity`
    pub arbitrage_profit: f64,

    /// Contributing quotes
    pub all_odds: Vec<UnifiedOdds>,
}

impl BestOdds {
    pub fn has_both_sides(&self) -> bool {
        self.best_over_odds != 0 && self.best_under_odds != 0
    }

    /// Fetch time of the newest contributing quote
    pub fn most_recent_quote(&self) -> Option<DateTime<Utc>> {
        self.all_odds.iter().map(|o| o.timestamp).max()
    }
}

/// Confidence in an arbitrage opportunity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceLevel::Low => write!(f, "low"),
            ConfidenceLevel::Medium => write!(f, "medium"),
            ConfidenceLevel::High => write!(f, "high"),
        }
    }
}

/// How quickly an opportunity is expected to disappear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSensitivity {
    Urgent,
    Moderate,
    Stable,
}

impl fmt::Display for TimeSensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSensitivity::Urgent => write!(f, "urgent"),
            TimeSensitivity::Moderate => write!(f, "moderate"),
            TimeSensitivity::Stable => write!(f, "stable"),
        }
    }
}

/// Actionable two-sided arbitrage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub player_name: String,
    pub bet_type: String,
    pub line: f64,

    pub over_odds: i32,
    pub over_provider: String,
    /// Share of the bankroll to stake on the over leg (percent)
    pub over_stake_percentage: f64,

    pub under_odds: i32,
    pub under_provider: String,
    pub under_stake_percentage: f64,

    pub guaranteed_profit_percentage: f64,
    pub minimum_bet_amount: f64,
    /// Payout of `minimum_bet_amount` split by the stake percentages
    pub expected_return: f64,

    pub confidence_level: ConfidenceLevel,
    pub time_sensitivity: TimeSensitivity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_american_to_decimal() {
        assert!((american_to_decimal(150) - 2.5).abs() < 1e-9);
        assert!((american_to_decimal(-110) - 1.909_090_909).abs() < 1e-6);
        assert!((american_to_decimal(100) - 2.0).abs() < 1e-9);
        assert!((american_to_decimal(-100) - 2.0).abs() < 1e-9);
        assert_eq!(american_to_decimal(0), 0.0);
    }

    #[test]
    fn test_decimal_to_american_recovers_price() {
        for odds in [-250, -110, -105, 100, 120, 350] {
            assert_eq!(decimal_to_american(american_to_decimal(odds)), odds);
        }
        assert_eq!(decimal_to_american(1.0), 0);
        assert_eq!(decimal_to_american(f64::NAN), 0);
    }

    #[test]
    fn test_american_cents_is_continuous_at_even_money() {
        assert_eq!(american_cents(-100), american_cents(100));
        assert_eq!(american_cents(110) - american_cents(-110), 20);
        assert_eq!(american_cents(-130) - american_cents(-110), -20);
        assert_eq!(american_cents(i32::MAX) - american_cents(i32::MIN + 1), 2 * (i32::MAX as i64 - 100));
    }

    #[test]
    fn test_side_inference() {
        assert_eq!(Side::infer(-120, MarketType::PlayerProps), Side::Over);
        assert_eq!(Side::infer(110, MarketType::PlayerProps), Side::Under);
        assert_eq!(Side::infer(-3, MarketType::GameLines), Side::Home);
        assert_eq!(Side::infer(0, MarketType::GameLines), Side::Away);
        assert_eq!(Side::Home.leg(), Leg::First);
        assert_eq!(Side::Under.leg(), Leg::Second);
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!(Side::from_str(" OVER "), Some(Side::Over));
        assert_eq!(Side::from_str("sideways"), None);
        assert_eq!(MarketType::from_str("game_lines"), Some(MarketType::GameLines));
        assert_eq!(OddsStatus::from_str("In-Play"), OddsStatus::Live);
        assert_eq!(OddsStatus::from_str("open"), OddsStatus::Active);
    }

    #[test]
    fn test_matchup_subject_is_order_independent() {
        let now = Utc::now();
        let mut odds = UnifiedOdds {
            provider: "DraftKings".into(),
            event_id: "e1".into(),
            market_id: "m1".into(),
            player_name: String::new(),
            team: "Lakers".into(),
            opponent: "Celtics".into(),
            league: "NBA".into(),
            sport: "nba".into(),
            market_type: MarketType::GameLines,
            bet_type: "spread".into(),
            line: 3.5,
            odds: -110,
            decimal_odds: american_to_decimal(-110),
            side: Side::Home,
            timestamp: now,
            game_time: now,
            status: OddsStatus::Active,
            confidence_score: 1.0,
        };
        let home = odds.subject();
        std::mem::swap(&mut odds.team, &mut odds.opponent);
        assert_eq!(home, odds.subject());
        assert_eq!(home, "Celtics vs Lakers");
    }
}
