//! Odds-change detection between two aggregation passes
//!
//! The caller keeps the previous snapshot; nothing here is cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{american_cents, Side, UnifiedOdds};

/// Price movement for one market, provider and side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsChange {
    pub provider: String,
    pub sport: String,
    pub event_id: String,
    pub player_name: String,
    pub bet_type: String,
    pub line: f64,
    pub side: Side,
    pub old_odds: i32,
    pub new_odds: i32,
    /// Signed move in American points, continuous across even money
    /// (`-110 -> +110` is 20)
    pub delta: i64,
    /// Relative change of the decimal price, in percent
    pub change_percent: f64,
    pub observed_at: DateTime<Utc>,
}

type ChangeKey = (String, String, u64, String, Side);

fn change_key(odds: &UnifiedOdds) -> ChangeKey {
    let line = if odds.line == 0.0 { 0.0_f64 } else { odds.line };
    (
        odds.subject(),
        odds.bet_type.clone(),
        line.to_bits(),
        odds.provider.clone(),
        odds.side,
    )
}

/// Quotes in `current` whose price moved by more than `min_delta` points
/// against the same market/provider/side in `previous`.
///
/// Moves are measured with [`american_cents`], so `-100 -> +100` is no move.
pub fn detect_odds_changes(previous: &[UnifiedOdds], current: &[UnifiedOdds], min_delta: u32) -> Vec<OddsChange> {
    let before: HashMap<ChangeKey, &UnifiedOdds> = previous
        .iter()
        .filter(|o| o.is_usable())
        .map(|o| (change_key(o), o))
        .collect();

    let mut changes: Vec<OddsChange> = current
        .iter()
        .filter(|o| o.is_usable())
        .filter_map(|new| {
            let old = before.get(&change_key(new))?;
            let delta = american_cents(new.odds) - american_cents(old.odds);
            if delta.unsigned_abs() <= u64::from(min_delta) {
                return None;
            }
            let change_percent = if old.decimal_odds > 0.0 {
                (new.decimal_odds - old.decimal_odds) / old.decimal_odds * 100.0
            } else {
                0.0
            };
            Some(OddsChange {
                provider: new.provider.clone(),
                sport: new.sport.clone(),
                event_id: new.event_id.clone(),
                player_name: new.subject(),
                bet_type: new.bet_type.clone(),
                line: new.line,
                side: new.side,
                old_odds: old.odds,
                new_odds: new.odds,
                delta,
                change_percent,
                observed_at: new.timestamp,
            })
        })
        .collect();

    changes.sort_by(|a, b| {
        b.delta
            .unsigned_abs()
            .cmp(&a.delta.unsigned_abs())
            .then_with(|| a.player_name.cmp(&b.player_name))
            .then_with(|| a.provider.cmp(&b.provider))
    });
    changes
}
