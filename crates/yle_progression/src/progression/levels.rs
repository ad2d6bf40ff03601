//! XP ledger and level curve.
//!
//! ## XP Curve
//!
//! Going from level n to n+1 costs `100 + 50 * n` XP, so the cumulative
//! threshold for level L is `sum(100 + 50 * i for i in 1..L)`:
//! - Level 1: 0 XP
//! - Level 2: 150 XP
//! - Level 10: 3,150 XP
//! - Level 100: 257,400 XP
//!
//! Levels are capped at 100. XP keeps accumulating past the last threshold.

use crate::error::{ProgressionError, Result};
use crate::state::LearnerState;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const MAX_LEVEL: u32 = 100;

/// XP cost of the first level step (1 -> 2) before the linear increment
const BASE_STEP_XP: u64 = 100;
/// Extra XP added to each successive level step
const STEP_INCREMENT_XP: u64 = 50;

/// Minimum total XP needed to be at `level`.
///
/// Levels outside 1-100 are clamped into range.
pub fn xp_threshold(level: u32) -> u64 {
    let steps = (level.clamp(1, MAX_LEVEL) - 1) as u64;
    BASE_STEP_XP * steps + STEP_INCREMENT_XP * steps * (steps + 1) / 2
}

/// Level reached with `total_xp`, scanning from level 1
pub fn level_for_xp(total_xp: u64) -> u32 {
    level_from(1, total_xp)
}

/// Level reached with `total_xp`, scanning upward from `current`.
///
/// Never returns less than `current` (clamped to 1-100).
pub fn level_from(current: u32, total_xp: u64) -> u32 {
    let mut level = current.clamp(1, MAX_LEVEL);
    while level < MAX_LEVEL && total_xp >= xp_threshold(level + 1) {
        level += 1;
    }
    level
}

/// Add XP to the learner and recompute the cached level.
///
/// Returns whether the learner leveled up. Negative amounts are rejected
/// before anything is touched.
pub fn add_xp(state: &mut LearnerState, amount: i64) -> Result<bool> {
    if amount < 0 {
        return Err(ProgressionError::InvalidAmount(amount));
    }
    Ok(grant_xp(state, amount as u64))
}

/// Infallible XP grant for already-validated reward amounts
pub(crate) fn grant_xp(state: &mut LearnerState, amount: u64) -> bool {
    let old_level = state.current_level;
    state.total_xp = state.total_xp.saturating_add(amount);
    state.current_level = level_from(old_level, state.total_xp);

    let leveled_up = state.current_level > old_level;
    if leveled_up {
        info!(
            user_id = %state.user_id,
            from = old_level,
            to = state.current_level,
            total_xp = state.total_xp,
            "level up"
        );
    }
    leveled_up
}

/// Position of a learner within their current level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub level: u32,
    /// XP still needed for the next level (0 at max level)
    pub xp_to_next: u64,
    /// Fraction of the current level step completed (0.0 - 1.0)
    pub fraction: f64,
}

impl LevelProgress {
    pub fn from_xp(total_xp: u64) -> Self {
        let level = level_for_xp(total_xp);
        if level >= MAX_LEVEL {
            return Self {
                level,
                xp_to_next: 0,
                fraction: 1.0,
            };
        }

        let floor = xp_threshold(level);
        let next = xp_threshold(level + 1);
        let span = next - floor;
        let fraction = (total_xp.saturating_sub(floor) as f64 / span as f64).clamp(0.0, 1.0);

        Self {
            level,
            xp_to_next: next.saturating_sub(total_xp),
            fraction,
        }
    }

    /// Progress percentage to next level (0-100)
    pub fn percent(&self) -> u8 {
        (self.fraction * 100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_threshold_curve() {
        assert_eq!(xp_threshold(1), 0);
        assert_eq!(xp_threshold(2), 150);
        assert_eq!(xp_threshold(3), 350);
        assert_eq!(xp_threshold(10), 3_150);
        assert_eq!(xp_threshold(100), 257_400);
    }

    #[test]
    fn test_step_cost_grows_linearly() {
        for level in 1..MAX_LEVEL {
            let step = xp_threshold(level + 1) - xp_threshold(level);
            assert_eq!(step, 100 + 50 * level as u64);
        }
    }

    #[test]
    fn test_level_for_xp() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(149), 1);
        assert_eq!(level_for_xp(150), 2);
        assert_eq!(level_for_xp(349), 2);
        assert_eq!(level_for_xp(350), 3);
        assert_eq!(level_for_xp(u64::MAX), MAX_LEVEL);
    }

    #[test]
    fn test_level_from_never_goes_down() {
        assert_eq!(level_from(5, 0), 5);
        assert_eq!(level_from(0, 0), 1);
        assert_eq!(level_from(250, 0), MAX_LEVEL);
    }

    #[test]
    fn test_add_xp_levels_up() {
        let mut state = LearnerState::new("kid", Utc::now());
        let leveled = add_xp(&mut state, 150).unwrap();
        assert!(leveled);
        assert_eq!(state.current_level, 2);
        assert_eq!(state.total_xp, 150);

        let leveled = add_xp(&mut state, 10).unwrap();
        assert!(!leveled);
        assert_eq!(state.current_level, 2);
    }

    #[test]
    fn test_add_xp_multiple_levels_at_once() {
        let mut state = LearnerState::new("kid", Utc::now());
        assert!(add_xp(&mut state, 3_150).unwrap());
        assert_eq!(state.current_level, 10);
    }

    #[test]
    fn test_add_xp_rejects_negative() {
        let mut state = LearnerState::new("kid", Utc::now());
        let before = state.clone();
        let err = add_xp(&mut state, -5).unwrap_err();
        assert!(matches!(err, ProgressionError::InvalidAmount(-5)));
        assert_eq!(state, before);
    }

    #[test]
    fn test_level_capped_but_xp_accumulates() {
        let mut state = LearnerState::new("kid", Utc::now());
        add_xp(&mut state, 300_000).unwrap();
        assert_eq!(state.current_level, MAX_LEVEL);
        add_xp(&mut state, 1_000).unwrap();
        assert_eq!(state.current_level, MAX_LEVEL);
        assert_eq!(state.total_xp, 301_000);
    }

    #[test]
    fn test_level_progress() {
        let midpoint = (xp_threshold(5) + xp_threshold(6)) / 2;
        let progress = LevelProgress::from_xp(midpoint);
        assert_eq!(progress.level, 5);
        assert!(progress.percent() >= 45 && progress.percent() <= 55);
        assert_eq!(progress.xp_to_next, xp_threshold(6) - midpoint);

        let maxed = LevelProgress::from_xp(xp_threshold(MAX_LEVEL));
        assert_eq!(maxed.level, MAX_LEVEL);
        assert_eq!(maxed.xp_to_next, 0);
        assert_eq!(maxed.percent(), 100);
    }
}
