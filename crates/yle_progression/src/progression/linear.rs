//! Linear path state machine.
//!
//! The structured track runs Starters -> Movers -> Flyers. Each phase holds
//! 20 rounds followed by a boss battle. Beating the boss moves the learner to
//! the next phase with a clean round list; beating the Flyers boss finishes
//! the campaign.
//!
//! `current_round` is a display counter: it wraps back to 1 whenever the
//! completed-round count hits a multiple of 20, without advancing the phase.

use super::levels::grant_xp;
use crate::error::{ProgressionError, Result};
use crate::state::LearnerState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::info;

pub const ROUNDS_PER_PHASE: usize = 20;

/// Curriculum phase, ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Starters,
    Movers,
    Flyers,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Starters, Phase::Movers, Phase::Flyers];

    pub fn successor(self) -> Option<Phase> {
        match self {
            Phase::Starters => Some(Phase::Movers),
            Phase::Movers => Some(Phase::Flyers),
            Phase::Flyers => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Starters => "starters",
            Phase::Movers => "movers",
            Phase::Flyers => "flyers",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearPathProgress {
    pub current_phase: Phase,
    /// Display counter, 1-20
    pub current_round: u32,
    /// Round ids completed in the current phase only
    pub rounds_completed: BTreeSet<String>,
    /// Phases whose boss has been beaten
    pub bosses_defeated: BTreeSet<Phase>,
    #[serde(rename = "totalXPEarned")]
    pub total_xp_earned: u64,
    pub total_gems_earned: u64,
}

impl Default for LinearPathProgress {
    fn default() -> Self {
        Self {
            current_phase: Phase::Starters,
            current_round: 1,
            rounds_completed: BTreeSet::new(),
            bosses_defeated: BTreeSet::new(),
            total_xp_earned: 0,
            total_gems_earned: 0,
        }
    }
}

impl LinearPathProgress {
    /// Share of the current phase's rounds completed (0.0 - 1.0)
    pub fn progress_percentage(&self) -> f64 {
        (self.rounds_completed.len() as f64 / ROUNDS_PER_PHASE as f64).min(1.0)
    }

    pub fn is_current_phase_completed(&self) -> bool {
        self.rounds_completed.len() >= ROUNDS_PER_PHASE
    }

    pub fn rounds_until_boss(&self) -> usize {
        ROUNDS_PER_PHASE.saturating_sub(self.rounds_completed.len())
    }

    pub fn boss_unlocked(&self) -> bool {
        self.is_current_phase_completed() && !self.bosses_defeated.contains(&self.current_phase)
    }

    pub fn is_campaign_complete(&self) -> bool {
        self.current_phase == Phase::Flyers && self.bosses_defeated.contains(&Phase::Flyers)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundOutcome {
    pub current_round: u32,
    pub rounds_until_boss: usize,
    pub leveled_up: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BossOutcome {
    pub defeated_phase: Phase,
    /// Phase entered as a result, if any
    pub advanced_to: Option<Phase>,
    pub campaign_complete: bool,
    pub leveled_up: bool,
}

fn validate_reward(xp: i64, gems: i64) -> Result<(u64, u64)> {
    if xp < 0 {
        return Err(ProgressionError::InvalidAmount(xp));
    }
    if gems < 0 {
        return Err(ProgressionError::InvalidAmount(gems));
    }
    Ok((xp as u64, gems as u64))
}

/// Record a first-time round completion and grant its reward
pub fn complete_round(state: &mut LearnerState, round_id: &str, xp: i64, gems: i64) -> Result<RoundOutcome> {
    let (xp, gems) = validate_reward(xp, gems)?;
    let linear = &state.linear;
    if linear.rounds_completed.contains(round_id) {
        return Err(ProgressionError::AlreadyCompleted(round_id.to_string()));
    }
    if linear.is_current_phase_completed() {
        return Err(ProgressionError::PhaseComplete(round_id.to_string()));
    }

    let linear = &mut state.linear;
    linear.rounds_completed.insert(round_id.to_string());
    linear.total_xp_earned = linear.total_xp_earned.saturating_add(xp);
    linear.total_gems_earned = linear.total_gems_earned.saturating_add(gems);

    if linear.rounds_completed.len() % ROUNDS_PER_PHASE == 0 {
        linear.current_round = 1;
    } else {
        linear.current_round += 1;
    }
    let current_round = linear.current_round;
    let rounds_until_boss = linear.rounds_until_boss();

    let leveled_up = grant_xp(state, xp);

    Ok(RoundOutcome {
        current_round,
        rounds_until_boss,
        leveled_up,
    })
}

/// Beat the current phase's boss.
///
/// `boss_id` names the encounter for logging; the boss fought is always the
/// one guarding the current phase.
pub fn defeat_boss(state: &mut LearnerState, boss_id: &str, xp: i64, gems: i64) -> Result<BossOutcome> {
    let (xp, gems) = validate_reward(xp, gems)?;
    let phase = state.linear.current_phase;
    if state.linear.bosses_defeated.contains(&phase) {
        return Err(ProgressionError::AlreadyCompleted(boss_id.to_string()));
    }
    let completed = state.linear.rounds_completed.len();
    if completed < ROUNDS_PER_PHASE {
        return Err(ProgressionError::BossLocked {
            completed,
            required: ROUNDS_PER_PHASE,
        });
    }

    let linear = &mut state.linear;
    linear.bosses_defeated.insert(phase);
    linear.total_xp_earned = linear.total_xp_earned.saturating_add(xp);
    linear.total_gems_earned = linear.total_gems_earned.saturating_add(gems);

    let advanced_to = phase.successor();
    if let Some(next) = advanced_to {
        linear.current_phase = next;
        linear.current_round = 1;
        linear.rounds_completed.clear();
    }
    let campaign_complete = linear.is_campaign_complete();

    let leveled_up = grant_xp(state, xp);

    match advanced_to {
        Some(next) => info!(user_id = %state.user_id, boss_id, from = %phase, to = %next, "phase advanced"),
        None => info!(user_id = %state.user_id, boss_id, "campaign complete"),
    }

    Ok(BossOutcome {
        defeated_phase: phase,
        advanced_to,
        campaign_complete,
        leveled_up,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn finish_phase(state: &mut LearnerState, prefix: &str) {
        for i in 1..=ROUNDS_PER_PHASE {
            complete_round(state, &format!("{}_r{}", prefix, i), 10, 5).unwrap();
        }
    }

    #[test]
    fn test_round_counter_advances_and_wraps() {
        let mut state = LearnerState::new("kid", Utc::now());
        let outcome = complete_round(&mut state, "starters_r1", 100, 10).unwrap();
        assert_eq!(outcome.current_round, 2);
        assert_eq!(outcome.rounds_until_boss, 19);
        assert_eq!(state.total_xp, 100);
        assert_eq!(state.linear.total_gems_earned, 10);

        for i in 2..=ROUNDS_PER_PHASE {
            complete_round(&mut state, &format!("starters_r{}", i), 0, 0).unwrap();
        }
        assert_eq!(state.linear.current_round, 1);
        assert_eq!(state.linear.current_phase, Phase::Starters);
        assert_eq!(state.linear.rounds_completed.len(), ROUNDS_PER_PHASE);
        assert!(state.linear.boss_unlocked());
    }

    #[test]
    fn test_repeat_round_is_rejected_without_reward() {
        let mut state = LearnerState::new("kid", Utc::now());
        complete_round(&mut state, "r1", 100, 10).unwrap();
        let before = state.clone();
        let err = complete_round(&mut state, "r1", 100, 10).unwrap_err();
        assert!(matches!(err, ProgressionError::AlreadyCompleted(_)));
        assert_eq!(state, before);
    }

    #[test]
    fn test_round_past_phase_cap_is_rejected() {
        let mut state = LearnerState::new("kid", Utc::now());
        finish_phase(&mut state, "s");
        let err = complete_round(&mut state, "s_r21", 10, 5).unwrap_err();
        assert!(matches!(err, ProgressionError::PhaseComplete(_)));
        assert_eq!(state.linear.rounds_completed.len(), ROUNDS_PER_PHASE);
    }

    #[test]
    fn test_negative_reward_rejected() {
        let mut state = LearnerState::new("kid", Utc::now());
        assert!(matches!(
            complete_round(&mut state, "r1", -1, 0),
            Err(ProgressionError::InvalidAmount(-1))
        ));
        assert!(matches!(
            complete_round(&mut state, "r1", 0, -3),
            Err(ProgressionError::InvalidAmount(-3))
        ));
        assert!(state.linear.rounds_completed.is_empty());
    }

    #[test]
    fn test_boss_locked_until_twenty_rounds() {
        let mut state = LearnerState::new("kid", Utc::now());
        complete_round(&mut state, "r1", 10, 5).unwrap();
        let before = state.clone();
        let err = defeat_boss(&mut state, "starters_boss", 500, 100).unwrap_err();
        assert!(matches!(err, ProgressionError::BossLocked { completed: 1, required: 20 }));
        assert_eq!(state, before);
    }

    #[test]
    fn test_boss_advances_phase() {
        let mut state = LearnerState::new("kid", Utc::now());
        finish_phase(&mut state, "s");
        let outcome = defeat_boss(&mut state, "starters_boss", 500, 100).unwrap();
        assert_eq!(outcome.defeated_phase, Phase::Starters);
        assert_eq!(outcome.advanced_to, Some(Phase::Movers));
        assert!(!outcome.campaign_complete);
        assert_eq!(state.linear.current_phase, Phase::Movers);
        assert_eq!(state.linear.current_round, 1);
        assert!(state.linear.rounds_completed.is_empty());
        assert!(state.linear.bosses_defeated.contains(&Phase::Starters));
        assert_eq!(state.linear.total_gems_earned, 200);
    }

    #[test]
    fn test_full_campaign() {
        let mut state = LearnerState::new("kid", Utc::now());
        for (phase, boss) in [("s", "starters_boss"), ("m", "movers_boss"), ("f", "flyers_boss")] {
            finish_phase(&mut state, phase);
            defeat_boss(&mut state, boss, 500, 100).unwrap();
        }
        assert_eq!(state.linear.current_phase, Phase::Flyers);
        assert!(state.linear.is_campaign_complete());
        assert_eq!(state.linear.bosses_defeated.len(), 3);

        let err = defeat_boss(&mut state, "flyers_boss", 500, 100).unwrap_err();
        assert!(matches!(err, ProgressionError::AlreadyCompleted(_)));
        let err = complete_round(&mut state, "f_r99", 10, 5).unwrap_err();
        assert!(matches!(err, ProgressionError::PhaseComplete(_)));
    }

    #[test]
    fn test_phase_order_and_successor() {
        assert!(Phase::Starters < Phase::Movers);
        assert!(Phase::Movers < Phase::Flyers);
        assert_eq!(Phase::Movers.successor(), Some(Phase::Flyers));
        assert_eq!(Phase::Flyers.successor(), None);
    }
}
