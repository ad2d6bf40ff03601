//! Invariant guards for `LearnerState`.
//!
//! The coordinator runs these against every candidate snapshot before it is
//! committed. A violation is logged as a structured "INVARIANT_VIOLATION"
//! event and the candidate is discarded.

use crate::error::{ProgressionError, Result};
use crate::progression::levels::{level_for_xp, MAX_LEVEL};
use crate::progression::linear::{Phase, ROUNDS_PER_PHASE};
use crate::progression::pet::{level_for_experience, PET_STAT_MAX};
use crate::progression::sandbox::TOPIC_DIFFICULTY_CAP;
use crate::state::LearnerState;
use tracing::warn;

// ============================================================================
// Violation Logging
// ============================================================================

struct Violations<'a> {
    user_id: &'a str,
    found: Vec<String>,
}

impl<'a> Violations<'a> {
    fn new(user_id: &'a str) -> Self {
        Self {
            user_id,
            found: Vec::new(),
        }
    }

    fn check(&mut self, ok: bool, invariant_id: &str, detail: impl FnOnce() -> String) {
        if ok {
            return;
        }
        let detail = detail();
        warn!(
            user_id = self.user_id,
            invariant_id = invariant_id,
            detail = %detail,
            "INVARIANT_VIOLATION"
        );
        self.found.push(format!("{}: {}", invariant_id, detail));
    }

    fn finish(self) -> Result<()> {
        if self.found.is_empty() {
            Ok(())
        } else {
            Err(ProgressionError::InvariantViolation(self.found.join("; ")))
        }
    }
}

// ============================================================================
// Snapshot Invariants
// ============================================================================

/// Check every structural invariant of a single snapshot
pub fn validate(state: &LearnerState) -> Result<()> {
    let mut v = Violations::new(&state.user_id);
    let linear = &state.linear;
    let sandbox = &state.sandbox;

    v.check((1..=MAX_LEVEL).contains(&state.current_level), "level_range", || {
        format!("level {} outside 1-{}", state.current_level, MAX_LEVEL)
    });
    let expected_level = level_for_xp(state.total_xp);
    v.check(state.current_level == expected_level, "level_matches_xp", || {
        format!(
            "level {} but {} XP means level {}",
            state.current_level, state.total_xp, expected_level
        )
    });
    v.check(state.total_xp >= linear.total_xp_earned, "xp_covers_linear", || {
        format!("total {} < linear {}", state.total_xp, linear.total_xp_earned)
    });

    v.check(
        (1..=ROUNDS_PER_PHASE as u32).contains(&linear.current_round),
        "round_range",
        || format!("round {}", linear.current_round),
    );
    v.check(linear.rounds_completed.len() <= ROUNDS_PER_PHASE, "rounds_per_phase", || {
        format!("{} rounds completed", linear.rounds_completed.len())
    });
    for phase in Phase::ALL {
        let defeated = linear.bosses_defeated.contains(&phase);
        if phase < linear.current_phase {
            v.check(defeated, "earlier_boss_defeated", || {
                format!("in {} without beating {} boss", linear.current_phase, phase)
            });
        } else if phase > linear.current_phase {
            v.check(!defeated, "no_future_boss", || {
                format!("{} boss beaten while in {}", phase, linear.current_phase)
            });
        }
    }

    v.check(linear.total_gems_earned >= sandbox.total_gems_spent, "gems_solvent", || {
        format!(
            "spent {} of {} earned",
            sandbox.total_gems_spent, linear.total_gems_earned
        )
    });
    v.check(
        sandbox.total_activities_completed == sandbox.completed_activities.len() as u64,
        "activity_count",
        || {
            format!(
                "counter {} but {} completed",
                sandbox.total_activities_completed,
                sandbox.completed_activities.len()
            )
        },
    );
    for (topic_id, topic) in &sandbox.topic_progress {
        v.check(sandbox.unlocked_topics.contains(topic_id), "topic_unlocked", || {
            format!("progress for locked topic {}", topic_id)
        });
        let max = topic.easy_completed.max(topic.medium_completed).max(topic.hard_completed);
        v.check(max <= TOPIC_DIFFICULTY_CAP, "topic_cap", || {
            format!("topic {} counter {}", topic_id, max)
        });
    }

    for (mission_id, mission) in &state.mission_progress {
        v.check(mission.completed <= mission.total, "mission_bounded", || {
            format!("{} at {}/{}", mission_id, mission.completed, mission.total)
        });
        v.check(!mission.is_completed || mission.claimed_at.is_some(), "mission_claimed", || {
            format!("{} completed without claim time", mission_id)
        });
    }

    if let Some(pet) = &state.pet {
        v.check(
            pet.happiness <= PET_STAT_MAX && pet.health <= PET_STAT_MAX,
            "pet_stats_range",
            || format!("happiness {} health {}", pet.happiness, pet.health),
        );
        v.check(pet.level == level_for_experience(pet.experience), "pet_level_matches_xp", || {
            format!("pet level {} with {} experience", pet.level, pet.experience)
        });
    }

    v.finish()
}

// ============================================================================
// Transition Invariants
// ============================================================================

/// Check that nothing cumulative went backwards between two snapshots
pub fn validate_transition(before: &LearnerState, after: &LearnerState) -> Result<()> {
    let mut v = Violations::new(&after.user_id);

    let counters = [
        ("total_xp", before.total_xp, after.total_xp),
        ("current_level", before.current_level as u64, after.current_level as u64),
        ("total_xp_earned", before.linear.total_xp_earned, after.linear.total_xp_earned),
        ("total_gems_earned", before.linear.total_gems_earned, after.linear.total_gems_earned),
        ("total_gems_spent", before.sandbox.total_gems_spent, after.sandbox.total_gems_spent),
        (
            "total_activities_completed",
            before.sandbox.total_activities_completed,
            after.sandbox.total_activities_completed,
        ),
    ];
    for (name, old, new) in counters {
        v.check(new >= old, "monotonic", || format!("{} went from {} to {}", name, old, new));
    }

    v.check(after.badges_unlocked.is_superset(&before.badges_unlocked), "badges_append_only", || {
        "badge removed".to_string()
    });
    v.check(
        after.linear.bosses_defeated.is_superset(&before.linear.bosses_defeated),
        "bosses_append_only",
        || "boss defeat removed".to_string(),
    );
    v.check(after.linear.current_phase >= before.linear.current_phase, "phase_forward", || {
        format!("{} -> {}", before.linear.current_phase, after.linear.current_phase)
    });
    v.check(
        after.sandbox.unlocked_islands.is_superset(&before.sandbox.unlocked_islands)
            && after.sandbox.unlocked_topics.is_superset(&before.sandbox.unlocked_topics),
        "unlocks_append_only",
        || "unlock removed".to_string(),
    );
    match (&before.pet, &after.pet) {
        (Some(_), None) => v.check(false, "pet_kept", || "pet removed".to_string()),
        (Some(old), Some(new)) => v.check(
            new.experience >= old.experience && new.adopted_at == old.adopted_at,
            "pet_kept",
            || format!("pet experience {} -> {}", old.experience, new.experience),
        ),
        _ => {}
    }

    v.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::levels::add_xp;
    use crate::progression::linear::complete_round;
    use chrono::Utc;

    #[test]
    fn test_fresh_state_is_valid() {
        let state = LearnerState::new("kid", Utc::now());
        assert!(validate(&state).is_ok());
    }

    #[test]
    fn test_stale_level_detected() {
        let mut state = LearnerState::new("kid", Utc::now());
        state.total_xp = 500;
        let err = validate(&state).unwrap_err();
        assert!(matches!(err, ProgressionError::InvariantViolation(ref m) if m.contains("level_matches_xp")));
    }

    #[test]
    fn test_overspent_gems_detected() {
        let mut state = LearnerState::new("kid", Utc::now());
        state.sandbox.total_gems_spent = 10;
        assert!(validate(&state).is_err());
    }

    #[test]
    fn test_skipped_boss_detected() {
        let mut state = LearnerState::new("kid", Utc::now());
        state.linear.current_phase = Phase::Movers;
        let err = validate(&state).unwrap_err();
        assert!(matches!(err, ProgressionError::InvariantViolation(ref m) if m.contains("earlier_boss_defeated")));
    }

    #[test]
    fn test_orphan_topic_progress_detected() {
        let mut state = LearnerState::new("kid", Utc::now());
        state
            .sandbox
            .topic_progress
            .insert("t".into(), crate::progression::sandbox::TopicProgress::new("T"));
        assert!(validate(&state).is_err());
    }

    #[test]
    fn test_pet_bounds_and_removal_detected() {
        let now = Utc::now();
        let before = LearnerState::new("kid", now);
        let mut after = before.clone();
        crate::progression::pet::adopt_pet(&mut after, crate::progression::pet::PetKind::Cat, "Tom", now).unwrap();
        assert!(validate(&after).is_ok());
        assert!(validate_transition(&before, &after).is_ok());
        assert!(validate_transition(&after, &before).is_err());

        if let Some(pet) = after.pet.as_mut() {
            pet.happiness = 140;
        }
        assert!(validate(&after).is_err());
    }

    #[test]
    fn test_transition_monotonic() {
        let before = LearnerState::new("kid", Utc::now());
        let mut after = before.clone();
        add_xp(&mut after, 200).unwrap();
        complete_round(&mut after, "r1", 10, 5).unwrap();
        assert!(validate(&after).is_ok());
        assert!(validate_transition(&before, &after).is_ok());
        assert!(validate_transition(&after, &before).is_err());
    }
}
