//! Mission tracker.
//!
//! Progress accumulates per mission and is clamped to the catalog total.
//! Reaching the total marks the mission completed, stamps `claimed_at` and
//! grants the XP reward in one step; a completed mission never pays again.

use super::levels::grant_xp;
use crate::catalog::{Catalog, MissionDef};
use crate::error::{ProgressionError, Result};
use crate::state::LearnerState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionProgress {
    pub completed: u32,
    pub total: u32,
    pub is_completed: bool,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl MissionProgress {
    pub fn new(total: u32) -> Self {
        Self {
            completed: 0,
            total,
            is_completed: false,
            claimed_at: None,
        }
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.completed as f64 / self.total as f64).min(1.0)
    }
}

/// What a mission call changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionUpdate {
    pub completed: u32,
    pub total: u32,
    /// True only on the call that completed the mission
    pub just_completed: bool,
    pub xp_awarded: u64,
    pub leveled_up: bool,
}

fn lookup<'a>(catalog: &'a Catalog, mission_id: &str) -> Result<&'a MissionDef> {
    catalog
        .mission(mission_id)
        .ok_or_else(|| ProgressionError::MissionNotFound(mission_id.to_string()))
}

/// Add `amount` units of progress to a mission
pub fn record_progress(
    state: &mut LearnerState,
    catalog: &Catalog,
    mission_id: &str,
    amount: i64,
    now: DateTime<Utc>,
) -> Result<MissionUpdate> {
    let def = lookup(catalog, mission_id)?;
    if amount < 0 {
        return Err(ProgressionError::InvalidAmount(amount));
    }

    let mut progress = state
        .mission_progress
        .get(mission_id)
        .cloned()
        .unwrap_or_else(|| MissionProgress::new(def.total));

    if progress.is_completed {
        return Ok(MissionUpdate {
            completed: progress.completed,
            total: progress.total,
            ..Default::default()
        });
    }

    let summed = (progress.completed as u64).saturating_add(amount as u64);
    progress.completed = summed.min(progress.total as u64) as u32;

    let mut update = MissionUpdate::default();
    if progress.completed >= progress.total {
        update = complete(state, def, &mut progress, now);
    }
    update.completed = progress.completed;
    update.total = progress.total;

    state.mission_progress.insert(mission_id.to_string(), progress);
    Ok(update)
}

/// Explicitly claim a mission whose counter already reached its total
pub fn claim(
    state: &mut LearnerState,
    catalog: &Catalog,
    mission_id: &str,
    now: DateTime<Utc>,
) -> Result<MissionUpdate> {
    let def = lookup(catalog, mission_id)?;
    let mut progress = state
        .mission_progress
        .get(mission_id)
        .cloned()
        .unwrap_or_else(|| MissionProgress::new(def.total));

    if progress.is_completed {
        return Err(ProgressionError::AlreadyCompleted(mission_id.to_string()));
    }
    if progress.completed < progress.total {
        return Err(ProgressionError::MissionIncomplete {
            completed: progress.completed,
            total: progress.total,
        });
    }

    let mut update = complete(state, def, &mut progress, now);
    update.completed = progress.completed;
    update.total = progress.total;
    state.mission_progress.insert(mission_id.to_string(), progress);
    Ok(update)
}

fn complete(
    state: &mut LearnerState,
    def: &MissionDef,
    progress: &mut MissionProgress,
    now: DateTime<Utc>,
) -> MissionUpdate {
    progress.is_completed = true;
    progress.claimed_at = Some(now);
    let leveled_up = grant_xp(state, def.reward.xp);

    info!(
        user_id = %state.user_id,
        mission_id = %def.id,
        xp = def.reward.xp,
        "mission completed"
    );

    MissionUpdate {
        just_completed: true,
        xp_awarded: def.reward.xp,
        leveled_up,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MissionReward;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_mission(MissionDef {
                id: "daily_words".into(),
                title: "Learn 5 words".into(),
                category: "daily".into(),
                total: 5,
                reward: MissionReward { xp: 200, coins: 0 },
            })
            .with_mission(MissionDef {
                id: "free_gift".into(),
                title: String::new(),
                category: "special".into(),
                total: 0,
                reward: MissionReward { xp: 10, coins: 0 },
            })
    }

    #[test]
    fn test_progress_accumulates_and_completes() {
        let mut state = LearnerState::new("kid", Utc::now());
        let cat = catalog();

        let update = record_progress(&mut state, &cat, "daily_words", 2, Utc::now()).unwrap();
        assert_eq!(update.completed, 2);
        assert!(!update.just_completed);
        assert_eq!(state.total_xp, 0);

        let update = record_progress(&mut state, &cat, "daily_words", 10, Utc::now()).unwrap();
        assert!(update.just_completed);
        assert_eq!(update.completed, 5);
        assert_eq!(update.xp_awarded, 200);
        assert!(update.leveled_up);
        assert_eq!(state.total_xp, 200);

        let progress = &state.mission_progress["daily_words"];
        assert!(progress.is_completed);
        assert!(progress.claimed_at.is_some());
    }

    #[test]
    fn test_completed_mission_never_pays_twice() {
        let mut state = LearnerState::new("kid", Utc::now());
        let cat = catalog();
        record_progress(&mut state, &cat, "daily_words", 5, Utc::now()).unwrap();
        let update = record_progress(&mut state, &cat, "daily_words", 5, Utc::now()).unwrap();
        assert!(!update.just_completed);
        assert_eq!(update.xp_awarded, 0);
        assert_eq!(state.total_xp, 200);
        assert_eq!(state.mission_progress["daily_words"].completed, 5);
    }

    #[test]
    fn test_unknown_mission_and_negative_amount() {
        let mut state = LearnerState::new("kid", Utc::now());
        let cat = catalog();
        assert!(matches!(
            record_progress(&mut state, &cat, "nope", 1, Utc::now()),
            Err(ProgressionError::MissionNotFound(_))
        ));
        assert!(matches!(
            record_progress(&mut state, &cat, "daily_words", -1, Utc::now()),
            Err(ProgressionError::InvalidAmount(-1))
        ));
        assert!(state.mission_progress.is_empty());
    }

    #[test]
    fn test_claim_rules() {
        let mut state = LearnerState::new("kid", Utc::now());
        let cat = catalog();

        record_progress(&mut state, &cat, "daily_words", 1, Utc::now()).unwrap();
        assert!(matches!(
            claim(&mut state, &cat, "daily_words", Utc::now()),
            Err(ProgressionError::MissionIncomplete { completed: 1, total: 5 })
        ));

        let update = claim(&mut state, &cat, "free_gift", Utc::now()).unwrap();
        assert_eq!(update.xp_awarded, 10);
        assert!(matches!(
            claim(&mut state, &cat, "free_gift", Utc::now()),
            Err(ProgressionError::AlreadyCompleted(_))
        ));
    }

    #[test]
    fn test_fraction() {
        let mut progress = MissionProgress::new(4);
        progress.completed = 1;
        assert_eq!(progress.fraction(), 0.25);
        assert_eq!(MissionProgress::new(0).fraction(), 1.0);
    }
}
