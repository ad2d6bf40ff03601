//! Learner state aggregate.
//!
//! One `LearnerState` per user. It is created zeroed on the first
//! authenticated session and only ever changed through the coordinator.

use crate::progression::linear::LinearPathProgress;
use crate::progression::missions::MissionProgress;
use crate::progression::pet::VirtualPet;
use crate::progression::sandbox::SandboxProgress;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Root aggregate for a single learner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerState {
    /// Opaque user identifier
    pub user_id: String,
    /// Cumulative XP, never decreases
    #[serde(rename = "totalXP")]
    pub total_xp: u64,
    /// Cached level derived from `total_xp` (1-100)
    pub current_level: u32,
    /// Consecutive active days
    pub streak_days: u32,
    /// Last calendar day an activity was recorded
    #[serde(default)]
    pub last_active_on: Option<NaiveDate>,
    /// Append-only badge ids
    #[serde(default)]
    pub badges_unlocked: BTreeSet<String>,
    /// Mission id -> progress counters
    #[serde(default)]
    pub mission_progress: BTreeMap<String, MissionProgress>,
    /// Structured curriculum track
    pub linear: LinearPathProgress,
    /// Free-exploration track
    pub sandbox: SandboxProgress,
    /// Adopted companion, if any
    #[serde(default)]
    pub pet: Option<VirtualPet>,
    /// Stamped on every mutation
    pub last_updated_at: DateTime<Utc>,
}

impl LearnerState {
    /// Fresh learner: all counters zeroed, Starters phase, round 1
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_xp: 0,
            current_level: 1,
            streak_days: 0,
            last_active_on: None,
            badges_unlocked: BTreeSet::new(),
            mission_progress: BTreeMap::new(),
            linear: LinearPathProgress::default(),
            sandbox: SandboxProgress::default(),
            pet: None,
            last_updated_at: now,
        }
    }

    /// Gems earned on the linear path minus gems spent in the sandbox
    pub fn gems_available(&self) -> u64 {
        self.linear
            .total_gems_earned
            .saturating_sub(self.sandbox.total_gems_spent)
    }
}
