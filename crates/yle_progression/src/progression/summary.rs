//! Read-only progress summary for dashboards.

use super::levels::LevelProgress;
use super::linear::Phase;
use super::pet::PetMood;
use crate::state::LearnerState;
use serde::{Deserialize, Serialize};

/// Weight of the linear path in the combined completion figure
const LINEAR_WEIGHT: f64 = 0.6;
const SANDBOX_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub user_id: String,
    pub level: LevelProgress,
    #[serde(rename = "totalXP")]
    pub total_xp: u64,
    pub gems_available: u64,
    pub streak_days: u32,
    pub badges: usize,
    pub current_phase: Phase,
    pub current_round: u32,
    pub rounds_until_boss: usize,
    pub campaign_complete: bool,
    /// Share of the current phase completed (0.0 - 1.0)
    pub linear_percentage: f64,
    /// Share of discoverable islands unlocked (0.0 - 1.0)
    pub discovery_percentage: f64,
    /// 60% linear + 40% sandbox
    pub combined_completion: f64,
    pub activities_completed: u64,
    pub average_activity_score: f64,
    /// None until a pet is adopted
    pub pet_mood: Option<PetMood>,
}

impl ProgressSummary {
    pub fn from_state(state: &LearnerState, discoverable_islands: u32) -> Self {
        let linear_percentage = state.linear.progress_percentage();
        let discovery_percentage = state.sandbox.discovery_percentage(discoverable_islands);

        Self {
            user_id: state.user_id.clone(),
            level: LevelProgress::from_xp(state.total_xp),
            total_xp: state.total_xp,
            gems_available: state.gems_available(),
            streak_days: state.streak_days,
            badges: state.badges_unlocked.len(),
            current_phase: state.linear.current_phase,
            current_round: state.linear.current_round,
            rounds_until_boss: state.linear.rounds_until_boss(),
            campaign_complete: state.linear.is_campaign_complete(),
            linear_percentage,
            discovery_percentage,
            combined_completion: linear_percentage * LINEAR_WEIGHT + discovery_percentage * SANDBOX_WEIGHT,
            activities_completed: state.sandbox.total_activities_completed,
            average_activity_score: state.sandbox.average_activity_score(),
            pet_mood: state.pet.as_ref().map(|pet| pet.mood()),
        }
    }
}
