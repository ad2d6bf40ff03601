//! Sandbox economy.
//!
//! Islands and topics are bought with gems earned on the linear path. The
//! spendable balance is always `linear.total_gems_earned - total_gems_spent`
//! and is checked before any unlock touches state. Unlocks are idempotent:
//! a second unlock of the same id costs nothing.

use super::levels::grant_xp;
use crate::error::{ProgressionError, Result};
use crate::state::LearnerState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::info;

/// Per-difficulty completion cap for a topic
pub const TOPIC_DIFFICULTY_CAP: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl FromStr for Difficulty {
    type Err = ProgressionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            _ => Err(ProgressionError::InvalidDifficulty(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgress {
    pub topic_name: String,
    pub easy_completed: u32,
    pub medium_completed: u32,
    pub hard_completed: u32,
    #[serde(default)]
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl TopicProgress {
    pub fn new(topic_name: &str) -> Self {
        Self {
            topic_name: topic_name.to_string(),
            easy_completed: 0,
            medium_completed: 0,
            hard_completed: 0,
            last_completed_at: None,
        }
    }

    pub fn count(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Easy => self.easy_completed,
            Difficulty::Medium => self.medium_completed,
            Difficulty::Hard => self.hard_completed,
        }
    }

    fn count_mut(&mut self, difficulty: Difficulty) -> &mut u32 {
        match difficulty {
            Difficulty::Easy => &mut self.easy_completed,
            Difficulty::Medium => &mut self.medium_completed,
            Difficulty::Hard => &mut self.hard_completed,
        }
    }

    pub fn total_completed(&self) -> u32 {
        self.easy_completed + self.medium_completed + self.hard_completed
    }

    pub fn completion_percentage(&self) -> f64 {
        self.total_completed() as f64 / (TOPIC_DIFFICULTY_CAP * 3) as f64
    }

    pub fn is_mastered(&self) -> bool {
        [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
            .iter()
            .all(|&d| self.count(d) >= TOPIC_DIFFICULTY_CAP)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxProgress {
    pub unlocked_islands: BTreeSet<String>,
    pub unlocked_topics: BTreeSet<String>,
    pub topic_progress: BTreeMap<String, TopicProgress>,
    pub completed_activities: BTreeSet<String>,
    /// Latest score per activity
    pub activity_scores: BTreeMap<String, i64>,
    pub total_gems_spent: u64,
    pub total_activities_completed: u64,
}

impl SandboxProgress {
    pub fn average_activity_score(&self) -> f64 {
        if self.activity_scores.is_empty() {
            return 0.0;
        }
        // i128 holds the sum of any mix of i64 scores
        let total: i128 = self.activity_scores.values().map(|&score| score as i128).sum();
        total as f64 / self.activity_scores.len() as f64
    }

    /// Share of `discoverable` islands unlocked, capped at 1.0
    pub fn discovery_percentage(&self, discoverable: u32) -> f64 {
        if discoverable == 0 {
            return 0.0;
        }
        (self.unlocked_islands.len() as f64 / discoverable as f64).min(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum UnlockOutcome {
    Unlocked { gems_spent: u64 },
    AlreadyUnlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityOutcome {
    pub first_completion: bool,
    pub xp_awarded: u64,
    pub leveled_up: bool,
}

fn validate_cost(cost: i64) -> Result<u64> {
    if cost < 0 {
        return Err(ProgressionError::InvalidAmount(cost));
    }
    Ok(cost as u64)
}

fn ensure_funds(state: &LearnerState, cost: u64) -> Result<()> {
    let available = state.gems_available();
    if available < cost {
        return Err(ProgressionError::InsufficientGems {
            needed: cost,
            available,
        });
    }
    Ok(())
}

pub fn unlock_island(state: &mut LearnerState, island_id: &str, cost: i64) -> Result<UnlockOutcome> {
    let cost = validate_cost(cost)?;
    if state.sandbox.unlocked_islands.contains(island_id) {
        return Ok(UnlockOutcome::AlreadyUnlocked);
    }
    ensure_funds(state, cost)?;

    let sandbox = &mut state.sandbox;
    sandbox.unlocked_islands.insert(island_id.to_string());
    sandbox.total_gems_spent = sandbox.total_gems_spent.saturating_add(cost);

    info!(user_id = %state.user_id, island_id, cost, "island unlocked");
    Ok(UnlockOutcome::Unlocked { gems_spent: cost })
}

pub fn unlock_topic(state: &mut LearnerState, topic_id: &str, topic_name: &str, cost: i64) -> Result<UnlockOutcome> {
    let cost = validate_cost(cost)?;
    if state.sandbox.unlocked_topics.contains(topic_id) {
        return Ok(UnlockOutcome::AlreadyUnlocked);
    }
    ensure_funds(state, cost)?;

    let sandbox = &mut state.sandbox;
    sandbox.unlocked_topics.insert(topic_id.to_string());
    sandbox
        .topic_progress
        .entry(topic_id.to_string())
        .or_insert_with(|| TopicProgress::new(topic_name));
    sandbox.total_gems_spent = sandbox.total_gems_spent.saturating_add(cost);

    info!(user_id = %state.user_id, topic_id, cost, "topic unlocked");
    Ok(UnlockOutcome::Unlocked { gems_spent: cost })
}

/// Record an activity result. XP is paid on first completion only; repeats
/// just overwrite the stored score.
pub fn complete_activity(state: &mut LearnerState, activity_id: &str, score: i64, xp: i64) -> Result<ActivityOutcome> {
    if score < 0 {
        return Err(ProgressionError::InvalidAmount(score));
    }
    if xp < 0 {
        return Err(ProgressionError::InvalidAmount(xp));
    }

    let sandbox = &mut state.sandbox;
    sandbox.activity_scores.insert(activity_id.to_string(), score);
    let first_completion = sandbox.completed_activities.insert(activity_id.to_string());
    if !first_completion {
        return Ok(ActivityOutcome {
            first_completion,
            xp_awarded: 0,
            leveled_up: false,
        });
    }

    sandbox.total_activities_completed += 1;
    let leveled_up = grant_xp(state, xp as u64);
    Ok(ActivityOutcome {
        first_completion,
        xp_awarded: xp as u64,
        leveled_up,
    })
}

/// Bump a topic's difficulty counter. Returns the counter after the update.
pub fn update_topic_progress(
    state: &mut LearnerState,
    topic_id: &str,
    difficulty: Difficulty,
    completed: bool,
    now: DateTime<Utc>,
) -> Result<u32> {
    let topic = state
        .sandbox
        .topic_progress
        .get_mut(topic_id)
        .ok_or_else(|| ProgressionError::TopicNotFound(topic_id.to_string()))?;

    if completed {
        let counter = topic.count_mut(difficulty);
        if *counter < TOPIC_DIFFICULTY_CAP {
            *counter += 1;
        }
    }
    topic.last_completed_at = Some(now);
    Ok(topic.count(difficulty))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rich_state(gems: u64) -> LearnerState {
        let mut state = LearnerState::new("kid", Utc::now());
        state.linear.total_gems_earned = gems;
        state
    }

    #[test]
    fn test_unlock_island_spends_once() {
        let mut state = rich_state(100);
        assert_eq!(
            unlock_island(&mut state, "school", 50).unwrap(),
            UnlockOutcome::Unlocked { gems_spent: 50 }
        );
        assert_eq!(state.gems_available(), 50);
        assert_eq!(unlock_island(&mut state, "school", 50).unwrap(), UnlockOutcome::AlreadyUnlocked);
        assert_eq!(state.gems_available(), 50);
        assert_eq!(state.sandbox.total_gems_spent, 50);
    }

    #[test]
    fn test_insufficient_gems_leaves_state() {
        let mut state = rich_state(40);
        let before = state.clone();
        let err = unlock_island(&mut state, "school", 50).unwrap_err();
        assert!(matches!(err, ProgressionError::InsufficientGems { needed: 50, available: 40 }));
        assert_eq!(state, before);
    }

    #[test]
    fn test_free_unlock_and_negative_cost() {
        let mut state = rich_state(0);
        unlock_island(&mut state, "home", 0).unwrap();
        assert!(state.sandbox.unlocked_islands.contains("home"));
        assert!(matches!(
            unlock_island(&mut state, "zoo", -5),
            Err(ProgressionError::InvalidAmount(-5))
        ));
    }

    #[test]
    fn test_unlock_topic_initialises_progress() {
        let mut state = rich_state(30);
        unlock_topic(&mut state, "vocab_animals", "Animals", 30).unwrap();
        let topic = &state.sandbox.topic_progress["vocab_animals"];
        assert_eq!(topic.topic_name, "Animals");
        assert_eq!(topic.total_completed(), 0);
        assert_eq!(state.gems_available(), 0);
    }

    #[test]
    fn test_activity_xp_on_first_completion_only() {
        let mut state = rich_state(0);
        let first = complete_activity(&mut state, "spelling_1", 80, 20).unwrap();
        assert!(first.first_completion);
        assert_eq!(first.xp_awarded, 20);

        let again = complete_activity(&mut state, "spelling_1", 95, 20).unwrap();
        assert!(!again.first_completion);
        assert_eq!(again.xp_awarded, 0);
        assert_eq!(state.total_xp, 20);
        assert_eq!(state.sandbox.total_activities_completed, 1);
        assert_eq!(state.sandbox.activity_scores["spelling_1"], 95);
    }

    #[test]
    fn test_topic_progress_capped() {
        let mut state = rich_state(0);
        unlock_topic(&mut state, "t", "Topic", 0).unwrap();
        for _ in 0..8 {
            update_topic_progress(&mut state, "t", Difficulty::Easy, true, Utc::now()).unwrap();
        }
        let count = update_topic_progress(&mut state, "t", Difficulty::Hard, false, Utc::now()).unwrap();
        assert_eq!(count, 0);
        let topic = &state.sandbox.topic_progress["t"];
        assert_eq!(topic.easy_completed, TOPIC_DIFFICULTY_CAP);
        assert!(topic.last_completed_at.is_some());
        assert!(!topic.is_mastered());
    }

    #[test]
    fn test_topic_not_found() {
        let mut state = rich_state(0);
        let err = update_topic_progress(&mut state, "ghost", Difficulty::Easy, true, Utc::now()).unwrap_err();
        assert!(matches!(err, ProgressionError::TopicNotFound(_)));
    }

    #[test]
    fn test_difficulty_parsing() {
        assert_eq!("Easy".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert_eq!("hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!(matches!(
            "extreme".parse::<Difficulty>(),
            Err(ProgressionError::InvalidDifficulty(_))
        ));
    }

    #[test]
    fn test_discovery_and_average() {
        let mut state = rich_state(0);
        for island in ["a", "b", "c"] {
            unlock_island(&mut state, island, 0).unwrap();
        }
        assert_eq!(state.sandbox.discovery_percentage(12), 0.25);
        assert_eq!(state.sandbox.discovery_percentage(0), 0.0);
        complete_activity(&mut state, "x", 60, 0).unwrap();
        complete_activity(&mut state, "y", 100, 0).unwrap();
        assert_eq!(state.sandbox.average_activity_score(), 80.0);
    }

    #[test]
    fn test_average_of_huge_scores() {
        let mut state = rich_state(0);
        complete_activity(&mut state, "a", i64::MAX, 0).unwrap();
        complete_activity(&mut state, "b", i64::MAX, 0).unwrap();
        complete_activity(&mut state, "c", 1, 0).unwrap();
        let average = state.sandbox.average_activity_score();
        assert!(average > 0.0);
        assert!((average - (2.0 * i64::MAX as f64 + 1.0) / 3.0).abs() < 1e6);
    }

    #[test]
    fn test_unlock_topic_spends_once() {
        let mut state = rich_state(100);
        assert_eq!(
            unlock_topic(&mut state, "vocab_food", "Food", 40).unwrap(),
            UnlockOutcome::Unlocked { gems_spent: 40 }
        );
        update_topic_progress(&mut state, "vocab_food", Difficulty::Easy, true, Utc::now()).unwrap();
        assert_eq!(
            unlock_topic(&mut state, "vocab_food", "Food", 40).unwrap(),
            UnlockOutcome::AlreadyUnlocked
        );
        assert_eq!(state.gems_available(), 60);
        assert_eq!(state.sandbox.total_gems_spent, 40);
        assert_eq!(state.sandbox.topic_progress["vocab_food"].easy_completed, 1);
    }

    #[test]
    fn test_topic_insufficient_gems_leaves_state() {
        let mut state = rich_state(25);
        let before = state.clone();
        let err = unlock_topic(&mut state, "vocab_food", "Food", 30).unwrap_err();
        assert!(matches!(err, ProgressionError::InsufficientGems { needed: 30, available: 25 }));
        assert_eq!(state, before);
        assert!(!state.sandbox.topic_progress.contains_key("vocab_food"));
    }
}
