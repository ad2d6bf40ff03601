//! Progression coordinator.
//!
//! The single entry point for changing a learner. Every mutating call runs
//! the same pipeline:
//!
//! 1. load the snapshot and its version
//! 2. apply the rule to a clone
//! 3. validate the clone (snapshot and transition invariants)
//! 4. stamp `last_updated_at` and compare-and-set it back
//!
//! A version conflict restarts the pipeline from a fresh load. It is retried
//! up to `engine.max_commit_retries` times, so a setting of N allows N + 1
//! attempts. Any other failure returns the untouched snapshot alongside the
//! error. Calls that change nothing skip the write.
//!
//! Flashcard records have no version token, so answers for one user are
//! serialised by a per-user lock instead. The lock entry is dropped once no
//! answer for that user is in flight.

use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::config::ProgressionConfig;
use crate::error::{ProgressionError, Result};
use crate::invariants;
use crate::progression::badges::{self, BadgeUnlock};
use crate::progression::levels;
use crate::progression::linear::{self, BossOutcome, RoundOutcome};
use crate::progression::missions::{self, MissionUpdate};
use crate::progression::pet::{self, PetCare, PetKind, VirtualPet};
use crate::progression::sandbox::{self, ActivityOutcome, Difficulty, UnlockOutcome};
use crate::progression::spaced::{self, CardBuckets, FlashcardProgress, ReviewQuality, ReviewSchedule, ReviewStatistics};
use crate::progression::streaks::{self, StreakChange};
use crate::progression::summary::ProgressSummary;
use crate::state::LearnerState;
use crate::store::{CardProgressStore, StateStore, Versioned};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

/// A committed (or no-op) operation
#[derive(Debug, Clone)]
pub struct Applied<T> {
    /// Snapshot as stored after the call
    pub snapshot: LearnerState,
    pub version: u64,
    pub outcome: T,
}

/// A failed operation. `original` is the snapshot as it was loaded, when
/// the failure happened after a load.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Rejected {
    #[source]
    pub error: ProgressionError,
    pub original: Option<Box<LearnerState>>,
}

impl Rejected {
    fn with_original(error: ProgressionError, original: LearnerState) -> Self {
        Self {
            error,
            original: Some(Box::new(original)),
        }
    }
}

impl From<ProgressionError> for Rejected {
    fn from(error: ProgressionError) -> Self {
        Self { error, original: None }
    }
}

pub type Outcome<T> = std::result::Result<Applied<T>, Rejected>;

/// Result of grading one flashcard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardReview {
    pub card_id: String,
    pub quality: ReviewQuality,
    pub schedule: ReviewSchedule,
    pub progress: FlashcardProgress,
}

/// Interval a quality button would schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalPreview {
    pub quality: ReviewQuality,
    pub days: u32,
    pub label: String,
}

pub struct ProgressionCoordinator<S, C, K> {
    store: S,
    cards: C,
    clock: K,
    catalog: Arc<Catalog>,
    config: ProgressionConfig,
    card_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S, C, K> ProgressionCoordinator<S, C, K>
where
    S: StateStore,
    C: CardProgressStore,
    K: Clock,
{
    pub fn new(store: S, cards: C, clock: K, catalog: Arc<Catalog>, config: ProgressionConfig) -> Self {
        Self {
            store,
            cards,
            clock,
            catalog,
            config,
            card_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &ProgressionConfig {
        &self.config
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load the learner, creating a zeroed record on first session.
    ///
    /// The outcome is true when this call created the record.
    pub fn start_session(&self, user_id: &str) -> Outcome<bool> {
        let attempts = self.commit_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.load(user_id) {
                Ok(Versioned { version, value }) => {
                    return Ok(Applied {
                        snapshot: value,
                        version,
                        outcome: false,
                    })
                }
                Err(ProgressionError::NotFound(_)) => {}
                Err(error) => return Err(error.into()),
            }

            let state = LearnerState::new(user_id, self.clock.now());
            match self.store.save(user_id, &state, 0) {
                Ok(version) => {
                    debug!(user_id, "learner created");
                    return Ok(Applied {
                        snapshot: state,
                        version,
                        outcome: true,
                    });
                }
                // Created concurrently; load theirs
                Err(error) if error.is_retryable() && attempt < attempts => {
                    debug!(user_id, attempt, "learner created concurrently, reloading");
                }
                Err(error) => {
                    if error.is_retryable() {
                        warn!(user_id, op = "start_session", attempts, "version conflict, giving up");
                    }
                    return Err(error.into());
                }
            }
        }
    }

    pub fn snapshot(&self, user_id: &str) -> Result<Versioned<LearnerState>> {
        self.store.load(user_id)
    }

    // ========================================================================
    // Commit pipeline
    // ========================================================================

    fn commit_attempts(&self) -> u32 {
        self.config.engine.max_commit_retries.saturating_add(1)
    }

    fn mutate<T, F>(&self, user_id: &str, op: &'static str, mut apply: F) -> Outcome<T>
    where
        F: FnMut(&mut LearnerState, DateTime<Utc>) -> Result<T>,
    {
        let attempts = self.commit_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let Versioned { version, value: original } = self.store.load(user_id)?;
            let now = self.clock.now();

            let mut candidate = original.clone();
            let outcome = match apply(&mut candidate, now) {
                Ok(outcome) => outcome,
                Err(error) => {
                    debug!(user_id, op, %error, "operation rejected");
                    return Err(Rejected::with_original(error, original));
                }
            };

            if candidate == original {
                debug!(user_id, op, version, "no change");
                return Ok(Applied {
                    snapshot: original,
                    version,
                    outcome,
                });
            }

            let checked = invariants::validate(&candidate)
                .and_then(|_| invariants::validate_transition(&original, &candidate));
            if let Err(error) = checked {
                return Err(Rejected::with_original(error, original));
            }

            candidate.last_updated_at = now;
            match self.store.save(user_id, &candidate, version) {
                Ok(new_version) => {
                    debug!(user_id, op, version = new_version, "committed");
                    return Ok(Applied {
                        snapshot: candidate,
                        version: new_version,
                        outcome,
                    });
                }
                Err(error) if error.is_retryable() && attempt < attempts => {
                    warn!(user_id, op, attempt, %error, "version conflict, retrying");
                }
                Err(error) => {
                    if error.is_retryable() {
                        warn!(user_id, op, attempts, "version conflict, giving up");
                    }
                    return Err(Rejected::with_original(error, original));
                }
            }
        }
    }

    // ========================================================================
    // XP, missions, badges, streaks
    // ========================================================================

    /// Outcome is the level-up flag
    pub fn add_xp(&self, user_id: &str, amount: i64) -> Outcome<bool> {
        self.mutate(user_id, "add_xp", |state, _| levels::add_xp(state, amount))
    }

    pub fn record_mission_progress(&self, user_id: &str, mission_id: &str, amount: i64) -> Outcome<MissionUpdate> {
        self.mutate(user_id, "record_mission_progress", |state, now| {
            missions::record_progress(state, &self.catalog, mission_id, amount, now)
        })
    }

    pub fn claim_mission(&self, user_id: &str, mission_id: &str) -> Outcome<MissionUpdate> {
        self.mutate(user_id, "claim_mission", |state, now| {
            missions::claim(state, &self.catalog, mission_id, now)
        })
    }

    pub fn unlock_badge(&self, user_id: &str, badge_id: &str) -> Outcome<BadgeUnlock> {
        self.mutate(user_id, "unlock_badge", |state, _| {
            badges::unlock_badge(state, &self.catalog, badge_id)
        })
    }

    /// Count today (by the injected clock) towards the daily streak
    pub fn record_activity(&self, user_id: &str) -> Outcome<StreakChange> {
        self.mutate(user_id, "record_activity", |state, now| {
            Ok(streaks::record_activity(state, now.date_naive()))
        })
    }

    // ========================================================================
    // Linear path
    // ========================================================================

    pub fn complete_round(&self, user_id: &str, round_id: &str, xp: i64, gems: i64) -> Outcome<RoundOutcome> {
        self.mutate(user_id, "complete_round", |state, _| {
            linear::complete_round(state, round_id, xp, gems)
        })
    }

    pub fn defeat_boss(&self, user_id: &str, boss_id: &str, xp: i64, gems: i64) -> Outcome<BossOutcome> {
        self.mutate(user_id, "defeat_boss", |state, _| {
            linear::defeat_boss(state, boss_id, xp, gems)
        })
    }

    // ========================================================================
    // Sandbox
    // ========================================================================

    pub fn unlock_island(&self, user_id: &str, island_id: &str, cost: i64) -> Outcome<UnlockOutcome> {
        self.mutate(user_id, "unlock_island", |state, _| {
            sandbox::unlock_island(state, island_id, cost)
        })
    }

    pub fn unlock_topic(&self, user_id: &str, topic_id: &str, topic_name: &str, cost: i64) -> Outcome<UnlockOutcome> {
        self.mutate(user_id, "unlock_topic", |state, _| {
            sandbox::unlock_topic(state, topic_id, topic_name, cost)
        })
    }

    pub fn complete_activity(&self, user_id: &str, activity_id: &str, score: i64, xp: i64) -> Outcome<ActivityOutcome> {
        self.mutate(user_id, "complete_activity", |state, _| {
            sandbox::complete_activity(state, activity_id, score, xp)
        })
    }

    /// Outcome is the difficulty counter after the update
    pub fn update_topic_progress(
        &self,
        user_id: &str,
        topic_id: &str,
        difficulty: Difficulty,
        completed: bool,
    ) -> Outcome<u32> {
        self.mutate(user_id, "update_topic_progress", |state, now| {
            sandbox::update_topic_progress(state, topic_id, difficulty, completed, now)
        })
    }

    // ========================================================================
    // Virtual pet
    // ========================================================================

    pub fn adopt_pet(&self, user_id: &str, kind: PetKind, name: &str) -> Outcome<VirtualPet> {
        self.mutate(user_id, "adopt_pet", |state, now| pet::adopt_pet(state, kind, name, now))
    }

    pub fn feed_pet(&self, user_id: &str) -> Outcome<PetCare> {
        self.mutate(user_id, "feed_pet", |state, now| pet::feed_pet(state, now))
    }

    pub fn play_with_pet(&self, user_id: &str) -> Outcome<PetCare> {
        self.mutate(user_id, "play_with_pet", |state, now| pet::play_with_pet(state, now))
    }

    // ========================================================================
    // Flashcards
    // ========================================================================

    fn card_lock(&self, user_id: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .card_locks
            .lock()
            .map_err(|_| ProgressionError::Storage("card lock table poisoned".to_string()))?;
        Ok(Arc::clone(locks.entry(user_id.to_string()).or_default()))
    }

    /// Drop the user's entry when only the table and `lock` still hold it
    fn release_card_lock(&self, user_id: &str, lock: Arc<Mutex<()>>) {
        if let Ok(mut locks) = self.card_locks.lock() {
            if Arc::strong_count(&lock) == 2 {
                locks.remove(user_id);
            }
        }
    }

    /// Grade a card. Unseen cards start from the configured ease.
    pub fn answer_flashcard(&self, user_id: &str, card_id: &str, quality: i64) -> Result<CardReview> {
        let quality = ReviewQuality::try_from(quality)?;
        let lock = self.card_lock(user_id)?;
        let review = match lock.lock() {
            Ok(_guard) => self.grade_card(user_id, card_id, quality),
            Err(_) => Err(ProgressionError::Storage("card lock poisoned".to_string())),
        };
        self.release_card_lock(user_id, lock);
        review
    }

    fn grade_card(&self, user_id: &str, card_id: &str, quality: ReviewQuality) -> Result<CardReview> {
        let now = self.clock.now();
        let mut progress = self
            .cards
            .load(user_id, card_id)?
            .unwrap_or_else(|| FlashcardProgress::new(now, self.config.review.new_card_ease));
        let schedule = progress.record_review(quality, now);
        self.cards.save(user_id, card_id, &progress)?;

        debug!(
            user_id,
            card_id,
            quality = quality.label(),
            interval = schedule.interval,
            "flashcard reviewed"
        );
        Ok(CardReview {
            card_id: card_id.to_string(),
            quality,
            schedule,
            progress,
        })
    }

    /// What each quality button would schedule for this card right now
    pub fn preview_intervals(&self, user_id: &str, card_id: &str) -> Result<Vec<IntervalPreview>> {
        let now = self.clock.now();
        let (ease, interval) = match self.cards.load(user_id, card_id)? {
            Some(card) => (card.ease_factor, card.interval),
            None => (self.config.review.new_card_ease, 0),
        };
        Ok(spaced::preview_intervals(ease, interval, now)
            .into_iter()
            .map(|(quality, days)| IntervalPreview {
                quality,
                days,
                label: spaced::format_interval(days),
            })
            .collect())
    }

    pub fn review_statistics(&self, user_id: &str) -> Result<ReviewStatistics> {
        let deck = self.cards.list(user_id)?;
        Ok(spaced::review_statistics(&deck, self.clock.now()))
    }

    pub fn card_buckets(&self, user_id: &str) -> Result<CardBuckets> {
        let deck = self.cards.list(user_id)?;
        Ok(spaced::partition(&deck, self.clock.now()))
    }

    /// Card ids due now
    pub fn due_cards(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self.card_buckets(user_id)?.due)
    }

    // ========================================================================
    // Read side
    // ========================================================================

    pub fn summary(&self, user_id: &str) -> Result<ProgressSummary> {
        let snapshot = self.store.load(user_id)?;
        Ok(ProgressSummary::from_state(
            &snapshot.value,
            self.config.sandbox.discoverable_islands,
        ))
    }
}
