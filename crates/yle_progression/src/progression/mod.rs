//! Progression rules: pure state transitions over `LearnerState`.
//!
//! Each module validates its inputs before touching state, so a returned
//! error always leaves the learner unchanged.

pub mod badges;
pub mod levels;
pub mod linear;
pub mod missions;
pub mod pet;
pub mod sandbox;
pub mod spaced;
pub mod streaks;
pub mod summary;

pub use badges::{unlock_badge, BadgeRarity, BadgeUnlock};
pub use levels::{add_xp, level_for_xp, xp_threshold, LevelProgress, MAX_LEVEL};
pub use linear::{BossOutcome, LinearPathProgress, Phase, RoundOutcome, ROUNDS_PER_PHASE};
pub use missions::{MissionProgress, MissionUpdate};
pub use pet::{adopt_pet, feed_pet, play_with_pet, PetCare, PetKind, PetMood, VirtualPet};
pub use sandbox::{ActivityOutcome, Difficulty, SandboxProgress, TopicProgress, UnlockOutcome};
pub use spaced::{
    format_interval, next_review, preview_intervals, review_statistics, CardBuckets, FlashcardProgress,
    ReviewQuality, ReviewSchedule, ReviewStatistics,
};
pub use streaks::{record_activity, StreakChange};
pub use summary::ProgressSummary;
