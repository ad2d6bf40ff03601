//! Learner progression engine for YLE X.
//!
//! Pure state transitions for XP and levels, SM-2 flashcard scheduling,
//! missions, badges, streaks, the Starters/Movers/Flyers linear path and the
//! gem-funded sandbox, fronted by a coordinator that commits snapshots with
//! optimistic concurrency.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod invariants;
pub mod logging;
pub mod progression;
pub mod state;
pub mod store;

pub use catalog::{BadgeDef, BossReward, Catalog, MissionDef, MissionReward, RoundReward};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ProgressionConfig;
pub use coordinator::{Applied, CardReview, IntervalPreview, Outcome, ProgressionCoordinator, Rejected};
pub use error::{ProgressionError, Result};
pub use progression::*;
pub use state::LearnerState;
pub use store::{CardProgressStore, InMemoryCardStore, InMemoryStateStore, JsonFileStateStore, StateStore, Versioned};
