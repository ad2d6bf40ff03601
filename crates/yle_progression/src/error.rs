//! Error types for the progression engine.
//!
//! Every invalid input is a representable error value. Only `VersionConflict`
//! is retried by the coordinator; everything else is surfaced unchanged.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProgressionError {
    #[error("Invalid amount: {0} (must be non-negative)")]
    InvalidAmount(i64),

    #[error("Invalid review quality: {0} (expected 0-3 or again/hard/good/easy)")]
    InvalidQuality(String),

    #[error("Not enough gems: need {needed}, have {available}")]
    InsufficientGems { needed: u64, available: u64 },

    #[error("Already completed: {0}")]
    AlreadyCompleted(String),

    #[error("Boss locked: {completed}/{required} rounds completed")]
    BossLocked { completed: usize, required: usize },

    #[error("Phase complete: defeat the boss before starting round {0}")]
    PhaseComplete(String),

    #[error("Mission not found: {0}")]
    MissionNotFound(String),

    #[error("Mission not finished: {completed}/{total}")]
    MissionIncomplete { completed: u32, total: u32 },

    #[error("Badge not found: {0}")]
    BadgeNotFound(String),

    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Invalid difficulty: {0} (expected easy, medium or hard)")]
    InvalidDifficulty(String),

    #[error("Invalid pet kind: {0} (expected dragon, cat, fox, unicorn or phoenix)")]
    InvalidPetKind(String),

    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProgressionError {
    pub fn code(&self) -> i32 {
        match self {
            ProgressionError::InvalidAmount(_) => -32010,
            ProgressionError::InvalidQuality(_) => -32011,
            ProgressionError::InsufficientGems { .. } => -32012,
            ProgressionError::AlreadyCompleted(_) => -32013,
            ProgressionError::BossLocked { .. } => -32014,
            ProgressionError::PhaseComplete(_) => -32015,
            ProgressionError::MissionNotFound(_) => -32016,
            ProgressionError::MissionIncomplete { .. } => -32017,
            ProgressionError::BadgeNotFound(_) => -32018,
            ProgressionError::TopicNotFound(_) => -32019,
            ProgressionError::InvalidDifficulty(_) => -32020,
            ProgressionError::InvalidPetKind(_) => -32021,
            ProgressionError::VersionConflict { .. } => -32030,
            ProgressionError::NotFound(_) => -32031,
            ProgressionError::InvariantViolation(_) => -32603,
            ProgressionError::Storage(_) => -32040,
            ProgressionError::Io(_) => -32041,
            ProgressionError::Json(_) => -32700,
        }
    }

    /// Only optimistic-concurrency conflicts are worth an automatic retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProgressionError::VersionConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProgressionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(ProgressionError::VersionConflict { expected: 1, found: 2 }.is_retryable());
        assert!(!ProgressionError::InvalidAmount(-1).is_retryable());
        assert!(!ProgressionError::NotFound("u1".into()).is_retryable());
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = vec![
            ProgressionError::InvalidAmount(-1),
            ProgressionError::InvalidQuality("7".into()),
            ProgressionError::InsufficientGems { needed: 50, available: 40 },
            ProgressionError::AlreadyCompleted("r1".into()),
            ProgressionError::BossLocked { completed: 3, required: 20 },
            ProgressionError::PhaseComplete("r21".into()),
            ProgressionError::MissionNotFound("m".into()),
            ProgressionError::MissionIncomplete { completed: 1, total: 3 },
            ProgressionError::BadgeNotFound("b".into()),
            ProgressionError::TopicNotFound("t".into()),
            ProgressionError::InvalidDifficulty("x".into()),
            ProgressionError::InvalidPetKind("x".into()),
            ProgressionError::VersionConflict { expected: 1, found: 2 },
            ProgressionError::NotFound("u".into()),
            ProgressionError::InvariantViolation("x".into()),
            ProgressionError::Storage("x".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_display_messages() {
        let err = ProgressionError::InsufficientGems { needed: 50, available: 40 };
        assert_eq!(err.to_string(), "Not enough gems: need 50, have 40");
    }
}
