//! Spaced repetition scheduler (SM-2 variant).
//!
//! Qualities run on a 0-3 scale instead of SM-2's 0-5:
//! - Again (0): interval resets to 1 day
//! - Hard (1): max(3, interval * 1.2)
//! - Good (2): 0 -> 1, 1 -> 6, otherwise interval * ease
//! - Easy (3): 0 -> 4, otherwise interval * ease * 1.3
//!
//! The ease update `ease + (0.1 - (2 - q) * (0.08 + (2 - q) * 0.02))` runs for
//! every quality and is clamped to [1.3, 2.5]. Fractional intervals are
//! floored, never rounded.

use crate::error::{ProgressionError, Result};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::warn;

pub const MIN_EASE: f64 = 1.3;
pub const MAX_EASE: f64 = 2.5;
pub const DEFAULT_EASE: f64 = 2.5;

/// Cards at or above this interval count as mature
pub const MATURE_INTERVAL_DAYS: u32 = 21;

/// Learner's self-graded recall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewQuality {
    /// Did not remember
    Again,
    /// Remembered with difficulty
    Hard,
    /// Remembered
    Good,
    /// Remembered effortlessly
    Easy,
}

impl ReviewQuality {
    pub const ALL: [ReviewQuality; 4] = [Self::Again, Self::Hard, Self::Good, Self::Easy];

    pub fn value(self) -> i64 {
        match self {
            Self::Again => 0,
            Self::Hard => 1,
            Self::Good => 2,
            Self::Easy => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Again => "Again",
            Self::Hard => "Hard",
            Self::Good => "Good",
            Self::Easy => "Easy",
        }
    }
}

impl TryFrom<i64> for ReviewQuality {
    type Error = ProgressionError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::Again),
            1 => Ok(Self::Hard),
            2 => Ok(Self::Good),
            3 => Ok(Self::Easy),
            other => Err(ProgressionError::InvalidQuality(other.to_string())),
        }
    }
}

impl FromStr for ReviewQuality {
    type Err = ProgressionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "again" => Ok(Self::Again),
            "hard" => Ok(Self::Hard),
            "good" => Ok(Self::Good),
            "easy" => Ok(Self::Easy),
            other => other
                .parse::<i64>()
                .map_err(|_| ProgressionError::InvalidQuality(s.to_string()))
                .and_then(Self::try_from),
        }
    }
}

/// Result of scheduling one review
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSchedule {
    pub ease_factor: f64,
    pub interval: u32,
    pub next_review_date: DateTime<Utc>,
}

/// Schedule the next review from a raw quality value.
///
/// Pure: identical inputs and `now` always give identical output.
pub fn next_review(ease: f64, interval: u32, quality: i64, now: DateTime<Utc>) -> Result<ReviewSchedule> {
    let quality = ReviewQuality::try_from(quality)?;
    Ok(schedule(ease, interval, quality, now))
}

/// Schedule the next review for an already-validated quality
pub fn schedule(ease: f64, interval: u32, quality: ReviewQuality, now: DateTime<Utc>) -> ReviewSchedule {
    let ease_factor = next_ease(ease, quality);
    let interval = next_interval(interval, ease_factor, quality);
    ReviewSchedule {
        ease_factor,
        interval,
        next_review_date: add_days(now, interval),
    }
}

fn next_ease(ease: f64, quality: ReviewQuality) -> f64 {
    let ease = if ease.is_finite() {
        ease
    } else {
        warn!(ease, "INVARIANT_VIOLATION non-finite ease factor, using default");
        DEFAULT_EASE
    };
    let distance = 2.0 - quality.value() as f64;
    let updated = ease + (0.1 - distance * (0.08 + distance * 0.02));
    updated.clamp(MIN_EASE, MAX_EASE)
}

fn next_interval(interval: u32, ease: f64, quality: ReviewQuality) -> u32 {
    match quality {
        ReviewQuality::Again => 1,
        // interval * 1.2 in integer arithmetic, so exact multiples don't lose a day
        ReviewQuality::Hard => {
            let scaled = (interval as u64 * 6 / 5).min(u32::MAX as u64) as u32;
            scaled.max(3)
        }
        ReviewQuality::Good => match interval {
            0 => 1,
            1 => 6,
            n => (n as f64 * ease).floor() as u32,
        },
        ReviewQuality::Easy => match interval {
            0 => 4,
            n => (n as f64 * ease * 1.3).floor() as u32,
        },
    }
}

fn add_days(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now.checked_add_signed(Duration::days(days as i64))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ============================================================================
// Per-card progress
// ============================================================================

/// Review state for one user x card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardProgress {
    pub ease_factor: f64,
    /// Days until next review
    pub interval: u32,
    pub next_review_date: DateTime<Utc>,
    /// Incremented on every graded review
    pub review_count: u32,
    #[serde(default)]
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl FlashcardProgress {
    /// Unreviewed card, due immediately
    pub fn new(now: DateTime<Utc>, ease: f64) -> Self {
        Self {
            ease_factor: ease.clamp(MIN_EASE, MAX_EASE),
            interval: 0,
            next_review_date: now,
            review_count: 0,
            last_reviewed_at: None,
        }
    }

    /// Apply a graded review
    pub fn record_review(&mut self, quality: ReviewQuality, now: DateTime<Utc>) -> ReviewSchedule {
        let next = schedule(self.ease_factor, self.interval, quality, now);
        self.ease_factor = next.ease_factor;
        self.interval = next.interval;
        self.next_review_date = next.next_review_date;
        self.review_count = self.review_count.saturating_add(1);
        self.last_reviewed_at = Some(now);
        next
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_date <= now
    }

    pub fn is_new(&self) -> bool {
        self.review_count == 0
    }

    pub fn is_mature(&self) -> bool {
        self.interval >= MATURE_INTERVAL_DAYS
    }
}

// ============================================================================
// Previews
// ============================================================================

/// Interval each quality would produce, in quality order
pub fn preview_intervals(ease: f64, interval: u32, now: DateTime<Utc>) -> Vec<(ReviewQuality, u32)> {
    ReviewQuality::ALL
        .iter()
        .map(|&q| (q, schedule(ease, interval, q, now).interval))
        .collect()
}

/// Short human label for an interval: "3d", "2w", "1mo", "1y"
pub fn format_interval(days: u32) -> String {
    if days < 7 {
        format!("{}d", days)
    } else if days < 30 {
        format!("{}w", days / 7)
    } else if days < 365 {
        format!("{}mo", days / 30)
    } else {
        format!("{}y", days / 365)
    }
}

// ============================================================================
// Batch helpers (read-only)
// ============================================================================

/// Card ids grouped by review state. A card can sit in more than one bucket
/// (a new card is also due).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardBuckets {
    pub due: Vec<String>,
    pub new: Vec<String>,
    pub learning: Vec<String>,
    pub mature: Vec<String>,
}

pub fn partition(cards: &BTreeMap<String, FlashcardProgress>, now: DateTime<Utc>) -> CardBuckets {
    let mut buckets = CardBuckets::default();
    for (id, card) in cards {
        if card.is_due(now) {
            buckets.due.push(id.clone());
        }
        if card.is_new() {
            buckets.new.push(id.clone());
        }
        if !card.is_new() && !card.is_mature() {
            buckets.learning.push(id.clone());
        }
        if card.is_mature() {
            buckets.mature.push(id.clone());
        }
    }
    buckets
}

/// Aggregate review statistics for one learner's deck
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatistics {
    /// Due now or later today
    pub due_today: usize,
    pub new_cards: usize,
    pub learning: usize,
    pub mature: usize,
    pub total_cards: usize,
    pub total_reviews: u64,
    pub average_ease_factor: f64,
}

pub fn review_statistics(cards: &BTreeMap<String, FlashcardProgress>, now: DateTime<Utc>) -> ReviewStatistics {
    let end_of_day = now
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
        .checked_add_signed(Duration::days(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let average_ease_factor = if cards.is_empty() {
        DEFAULT_EASE
    } else {
        cards.values().map(|c| c.ease_factor).sum::<f64>() / cards.len() as f64
    };

    ReviewStatistics {
        due_today: cards.values().filter(|c| c.next_review_date < end_of_day).count(),
        new_cards: cards.values().filter(|c| c.is_new()).count(),
        learning: cards.values().filter(|c| !c.is_new() && !c.is_mature()).count(),
        mature: cards.values().filter(|c| c.is_mature()).count(),
        total_cards: cards.len(),
        total_reviews: cards.values().map(|c| c.review_count as u64).sum(),
        average_ease_factor,
    }
}
