//! Daily activity streaks.
//!
//! Works on calendar days supplied by the caller's clock. Dates that go
//! backwards are ignored so a skewed client cannot reset a streak.

use crate::state::LearnerState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakChange {
    /// First activity ever, or first after a gap
    Started,
    Extended,
    /// Already active today
    Unchanged,
    /// `today` precedes the last active day
    Ignored,
}

/// Record activity on `today` and return how the streak moved
pub fn record_activity(state: &mut LearnerState, today: NaiveDate) -> StreakChange {
    let change = match state.last_active_on {
        Some(last) if today < last => StreakChange::Ignored,
        Some(last) if today == last => StreakChange::Unchanged,
        Some(last) if last.succ_opt() == Some(today) => StreakChange::Extended,
        _ => StreakChange::Started,
    };

    match change {
        StreakChange::Extended => {
            state.streak_days = state.streak_days.saturating_add(1);
            state.last_active_on = Some(today);
        }
        StreakChange::Started => {
            state.streak_days = 1;
            state.last_active_on = Some(today);
        }
        StreakChange::Unchanged | StreakChange::Ignored => {}
    }

    debug!(user_id = %state.user_id, streak = state.streak_days, ?change, "streak updated");
    change
}
