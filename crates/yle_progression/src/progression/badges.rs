//! Badge unlocks.
//!
//! Badges are append-only. Unlocking one grants its catalog XP reward in the
//! same step; a badge can only pay out once.

use super::levels::grant_xp;
use crate::catalog::Catalog;
use crate::error::{ProgressionError, Result};
use crate::state::LearnerState;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeRarity {
    #[default]
    Common,
    Rare,
    Epic,
    Legendary,
}

impl BadgeRarity {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Common => "Common",
            Self::Rare => "Rare",
            Self::Epic => "Epic",
            Self::Legendary => "Legendary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeUnlock {
    pub rarity: BadgeRarity,
    pub xp_awarded: u64,
    pub leveled_up: bool,
}

pub fn unlock_badge(state: &mut LearnerState, catalog: &Catalog, badge_id: &str) -> Result<BadgeUnlock> {
    let badge = catalog
        .badge(badge_id)
        .ok_or_else(|| ProgressionError::BadgeNotFound(badge_id.to_string()))?;
    if state.badges_unlocked.contains(badge_id) {
        return Err(ProgressionError::AlreadyCompleted(badge_id.to_string()));
    }

    state.badges_unlocked.insert(badge_id.to_string());
    let leveled_up = grant_xp(state, badge.xp_reward);

    info!(
        user_id = %state.user_id,
        badge_id,
        rarity = badge.rarity.display_name(),
        "badge unlocked"
    );

    Ok(BadgeUnlock {
        rarity: badge.rarity,
        xp_awarded: badge.xp_reward,
        leveled_up,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BadgeDef;
    use chrono::Utc;

    fn catalog() -> Catalog {
        Catalog::new().with_badge(BadgeDef {
            id: "word_wizard".into(),
            name: "Word Wizard".into(),
            rarity: BadgeRarity::Epic,
            xp_reward: 160,
        })
    }

    #[test]
    fn test_unlock_grants_reward_once() {
        let mut state = LearnerState::new("kid", Utc::now());
        let unlock = unlock_badge(&mut state, &catalog(), "word_wizard").unwrap();
        assert_eq!(unlock.xp_awarded, 160);
        assert!(unlock.leveled_up);
        assert!(state.badges_unlocked.contains("word_wizard"));

        let err = unlock_badge(&mut state, &catalog(), "word_wizard").unwrap_err();
        assert!(matches!(err, ProgressionError::AlreadyCompleted(_)));
        assert_eq!(state.total_xp, 160);
    }

    #[test]
    fn test_unknown_badge() {
        let mut state = LearnerState::new("kid", Utc::now());
        let err = unlock_badge(&mut state, &catalog(), "ghost").unwrap_err();
        assert!(matches!(err, ProgressionError::BadgeNotFound(_)));
        assert!(state.badges_unlocked.is_empty());
    }
}
