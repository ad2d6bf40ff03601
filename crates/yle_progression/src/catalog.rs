//! Read-only content catalog.
//!
//! Mission, badge, round and boss definitions are maintained outside the
//! engine. The engine looks rewards up here and never mutates them.

use crate::error::Result;
use crate::progression::badges::BadgeRarity;
use crate::progression::linear::Phase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Rewards granted when a mission completes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionReward {
    pub xp: u64,
    #[serde(default)]
    pub coins: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionDef {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// "daily", "weekly", ... carried for display only
    #[serde(default)]
    pub category: String,
    /// Progress units needed to complete
    pub total: u32,
    pub reward: MissionReward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rarity: BadgeRarity,
    pub xp_reward: u64,
}

/// XP and gems for one linear-path round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReward {
    pub xp: u64,
    pub gems: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossReward {
    pub phase: Phase,
    pub xp: u64,
    pub gems: u64,
}

/// On-disk shape: flat lists keyed by their own ids
#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    missions: Vec<MissionDef>,
    #[serde(default)]
    badges: Vec<BadgeDef>,
    #[serde(default)]
    rounds: BTreeMap<String, RoundReward>,
    #[serde(default)]
    bosses: BTreeMap<String, BossReward>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    missions: BTreeMap<String, MissionDef>,
    badges: BTreeMap<String, BadgeDef>,
    rounds: BTreeMap<String, RoundReward>,
    bosses: BTreeMap<String, BossReward>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for mission in file.missions {
            catalog = catalog.with_mission(mission);
        }
        for badge in file.badges {
            catalog = catalog.with_badge(badge);
        }
        catalog.rounds = file.rounds;
        catalog.bosses = file.bosses;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn with_mission(mut self, mission: MissionDef) -> Self {
        self.missions.insert(mission.id.clone(), mission);
        self
    }

    pub fn with_badge(mut self, badge: BadgeDef) -> Self {
        self.badges.insert(badge.id.clone(), badge);
        self
    }

    pub fn with_round(mut self, round_id: &str, reward: RoundReward) -> Self {
        self.rounds.insert(round_id.to_string(), reward);
        self
    }

    pub fn with_boss(mut self, boss_id: &str, reward: BossReward) -> Self {
        self.bosses.insert(boss_id.to_string(), reward);
        self
    }

    pub fn mission(&self, id: &str) -> Option<&MissionDef> {
        self.missions.get(id)
    }

    pub fn missions_in(&self, category: &str) -> Vec<&MissionDef> {
        self.missions
            .values()
            .filter(|m| m.category == category)
            .collect()
    }

    pub fn badge(&self, id: &str) -> Option<&BadgeDef> {
        self.badges.get(id)
    }

    pub fn round_reward(&self, round_id: &str) -> Option<RoundReward> {
        self.rounds.get(round_id).copied()
    }

    pub fn boss_reward(&self, boss_id: &str) -> Option<&BossReward> {
        self.bosses.get(boss_id)
    }

    /// Boss id guarding the end of `phase`, if the catalog defines one
    pub fn boss_for_phase(&self, phase: Phase) -> Option<(&str, &BossReward)> {
        self.bosses
            .iter()
            .find(|(_, b)| b.phase == phase)
            .map(|(id, b)| (id.as_str(), b))
    }
}
