//! Virtual pet.
//!
//! One optional companion per learner. Feeding and playing move two clamped
//! 0-100 counters; playing also earns the pet experience, and every
//! `PET_XP_PER_LEVEL` experience raises its level.

use crate::error::{ProgressionError, Result};
use crate::state::LearnerState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

pub const PET_STAT_MAX: u32 = 100;
pub const PET_XP_PER_LEVEL: u64 = 100;

const ADOPT_HAPPINESS: u32 = 75;
const FEED_HEALTH: u32 = 20;
const FEED_HAPPINESS: u32 = 10;
const PLAY_HAPPINESS: u32 = 25;
const PLAY_HEALTH_COST: u32 = 5;
const PLAY_EXPERIENCE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PetKind {
    Dragon,
    Cat,
    Fox,
    Unicorn,
    Phoenix,
}

impl PetKind {
    pub const ALL: [PetKind; 5] = [
        PetKind::Dragon,
        PetKind::Cat,
        PetKind::Fox,
        PetKind::Unicorn,
        PetKind::Phoenix,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dragon => "dragon",
            Self::Cat => "cat",
            Self::Fox => "fox",
            Self::Unicorn => "unicorn",
            Self::Phoenix => "phoenix",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Dragon => "Dragon",
            Self::Cat => "Cat",
            Self::Fox => "Fox",
            Self::Unicorn => "Unicorn",
            Self::Phoenix => "Phoenix",
        }
    }
}

impl fmt::Display for PetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PetKind {
    type Err = ProgressionError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ProgressionError::InvalidPetKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PetMood {
    Happy,
    Okay,
    Sad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualPet {
    #[serde(rename = "type")]
    pub kind: PetKind,
    pub name: String,
    pub level: u32,
    /// 0-100
    pub happiness: u32,
    /// 0-100
    pub health: u32,
    pub experience: u64,
    pub adopted_at: DateTime<Utc>,
    #[serde(default)]
    pub last_fed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_played_at: Option<DateTime<Utc>>,
}

impl VirtualPet {
    pub fn new(kind: PetKind, name: &str, now: DateTime<Utc>) -> Self {
        let name = name.trim();
        Self {
            kind,
            name: if name.is_empty() {
                kind.display_name().to_string()
            } else {
                name.to_string()
            },
            level: 1,
            happiness: ADOPT_HAPPINESS,
            health: PET_STAT_MAX,
            experience: 0,
            adopted_at: now,
            last_fed_at: Some(now),
            last_played_at: Some(now),
        }
    }

    /// Happy above 70 on both counters, sad below 30 on either
    pub fn mood(&self) -> PetMood {
        if self.happiness > 70 && self.health > 70 {
            PetMood::Happy
        } else if self.happiness < 30 || self.health < 30 {
            PetMood::Sad
        } else {
            PetMood::Okay
        }
    }
}

pub fn level_for_experience(experience: u64) -> u32 {
    u32::try_from(experience / PET_XP_PER_LEVEL)
        .unwrap_or(u32::MAX - 1)
        .saturating_add(1)
}

/// Pet after a feed or play, and whether it gained a level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetCare {
    pub pet: VirtualPet,
    pub leveled_up: bool,
}

fn pet_mut(state: &mut LearnerState) -> Result<&mut VirtualPet> {
    let user_id = &state.user_id;
    state
        .pet
        .as_mut()
        .ok_or_else(|| ProgressionError::NotFound(format!("pet for {}", user_id)))
}

pub fn adopt_pet(state: &mut LearnerState, kind: PetKind, name: &str, now: DateTime<Utc>) -> Result<VirtualPet> {
    if state.pet.is_some() {
        return Err(ProgressionError::AlreadyCompleted("pet adoption".to_string()));
    }
    let pet = VirtualPet::new(kind, name, now);
    state.pet = Some(pet.clone());

    info!(user_id = %state.user_id, kind = %kind, name = %pet.name, "pet adopted");
    Ok(pet)
}

pub fn feed_pet(state: &mut LearnerState, now: DateTime<Utc>) -> Result<PetCare> {
    let pet = pet_mut(state)?;
    pet.health = (pet.health + FEED_HEALTH).min(PET_STAT_MAX);
    pet.happiness = (pet.happiness + FEED_HAPPINESS).min(PET_STAT_MAX);
    pet.last_fed_at = Some(now);

    debug!(health = pet.health, happiness = pet.happiness, "pet fed");
    Ok(PetCare {
        pet: pet.clone(),
        leveled_up: false,
    })
}

pub fn play_with_pet(state: &mut LearnerState, now: DateTime<Utc>) -> Result<PetCare> {
    let pet = pet_mut(state)?;
    pet.happiness = (pet.happiness + PLAY_HAPPINESS).min(PET_STAT_MAX);
    pet.health = pet.health.saturating_sub(PLAY_HEALTH_COST);
    pet.experience = pet.experience.saturating_add(PLAY_EXPERIENCE);
    pet.last_played_at = Some(now);

    let level = level_for_experience(pet.experience);
    let leveled_up = level > pet.level;
    if leveled_up {
        pet.level = level;
        info!(name = %pet.name, level, "pet level up");
    }
    Ok(PetCare {
        pet: pet.clone(),
        leveled_up,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 16, 0, 0).unwrap()
    }

    fn with_pet() -> LearnerState {
        let mut state = LearnerState::new("kid", now());
        adopt_pet(&mut state, PetKind::Fox, "Rusty", now()).unwrap();
        state
    }

    #[test]
    fn test_adopt_starting_stats() {
        let state = with_pet();
        let pet = state.pet.unwrap();
        assert_eq!(pet.name, "Rusty");
        assert_eq!(pet.level, 1);
        assert_eq!(pet.happiness, 75);
        assert_eq!(pet.health, 100);
        assert_eq!(pet.experience, 0);
        assert_eq!(pet.last_fed_at, Some(now()));
        assert_eq!(pet.mood(), PetMood::Happy);
    }

    #[test]
    fn test_second_adoption_rejected() {
        let mut state = with_pet();
        let before = state.clone();
        let err = adopt_pet(&mut state, PetKind::Cat, "Tom", now()).unwrap_err();
        assert!(matches!(err, ProgressionError::AlreadyCompleted(_)));
        assert_eq!(state, before);
    }

    #[test]
    fn test_blank_name_uses_kind() {
        let mut state = LearnerState::new("kid", now());
        let pet = adopt_pet(&mut state, PetKind::Phoenix, "  ", now()).unwrap();
        assert_eq!(pet.name, "Phoenix");
    }

    #[test]
    fn test_no_pet_is_not_found() {
        let mut state = LearnerState::new("kid", now());
        assert!(matches!(feed_pet(&mut state, now()), Err(ProgressionError::NotFound(_))));
        assert!(matches!(play_with_pet(&mut state, now()), Err(ProgressionError::NotFound(_))));
        assert!(state.pet.is_none());
    }

    #[test]
    fn test_feed_clamps_at_max() {
        let mut state = with_pet();
        let later = now() + Duration::hours(3);
        let care = feed_pet(&mut state, later).unwrap();
        assert_eq!(care.pet.health, 100);
        assert_eq!(care.pet.happiness, 85);
        assert_eq!(care.pet.last_fed_at, Some(later));
        feed_pet(&mut state, later).unwrap();
        let care = feed_pet(&mut state, later).unwrap();
        assert_eq!(care.pet.happiness, 100);
    }

    #[test]
    fn test_play_costs_health_down_to_zero() {
        let mut state = with_pet();
        for _ in 0..25 {
            play_with_pet(&mut state, now()).unwrap();
        }
        let pet = state.pet.as_ref().unwrap();
        assert_eq!(pet.health, 0);
        assert_eq!(pet.happiness, 100);
        assert_eq!(pet.experience, 250);
        assert_eq!(pet.level, 3);
        assert_eq!(pet.mood(), PetMood::Sad);
    }

    #[test]
    fn test_play_levels_up_every_hundred() {
        let mut state = with_pet();
        let ups: Vec<bool> = (0..10)
            .map(|_| play_with_pet(&mut state, now()).unwrap().leveled_up)
            .collect();
        assert_eq!(ups.iter().filter(|&&up| up).count(), 1);
        assert!(ups[9]);
        assert_eq!(state.pet.unwrap().level, 2);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Dragon".parse::<PetKind>().unwrap(), PetKind::Dragon);
        assert!(matches!(
            "hamster".parse::<PetKind>(),
            Err(ProgressionError::InvalidPetKind(_))
        ));
        assert_eq!(level_for_experience(u64::MAX), u32::MAX);
    }
}
