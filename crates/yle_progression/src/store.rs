//! Persistence seams and the stores shipped with the engine.
//!
//! `StateStore` is optimistic: every snapshot carries a version token and
//! `save` only succeeds when the caller's expected version still matches.
//! Version 0 means "no document yet"; saving against 0 creates it.

use crate::error::{ProgressionError, Result};
use crate::progression::spaced::FlashcardProgress;
use crate::state::LearnerState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// A value paired with its optimistic-concurrency token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

pub trait StateStore: Send + Sync {
    /// Current snapshot, or `NotFound` for an unknown user
    fn load(&self, user_id: &str) -> Result<Versioned<LearnerState>>;

    /// Compare-and-set write. Returns the new version, or `VersionConflict`
    /// if someone else committed since `expected_version` was read.
    fn save(&self, user_id: &str, state: &LearnerState, expected_version: u64) -> Result<u64>;
}

pub trait CardProgressStore: Send + Sync {
    /// Stored progress, or None for a card never reviewed
    fn load(&self, user_id: &str, card_id: &str) -> Result<Option<FlashcardProgress>>;

    fn save(&self, user_id: &str, card_id: &str, progress: &FlashcardProgress) -> Result<()>;

    /// Every card record for the user, keyed by card id
    fn list(&self, user_id: &str) -> Result<BTreeMap<String, FlashcardProgress>>;
}

impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    fn load(&self, user_id: &str) -> Result<Versioned<LearnerState>> {
        (**self).load(user_id)
    }

    fn save(&self, user_id: &str, state: &LearnerState, expected_version: u64) -> Result<u64> {
        (**self).save(user_id, state, expected_version)
    }
}

impl<T: CardProgressStore + ?Sized> CardProgressStore for Arc<T> {
    fn load(&self, user_id: &str, card_id: &str) -> Result<Option<FlashcardProgress>> {
        (**self).load(user_id, card_id)
    }

    fn save(&self, user_id: &str, card_id: &str, progress: &FlashcardProgress) -> Result<()> {
        (**self).save(user_id, card_id, progress)
    }

    fn list(&self, user_id: &str) -> Result<BTreeMap<String, FlashcardProgress>> {
        (**self).list(user_id)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| ProgressionError::Storage("store lock poisoned".to_string()))
}

fn check_version(current: u64, expected: u64) -> Result<()> {
    if current != expected {
        return Err(ProgressionError::VersionConflict {
            expected,
            found: current,
        });
    }
    Ok(())
}

// ============================================================================
// In-Memory Stores
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    docs: Mutex<HashMap<String, Versioned<LearnerState>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self, user_id: &str) -> Result<Versioned<LearnerState>> {
        lock(&self.docs)?
            .get(user_id)
            .cloned()
            .ok_or_else(|| ProgressionError::NotFound(format!("learner {}", user_id)))
    }

    fn save(&self, user_id: &str, state: &LearnerState, expected_version: u64) -> Result<u64> {
        let mut docs = lock(&self.docs)?;
        let current = docs.get(user_id).map(|d| d.version).unwrap_or(0);
        check_version(current, expected_version)?;

        let version = current + 1;
        docs.insert(
            user_id.to_string(),
            Versioned {
                version,
                value: state.clone(),
            },
        );
        Ok(version)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCardStore {
    cards: Mutex<HashMap<String, BTreeMap<String, FlashcardProgress>>>,
}

impl InMemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CardProgressStore for InMemoryCardStore {
    fn load(&self, user_id: &str, card_id: &str) -> Result<Option<FlashcardProgress>> {
        Ok(lock(&self.cards)?
            .get(user_id)
            .and_then(|deck| deck.get(card_id))
            .cloned())
    }

    fn save(&self, user_id: &str, card_id: &str, progress: &FlashcardProgress) -> Result<()> {
        lock(&self.cards)?
            .entry(user_id.to_string())
            .or_default()
            .insert(card_id.to_string(), progress.clone());
        Ok(())
    }

    fn list(&self, user_id: &str) -> Result<BTreeMap<String, FlashcardProgress>> {
        Ok(lock(&self.cards)?.get(user_id).cloned().unwrap_or_default())
    }
}

// ============================================================================
// JSON File Store
// ============================================================================

/// On-disk document: the snapshot plus its version token
#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    version: u64,
    state: LearnerState,
}

/// One pretty-printed JSON document per learner under `data_dir`
#[derive(Debug)]
pub struct JsonFileStateStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStateStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// File for a user. Ids are opaque, so anything outside [A-Za-z0-9_-]
    /// is escaped as %XX.
    pub fn path_for(&self, user_id: &str) -> PathBuf {
        let mut name = String::with_capacity(user_id.len() + 5);
        for byte in user_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("%{:02X}", byte));
            }
        }
        name.push_str(".json");
        self.data_dir.join(name)
    }

    fn read(&self, user_id: &str) -> Result<Option<StoredDocument>> {
        let path = self.path_for(user_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write(&self, user_id: &str, doc: &StoredDocument) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let path = self.path_for(user_id);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(doc)?;
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl StateStore for JsonFileStateStore {
    fn load(&self, user_id: &str) -> Result<Versioned<LearnerState>> {
        let doc = self
            .read(user_id)?
            .ok_or_else(|| ProgressionError::NotFound(format!("learner {}", user_id)))?;
        Ok(Versioned {
            version: doc.version,
            value: doc.state,
        })
    }

    fn save(&self, user_id: &str, state: &LearnerState, expected_version: u64) -> Result<u64> {
        let _guard = lock(&self.write_lock)?;
        let current = self.read(user_id)?.map(|d| d.version).unwrap_or(0);
        check_version(current, expected_version)?;

        let version = current + 1;
        self.write(
            user_id,
            &StoredDocument {
                version,
                state: state.clone(),
            },
        )?;
        Ok(version)
    }
}
