//! # Storage Module - Key-Value Persistence
//!
//! The engine persists a handful of JSON documents under fixed keys. This
//! module provides the key space, the backends that hold the bytes and the
//! [`Storage`] wrapper the engine talks to.
//!
//! ## Features
//!
//! - **Total reads**: a missing key or malformed JSON yields the caller's fallback
//! - **Best-effort writes**: a failed write is logged, never propagated
//! - **Pluggable backends**: [`MemoryStore`], [`SledStore`], [`FileStore`]
//! - **Snapshots**: export every key to one JSON document and import it back
//!
//! ## Layout
//!
//! ```text
//! player_state_v1      ← PlayerState blob (camelCase JSON)
//! quests_v1            ← quest list
//! habits_v1            ← habit list
//! reward_log_v1        ← reward redemptions, newest first
//! last_rollover_v1     ← plain date string
//! last_action_v1       ← single-slot action record
//! focus_quest_v1       ← plain quest id
//! grading_history_v1   ← date → daily grade
//! achievements_v1      ← achievement id → unlock timestamp
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hunterlog::storage::{keys, Storage};
//!
//! let storage = Storage::in_memory();
//! storage.write_string(keys::LAST_ROLLOVER, "2024-01-03");
//! assert_eq!(storage.read_string(keys::LAST_ROLLOVER, ""), "2024-01-03");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::engine::errors::EngineError;

pub mod file_store;
pub mod sled_store;
pub mod snapshot;

pub use file_store::FileStore;
pub use sled_store::SledStore;
pub use snapshot::{export_snapshot, import_snapshot, SNAPSHOT_VERSION};

/// Persisted key space.
pub mod keys {
    pub const PLAYER_STATE: &str = "player_state_v1";
    pub const QUESTS: &str = "quests_v1";
    pub const HABITS: &str = "habits_v1";
    pub const REWARD_LOG: &str = "reward_log_v1";
    pub const LAST_ROLLOVER: &str = "last_rollover_v1";
    pub const LAST_ACTION: &str = "last_action_v1";
    pub const FOCUS_QUEST: &str = "focus_quest_v1";
    pub const GRADING_HISTORY: &str = "grading_history_v1";
    pub const ACHIEVEMENTS: &str = "achievements_v1";

    /// Keys holding plain strings rather than JSON.
    pub const STRING_KEYS: [&str; 2] = [LAST_ROLLOVER, FOCUS_QUEST];
}

/// Raw byte-level access to a store. Implementations report failures; the
/// [`Storage`] wrapper decides what a failure means to the engine.
pub trait KeyValueBackend: Send + Sync {
    fn raw_get(&self, key: &str) -> Result<Option<String>, EngineError>;
    fn raw_put(&self, key: &str, value: &str) -> Result<(), EngineError>;
    fn raw_remove(&self, key: &str) -> Result<(), EngineError>;

    /// Short label for log lines.
    fn name(&self) -> &'static str;
}

/// In-process store, used by tests and the `memory` backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueBackend for MemoryStore {
    fn raw_get(&self, key: &str) -> Result<Option<String>, EngineError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| EngineError::Internal("memory store poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn raw_put(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| EngineError::Internal("memory store poisoned".into()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn raw_remove(&self, key: &str) -> Result<(), EngineError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| EngineError::Internal("memory store poisoned".into()))?;
        entries.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// JSON view over a backend. Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn KeyValueBackend>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Storage {
    pub fn new<B: KeyValueBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn get(&self, key: &str) -> Option<String> {
        match self.backend.raw_get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("{} read of {} failed: {}", self.backend.name(), key, e);
                None
            }
        }
    }

    fn put(&self, key: &str, value: &str) {
        if let Err(e) = self.backend.raw_put(key, value) {
            warn!("{} write of {} failed: {}", self.backend.name(), key, e);
        }
    }

    /// Parsed JSON at `key`, `None` when missing or malformed.
    pub fn read_value(&self, key: &str) -> Option<Value> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("malformed JSON under {}: {}", key, e);
                None
            }
        }
    }

    pub fn read_json<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        let Some(value) = self.read_value(key) else {
            return fallback;
        };
        match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("unexpected shape under {}: {}", key, e);
                fallback
            }
        }
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => self.put(key, &json),
            Err(e) => warn!("could not serialize {}: {}", key, e),
        }
    }

    /// Raw string at `key` (no JSON decoding).
    pub fn read_string(&self, key: &str, fallback: &str) -> String {
        self.get(key).unwrap_or_else(|| fallback.to_string())
    }

    pub fn write_string(&self, key: &str, value: &str) {
        self.put(key, value);
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.backend.raw_remove(key) {
            warn!("{} remove of {} failed: {}", self.backend.name(), key, e);
        }
    }

    /// A JSON array's elements as stored; anything else is an empty list.
    pub fn read_raw_list(&self, key: &str) -> Vec<Value> {
        match self.read_value(key) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                warn!("expected a list under {}", key);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Typed list; elements that do not parse are dropped individually.
    pub fn read_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.read_raw_list(key)
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()
    }
}
