//! Claimant statistics and their durable store.
//!
//! Persistence is best-effort: a crash between a counter update and the
//! next save loses at most that update.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::StateError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimantStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

impl ClaimantStats {
    pub fn merged(&self, other: &ClaimantStats) -> ClaimantStats {
        ClaimantStats {
            attempts: self.attempts + other.attempts,
            successes: self.successes + other.successes,
            failures: self.failures + other.failures,
        }
    }
}

/// Durable record keyed by claimant identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedStats {
    #[serde(default)]
    pub claimants: BTreeMap<String, ClaimantStats>,
    #[serde(default)]
    pub quotas: BTreeMap<String, i64>,
}

pub trait StatsStore: Send + Sync {
    fn load(&self) -> Result<PersistedStats, StateError>;
    fn save(&self, stats: &PersistedStats) -> Result<(), StateError>;
}

/// JSON document on disk, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StatsStore for JsonFileStore {
    fn load(&self) -> Result<PersistedStats, StateError> {
        if !self.path.exists() {
            return Ok(PersistedStats::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(PersistedStats::default());
        }
        Ok(serde_json::from_str(&data)?)
    }

    fn save(&self, stats: &PersistedStats) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(stats)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<PersistedStats>,
}

impl MemoryStore {
    pub fn new(initial: PersistedStats) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }

    pub fn snapshot(&self) -> PersistedStats {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl StatsStore for MemoryStore {
    fn load(&self) -> Result<PersistedStats, StateError> {
        Ok(self.snapshot())
    }

    fn save(&self, stats: &PersistedStats) -> Result<(), StateError> {
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = stats.clone();
        Ok(())
    }
}
