//! Per-run bookkeeping for slotclaim.
//!
//! - [`BlacklistLedger`]: per-target failure counts and permanent exclusion
//! - [`RunState`]: claimant rotation, last-claimed target, tier distribution
//! - [`StatsStore`]: best-effort durable statistics across runs

pub mod blacklist;
pub mod run_state;
pub mod stats;

pub use blacklist::{BlacklistLedger, FailureRecord};
pub use run_state::{ClaimantRecord, ClaimantSettings, RunState};
pub use stats::{ClaimantStats, JsonFileStore, MemoryStore, PersistedStats, StatsStore};

/// Errors from the state layer.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
