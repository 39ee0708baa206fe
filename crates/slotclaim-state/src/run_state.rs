use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use slotclaim_protocol::ActionPayload;

use crate::blacklist::BlacklistLedger;
use crate::stats::{ClaimantStats, PersistedStats};

/// Static per-claimant settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimantSettings {
    pub identity: String,
    /// Configuration slot the claimant should act with.
    pub slot_id: u32,
}

#[derive(Debug, Clone)]
pub struct ClaimantRecord {
    pub identity: String,
    pub slot_id: u32,
    /// Refreshed from the remote service every outer cycle.
    pub remaining_quota: Option<i64>,
    /// Fetched once per run, never refreshed while the run lasts.
    pub action_payload: Option<ActionPayload>,
    /// Counters for the current run only.
    pub stats: ClaimantStats,
}

impl ClaimantRecord {
    pub fn new(settings: &ClaimantSettings) -> Self {
        Self {
            identity: settings.identity.clone(),
            slot_id: settings.slot_id,
            remaining_quota: None,
            action_payload: None,
            stats: ClaimantStats::default(),
        }
    }
}

/// Everything one run owns. Dropped and rebuilt on every start.
#[derive(Debug, Clone)]
pub struct RunState {
    claimants: Vec<ClaimantRecord>,
    /// Only moves forward; the run ends once it passes the last claimant.
    cursor: usize,
    last_claimed: Option<String>,
    tier_distribution: BTreeMap<i64, u64>,
    pub blacklist: BlacklistLedger,
    /// Durable counters as loaded when the run started.
    baseline: PersistedStats,
}

impl RunState {
    pub fn new(
        claimants: &[ClaimantSettings],
        blacklist_threshold: u32,
        baseline: PersistedStats,
    ) -> Self {
        Self {
            claimants: claimants.iter().map(ClaimantRecord::new).collect(),
            cursor: 0,
            last_claimed: None,
            tier_distribution: BTreeMap::new(),
            blacklist: BlacklistLedger::new(blacklist_threshold),
            baseline,
        }
    }

    pub fn claimants(&self) -> &[ClaimantRecord] {
        &self.claimants
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.claimants.len()
    }

    pub fn current(&self) -> Option<&ClaimantRecord> {
        self.claimants.get(self.cursor)
    }

    pub fn current_mut(&mut self) -> Option<&mut ClaimantRecord> {
        self.claimants.get_mut(self.cursor)
    }

    /// Move to the next claimant. Returns `false` once every claimant
    /// has been used up.
    pub fn advance(&mut self) -> bool {
        if let Some(done) = self.current() {
            tracing::info!(identity = %done.identity, cursor = self.cursor, "Claimant exhausted");
        }
        self.cursor += 1;
        !self.is_finished()
    }

    pub fn last_claimed(&self) -> Option<&str> {
        self.last_claimed.as_deref()
    }

    pub fn set_last_claimed(&mut self, target_id: &str) {
        self.last_claimed = Some(target_id.to_string());
    }

    pub fn record_tier(&mut self, rank: i64) {
        *self.tier_distribution.entry(rank).or_insert(0) += 1;
    }

    pub fn tier_distribution(&self) -> &BTreeMap<i64, u64> {
        &self.tier_distribution
    }

    /// Durable view: baseline counters plus this run's, and the latest
    /// known quota per claimant.
    pub fn persisted(&self) -> PersistedStats {
        let mut out = self.baseline.clone();
        for record in &self.claimants {
            let merged = out
                .claimants
                .get(&record.identity)
                .copied()
                .unwrap_or_default()
                .merged(&record.stats);
            out.claimants.insert(record.identity.clone(), merged);
            if let Some(quota) = record.remaining_quota {
                out.quotas.insert(record.identity.clone(), quota);
            }
        }
        out
    }
}
