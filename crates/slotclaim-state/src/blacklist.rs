use std::collections::{BTreeSet, HashMap};

use slotclaim_protocol::DEFAULT_BLACKLIST_THRESHOLD;

/// Result of recording one failed claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecord {
    pub failures: u32,
    /// True only on the failure that crossed the threshold.
    pub newly_excluded: bool,
}

/// Per-target failure counts with permanent exclusion.
///
/// Grows monotonically within a run: counts never decrease and an
/// excluded target stays excluded until the ledger is dropped.
#[derive(Debug, Clone)]
pub struct BlacklistLedger {
    threshold: u32,
    failures: HashMap<String, u32>,
    excluded: BTreeSet<String>,
}

impl BlacklistLedger {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            failures: HashMap::new(),
            excluded: BTreeSet::new(),
        }
    }

    pub fn record_failure(&mut self, target_id: &str) -> FailureRecord {
        let count = self.failures.entry(target_id.to_string()).or_insert(0);
        *count += 1;
        let failures = *count;
        let newly_excluded =
            failures >= self.threshold && self.excluded.insert(target_id.to_string());
        FailureRecord {
            failures,
            newly_excluded,
        }
    }

    pub fn is_excluded(&self, target_id: &str) -> bool {
        self.excluded.contains(target_id)
    }

    pub fn failures(&self, target_id: &str) -> u32 {
        self.failures.get(target_id).copied().unwrap_or(0)
    }

    pub fn excluded(&self) -> impl Iterator<Item = &str> {
        self.excluded.iter().map(String::as_str)
    }
}

impl Default for BlacklistLedger {
    fn default() -> Self {
        Self::new(DEFAULT_BLACKLIST_THRESHOLD)
    }
}
