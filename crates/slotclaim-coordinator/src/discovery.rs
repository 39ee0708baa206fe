//! Candidate discovery across scout connections.
//!
//! Each scout polls once, scout `i` waiting `i × stagger` first so that
//! several identities never hit the remote rate limit at the same instant.
//! Every poll is bounded by its own request timeout, so the fan-in always
//! completes.

use std::collections::BTreeSet;
use std::time::Duration;

use futures::future::join_all;

use slotclaim_network::Requester;
use slotclaim_protocol::{
    decode_reply, CandidateTarget, Command, ListCandidatesReply, DEFAULT_DISALLOWED_RANKS,
    DEFAULT_LIST_TIMEOUT_MS, DEFAULT_STAGGER_INTERVAL_MS,
};
use slotclaim_state::BlacklistLedger;

/// User-configurable allow-list of ranks.
///
/// Only applies when enabled and non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankFilter {
    pub enabled: bool,
    pub ranks: BTreeSet<i64>,
}

impl RankFilter {
    pub fn allows(&self, rank: i64) -> bool {
        !self.enabled || self.ranks.is_empty() || self.ranks.contains(&rank)
    }
}

/// Why a candidate was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Blacklisted,
    LastClaimed,
    DisallowedRank,
    NotAllowedRank,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFilter {
    /// Ranks that carry no reward.
    pub disallowed: BTreeSet<i64>,
    pub allowed: RankFilter,
}

impl Default for TargetFilter {
    fn default() -> Self {
        Self {
            disallowed: DEFAULT_DISALLOWED_RANKS.into_iter().collect(),
            allowed: RankFilter::default(),
        }
    }
}

impl TargetFilter {
    /// Apply the checks in order: blacklist, last claimed, disallowed
    /// rank, allow-list.
    pub fn check(
        &self,
        candidate: &CandidateTarget,
        last_claimed: Option<&str>,
        ledger: &BlacklistLedger,
    ) -> Result<(), Rejection> {
        if ledger.is_excluded(&candidate.id) {
            return Err(Rejection::Blacklisted);
        }
        if last_claimed == Some(candidate.id.as_str()) {
            return Err(Rejection::LastClaimed);
        }
        if self.disallowed.contains(&candidate.rank) {
            return Err(Rejection::DisallowedRank);
        }
        if !self.allowed.allows(candidate.rank) {
            return Err(Rejection::NotAllowedRank);
        }
        Ok(())
    }

    pub fn admit(
        &self,
        candidates: Vec<CandidateTarget>,
        last_claimed: Option<&str>,
        ledger: &BlacklistLedger,
    ) -> Vec<CandidateTarget> {
        candidates
            .into_iter()
            .filter(|c| match self.check(c, last_claimed, ledger) {
                Ok(()) => true,
                Err(reason) => {
                    tracing::trace!(target_id = %c.id, rank = c.rank, ?reason, "Candidate rejected");
                    false
                }
            })
            .collect()
    }
}

/// Highest rank wins; equal ranks keep their input order.
pub fn select_best(mut candidates: Vec<CandidateTarget>) -> Option<CandidateTarget> {
    candidates.sort_by(|a, b| b.rank.cmp(&a.rank));
    candidates.into_iter().next()
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Added delay per scout index before its poll.
    pub stagger_interval: Duration,
    pub list_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            stagger_interval: Duration::from_millis(DEFAULT_STAGGER_INTERVAL_MS),
            list_timeout: Duration::from_millis(DEFAULT_LIST_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetDiscovery {
    config: DiscoveryConfig,
    filter: TargetFilter,
}

impl TargetDiscovery {
    pub fn new(config: DiscoveryConfig, filter: TargetFilter) -> Self {
        Self { config, filter }
    }

    pub fn filter(&self) -> &TargetFilter {
        &self.filter
    }

    /// Poll every scout and return the single best admissible candidate.
    ///
    /// Results are combined in scout order, never arrival order, so the
    /// outcome does not depend on which reply lands first.
    pub async fn discover(
        &self,
        scouts: &[&dyn Requester],
        last_claimed: Option<&str>,
        ledger: &BlacklistLedger,
    ) -> Option<CandidateTarget> {
        let polls = scouts.iter().enumerate().map(|(index, scout)| {
            let delay = self.config.stagger_interval * index as u32;
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.poll(*scout).await
            }
        });
        let replies = join_all(polls).await;

        let per_scout: Vec<CandidateTarget> = replies
            .into_iter()
            .zip(scouts)
            .filter_map(|(candidates, scout)| {
                let seen = candidates.len();
                let best = select_best(self.filter.admit(candidates, last_claimed, ledger));
                tracing::debug!(
                    scout = %scout.identity(),
                    seen,
                    best = ?best.as_ref().map(|c| (&c.id, c.rank)),
                    "Scout poll settled"
                );
                best
            })
            .collect();

        select_best(per_scout)
    }

    async fn poll(&self, scout: &dyn Requester) -> Vec<CandidateTarget> {
        let Some(reply) = scout
            .request(
                Command::ListCandidates,
                serde_json::json!({}),
                self.config.list_timeout,
            )
            .await
        else {
            tracing::debug!(scout = %scout.identity(), "No candidate list");
            return Vec::new();
        };

        if let Some(message) = reply.error_message() {
            tracing::warn!(scout = %scout.identity(), error = %message, "Candidate list rejected");
            return Vec::new();
        }

        match decode_reply::<ListCandidatesReply>(Command::ListCandidates, &reply) {
            Ok(list) => list.targets,
            Err(e) => {
                tracing::warn!(scout = %scout.identity(), error = %e, "Unreadable candidate list");
                Vec::new()
            }
        }
    }
}
