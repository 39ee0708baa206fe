//! Discovery and claim coordination.
//!
//! - [`TargetDiscovery`] fans a `list_candidates` poll out over every scout
//!   (staggered), fans the replies back in, filters and ranks them and
//!   yields at most one candidate.
//! - [`ClaimExecutor`] drives one claimant through join, configure,
//!   start and settle, classifying the outcome.
//! - [`LoadoutResolver`] obtains the claimant's claim configuration once
//!   per run and caches it on the claimant record.

pub mod claim;
pub mod discovery;
pub mod loadout;
pub mod quota;

pub use claim::{ClaimExecutor, ClaimOutcome, ClaimTimings};
pub use discovery::{
    select_best, DiscoveryConfig, RankFilter, Rejection, TargetDiscovery, TargetFilter,
};
pub use loadout::LoadoutResolver;
pub use quota::fetch_quota;

use slotclaim_protocol::{Command, ProtocolError};

/// Errors raised while talking to the remote service on behalf of a claimant.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("no reply to {0}")]
    NoReply(Command),

    #[error("{command} rejected: {message}")]
    Rejected { command: Command, message: String },

    #[error("configuration slot {0} has no usable payload")]
    NoUsableSlot(u32),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
