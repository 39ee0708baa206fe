//! Claim execution: join → configure → start → settle → record.
//!
//! The executor never raises. Every path ends in a [`ClaimOutcome`] that
//! tells the scan loop whether to keep going.

use std::time::Duration;

use slotclaim_network::Requester;
use slotclaim_protocol::{
    CandidateTarget, Command, JoinTargetParams, ALREADY_JOINED_MARKERS, DEFAULT_ACTION_SETTLE_MS,
    DEFAULT_ACTION_TIMEOUT_MS, DEFAULT_JOIN_SETTLE_MS, DEFAULT_REQUEST_TIMEOUT_MS,
};
use slotclaim_state::RunState;

/// What the scan loop should do after one claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Target acquired and consumed.
    Success,
    /// This target failed; try another one this round.
    SoftFailContinue,
    /// Claimant connection lost or setup missing; stop scanning now.
    HardFailAbortRound,
    /// Other failure; stop scanning this round, keep the claimant.
    SoftFailStop,
}

impl std::fmt::Display for ClaimOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::SoftFailContinue => "soft-fail-continue",
            Self::HardFailAbortRound => "hard-fail-abort-round",
            Self::SoftFailStop => "soft-fail-stop",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct ClaimTimings {
    pub join_timeout: Duration,
    /// Pause after a successful join.
    pub join_settle: Duration,
    pub action_timeout: Duration,
    /// Server-side processing time after `start_action`.
    pub action_settle: Duration,
}

impl Default for ClaimTimings {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            join_settle: Duration::from_millis(DEFAULT_JOIN_SETTLE_MS),
            action_timeout: Duration::from_millis(DEFAULT_ACTION_TIMEOUT_MS),
            action_settle: Duration::from_millis(DEFAULT_ACTION_SETTLE_MS),
        }
    }
}

/// Whether a join error means the claimant already holds the target.
pub fn is_already_joined(message: &str) -> bool {
    let message = message.to_lowercase();
    ALREADY_JOINED_MARKERS.iter().any(|m| message.contains(m))
}

#[derive(Debug, Clone, Default)]
pub struct ClaimExecutor {
    timings: ClaimTimings,
}

impl ClaimExecutor {
    pub fn new(timings: ClaimTimings) -> Self {
        Self { timings }
    }

    /// Attempt to acquire and consume `target` with the run's current
    /// claimant. Counters and the blacklist are updated in `run`;
    /// persisting them is left to the caller.
    pub async fn execute(
        &self,
        claimant: &dyn Requester,
        target: &CandidateTarget,
        run: &mut RunState,
    ) -> ClaimOutcome {
        if !claimant.is_live() {
            tracing::warn!(identity = %claimant.identity(), "Claimant not connected, aborting round");
            return ClaimOutcome::HardFailAbortRound;
        }
        let Some(record) = run.current_mut() else {
            return ClaimOutcome::HardFailAbortRound;
        };
        record.stats.attempts += 1;

        tracing::info!(
            identity = %claimant.identity(),
            target_id = %target.id,
            target_name = %target.name,
            rank = target.rank,
            "Claiming target"
        );

        // Step 1: join.
        let params = JoinTargetParams {
            owner_id: target.owner_id.clone(),
            target_id: target.id.clone(),
        };
        let body = match serde_json::to_value(&params) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode join request");
                return ClaimOutcome::SoftFailStop;
            }
        };
        let Some(reply) = claimant
            .request(Command::JoinTarget, body, self.timings.join_timeout)
            .await
        else {
            tracing::warn!(identity = %claimant.identity(), target_id = %target.id, "No reply to join");
            return ClaimOutcome::SoftFailStop;
        };

        match reply.error_message() {
            Some(message) if is_already_joined(&message) => {
                tracing::info!(target_id = %target.id, "Already joined, continuing");
            }
            Some(message) => {
                let failure = run.blacklist.record_failure(&target.id);
                if let Some(record) = run.current_mut() {
                    record.stats.failures += 1;
                }
                if failure.newly_excluded {
                    tracing::warn!(
                        target_id = %target.id,
                        failures = failure.failures,
                        "Target permanently excluded"
                    );
                }
                tracing::warn!(target_id = %target.id, error = %message, "Join rejected");
                return ClaimOutcome::SoftFailContinue;
            }
            None => {}
        }
        run.set_last_claimed(&target.id);
        tokio::time::sleep(self.timings.join_settle).await;

        // Step 2: configure from the cached payload.
        let Some(payload) = run.current().and_then(|r| r.action_payload.clone()) else {
            tracing::error!(
                identity = %claimant.identity(),
                "No cached claim configuration, aborting round"
            );
            return ClaimOutcome::HardFailAbortRound;
        };
        let body = serde_json::json!({ "payload": payload });
        match claimant
            .request(Command::CommitConfiguration, body, self.timings.action_timeout)
            .await
        {
            Some(reply) => {
                if let Some(message) = reply.error_message() {
                    tracing::warn!(target_id = %target.id, error = %message, "Configuration rejected");
                    return ClaimOutcome::SoftFailStop;
                }
            }
            None => {
                tracing::debug!(target_id = %target.id, "No configuration ack, continuing");
            }
        }

        // Step 3: start. The service runs the action whether or not we
        // see the acknowledgment.
        match claimant
            .request(
                Command::StartAction,
                serde_json::json!({}),
                self.timings.action_timeout,
            )
            .await
        {
            Some(reply) if reply.is_error() => {
                tracing::warn!(
                    target_id = %target.id,
                    error = ?reply.error_message(),
                    "Action start reported an error"
                );
            }
            Some(_) => {}
            None => {
                tracing::warn!(target_id = %target.id, "No action start ack");
            }
        }

        // Step 4: settle. The service closes the connection when done.
        tokio::time::sleep(self.timings.action_settle).await;
        if !claimant.is_live() {
            tracing::debug!(identity = %claimant.identity(), "Connection closed after action, as expected");
        }

        // Step 5: record.
        if let Some(record) = run.current_mut() {
            record.stats.successes += 1;
        }
        run.record_tier(target.rank);
        tracing::info!(
            identity = %claimant.identity(),
            target_id = %target.id,
            rank = target.rank,
            "Claim completed"
        );
        ClaimOutcome::Success
    }
}
