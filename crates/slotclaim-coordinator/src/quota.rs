use std::time::Duration;

use slotclaim_network::Requester;
use slotclaim_protocol::{decode_reply, Command, QuotaReply};

use crate::CoordinatorError;

/// Ask the remote service how many claims the claimant has left.
pub async fn fetch_quota(
    claimant: &dyn Requester,
    timeout: Duration,
) -> Result<i64, CoordinatorError> {
    let reply = claimant
        .request(Command::FetchQuota, serde_json::json!({}), timeout)
        .await
        .ok_or(CoordinatorError::NoReply(Command::FetchQuota))?;

    if let Some(message) = reply.error_message() {
        return Err(CoordinatorError::Rejected {
            command: Command::FetchQuota,
            message,
        });
    }

    let quota: QuotaReply = decode_reply(Command::FetchQuota, &reply)?;
    Ok(quota.remaining)
}
