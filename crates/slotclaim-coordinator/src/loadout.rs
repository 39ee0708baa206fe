//! Claim-configuration acquisition.
//!
//! The claimant's active configuration slot is compared with the slot it
//! is supposed to act with. When they match, the payload is read straight
//! from the fetch reply; otherwise the claimant switches slots and the
//! payload comes from the switch reply. The result is cached on the
//! claimant record for the rest of the run.

use std::time::Duration;

use slotclaim_network::Requester;
use slotclaim_protocol::{
    decode_reply, find_slot, ActionPayload, ActiveConfigurationReply, Command,
    ProtocolError, SwitchConfigurationParams, SwitchConfigurationReply,
    DEFAULT_REQUEST_TIMEOUT_MS,
};
use slotclaim_state::ClaimantRecord;

use crate::CoordinatorError;

#[derive(Debug, Clone)]
pub struct LoadoutResolver {
    request_timeout: Duration,
}

impl Default for LoadoutResolver {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS))
    }
}

impl LoadoutResolver {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    /// Return the cached payload, fetching it on first use.
    ///
    /// `None` means no usable payload could be obtained; the caller
    /// aborts the round.
    pub async fn acquire(
        &self,
        claimant: &dyn Requester,
        record: &mut ClaimantRecord,
    ) -> Option<ActionPayload> {
        if let Some(cached) = &record.action_payload {
            return Some(cached.clone());
        }

        match self.fetch(claimant, record.slot_id).await {
            Ok(payload) => {
                tracing::info!(
                    identity = %record.identity,
                    slot_id = payload.slot_id,
                    units = payload.units.len(),
                    "Claim configuration cached"
                );
                record.action_payload = Some(payload.clone());
                Some(payload)
            }
            Err(e) => {
                tracing::warn!(identity = %record.identity, error = %e, "Claim configuration unavailable");
                None
            }
        }
    }

    async fn fetch(
        &self,
        claimant: &dyn Requester,
        slot_id: u32,
    ) -> Result<ActionPayload, CoordinatorError> {
        let active: ActiveConfigurationReply = self
            .call(claimant, Command::FetchActiveConfiguration, serde_json::json!({}))
            .await?;

        if active.active_slot_id == Some(slot_id) {
            return find_slot(&active.slots, slot_id)
                .and_then(|slot| ActionPayload::from_slot(slot_id, slot))
                .ok_or(CoordinatorError::NoUsableSlot(slot_id));
        }

        tracing::debug!(
            identity = %claimant.identity(),
            active = ?active.active_slot_id,
            desired = slot_id,
            "Switching configuration slot"
        );
        let params = serde_json::to_value(SwitchConfigurationParams { slot_id })
            .map_err(ProtocolError::from)?;
        let switched: SwitchConfigurationReply = self
            .call(claimant, Command::SwitchConfiguration, params)
            .await?;

        find_slot(&switched.slots, slot_id)
            .and_then(|slot| ActionPayload::from_slot(slot_id, slot))
            .ok_or(CoordinatorError::NoUsableSlot(slot_id))
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        claimant: &dyn Requester,
        command: Command,
        body: serde_json::Value,
    ) -> Result<T, CoordinatorError> {
        let reply = claimant
            .request(command, body, self.request_timeout)
            .await
            .ok_or(CoordinatorError::NoReply(command))?;
        if let Some(message) = reply.error_message() {
            return Err(CoordinatorError::Rejected { command, message });
        }
        Ok(decode_reply(command, &reply)?)
    }
}
