use serde::{Deserialize, Serialize};

/// A contested target reported by `list_candidates`.
///
/// Ephemeral: only lives for the duration of one discovery poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTarget {
    /// Remote-assigned identifier.
    pub id: String,
    /// Identifier of the party that owns the target.
    pub owner_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Depth/tier value used for prioritization.
    pub rank: i64,
}

/// One configuration slot as reported by the remote service.
///
/// Slots are listed by position; `slot_id` is present on most replies
/// but positional lookup is used when it is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<u32>,
    #[serde(default)]
    pub units: Vec<serde_json::Value>,
}

/// Find a slot by id, falling back to its 1-based position.
pub fn find_slot(slots: &[ConfigurationSlot], slot_id: u32) -> Option<&ConfigurationSlot> {
    slots
        .iter()
        .find(|s| s.slot_id == Some(slot_id))
        .or_else(|| {
            let position = (slot_id as usize).checked_sub(1)?;
            slots.get(position).filter(|s| s.slot_id.is_none())
        })
}

/// Normalized claim configuration sent with `commit_configuration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPayload {
    pub slot_id: u32,
    pub units: Vec<serde_json::Value>,
}

impl ActionPayload {
    /// Build a payload from a slot; empty slots carry nothing usable.
    pub fn from_slot(slot_id: u32, slot: &ConfigurationSlot) -> Option<Self> {
        if slot.units.is_empty() {
            return None;
        }
        Some(Self {
            slot_id,
            units: slot.units.clone(),
        })
    }
}
