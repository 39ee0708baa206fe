use serde::{Deserialize, Serialize};

use crate::commands::Command;
use crate::error::ProtocolError;
use crate::types::{CandidateTarget, ConfigurationSlot};

/// Command name of the first frame written on a fresh channel.
pub const AUTH_COMMAND: &str = "auth";

/// A frame written to the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub command: String,
    /// Correlation id; absent on fire-and-forget frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub body: serde_json::Value,
}

impl OutboundFrame {
    pub fn request(command: Command, seq: u64, body: serde_json::Value) -> Self {
        Self {
            command: command.as_str().to_string(),
            seq: Some(seq),
            body,
        }
    }

    pub fn notification(command: Command, body: serde_json::Value) -> Self {
        Self {
            command: command.as_str().to_string(),
            seq: None,
            body,
        }
    }

    pub fn auth(identity: &str, token: &str) -> Self {
        Self {
            command: AUTH_COMMAND.to_string(),
            seq: None,
            body: serde_json::json!({ "identity": identity, "token": token }),
        }
    }
}

/// A frame received from the remote service.
///
/// Both the command name and the correlation field are optional: some
/// server-pushed replies carry only one of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<u64>,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl InboundFrame {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(line).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
    }

    /// Error text carried by the reply, if any.
    ///
    /// Accepts `body.error` as a plain string or as `{ "message": .. }`.
    pub fn error_message(&self) -> Option<String> {
        let error = self.body.get("error")?;
        match error {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(
                other
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| other.to_string()),
            ),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_message().is_some()
    }
}

// ── Request payloads ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinTargetParams {
    pub owner_id: String,
    pub target_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfigurationParams {
    pub slot_id: u32,
}

// ── Reply payloads ──

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListCandidatesReply {
    #[serde(default)]
    pub targets: Vec<CandidateTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaReply {
    pub remaining: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActiveConfigurationReply {
    #[serde(default)]
    pub active_slot_id: Option<u32>,
    #[serde(default)]
    pub slots: Vec<ConfigurationSlot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchConfigurationReply {
    #[serde(default)]
    pub slots: Vec<ConfigurationSlot>,
}

/// Decode a reply body into a typed payload.
pub fn decode_reply<T: serde::de::DeserializeOwned>(
    command: Command,
    frame: &InboundFrame,
) -> Result<T, ProtocolError> {
    serde_json::from_value(frame.body.clone()).map_err(|e| ProtocolError::UnexpectedPayload {
        command: command.as_str().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_request_serializes_seq() {
        let frame = OutboundFrame::request(Command::FetchQuota, 7, serde_json::json!({}));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["command"], "fetch_quota");
        assert_eq!(json["seq"], 7);
    }

    #[test]
    fn notification_omits_seq() {
        let frame = OutboundFrame::notification(Command::KeepAlive, serde_json::json!({}));
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("seq"));
    }

    #[test]
    fn inbound_frame_tolerates_missing_fields() {
        let frame = InboundFrame::parse(r#"{"body":{"remaining":3}}"#).unwrap();
        assert!(frame.command.is_none());
        assert!(frame.reply_to.is_none());
        let quota: QuotaReply = decode_reply(Command::FetchQuota, &frame).unwrap();
        assert_eq!(quota.remaining, 3);
    }

    #[test]
    fn error_message_accepts_string_and_object() {
        let plain = InboundFrame {
            body: serde_json::json!({ "error": "room is full" }),
            ..Default::default()
        };
        assert_eq!(plain.error_message().as_deref(), Some("room is full"));

        let structured = InboundFrame {
            body: serde_json::json!({ "error": { "code": 4, "message": "already in that room" } }),
            ..Default::default()
        };
        assert_eq!(structured.error_message().as_deref(), Some("already in that room"));

        let ok = InboundFrame {
            body: serde_json::json!({ "error": null, "ok": true }),
            ..Default::default()
        };
        assert!(!ok.is_error());
    }

    #[test]
    fn malformed_line_is_rejected() {
        assert!(InboundFrame::parse("not json").is_err());
    }
}
