use serde::{Deserialize, Serialize};

use crate::constants::REPLY_SUFFIXES;

/// Requests the remote service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    ListCandidates,
    FetchQuota,
    FetchActiveConfiguration,
    SwitchConfiguration,
    JoinTarget,
    CommitConfiguration,
    StartAction,
    KeepAlive,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListCandidates => "list_candidates",
            Self::FetchQuota => "fetch_quota",
            Self::FetchActiveConfiguration => "fetch_active_configuration",
            Self::SwitchConfiguration => "switch_configuration",
            Self::JoinTarget => "join_target",
            Self::CommitConfiguration => "commit_configuration",
            Self::StartAction => "start_action",
            Self::KeepAlive => "keep_alive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "list_candidates" => Some(Self::ListCandidates),
            "fetch_quota" => Some(Self::FetchQuota),
            "fetch_active_configuration" => Some(Self::FetchActiveConfiguration),
            "switch_configuration" => Some(Self::SwitchConfiguration),
            "join_target" => Some(Self::JoinTarget),
            "commit_configuration" => Some(Self::CommitConfiguration),
            "start_action" => Some(Self::StartAction),
            "keep_alive" => Some(Self::KeepAlive),
            _ => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip a reply suffix (`_reply`, `_ack`, `_resp`) from an inbound
/// command name. Names without a known suffix are returned unchanged.
pub fn base_command(inbound: &str) -> &str {
    for suffix in REPLY_SUFFIXES {
        if let Some(stripped) = inbound.strip_suffix(suffix) {
            if !stripped.is_empty() {
                return stripped;
            }
        }
    }
    inbound
}

/// Resolve an inbound command name to the request it answers.
pub fn reply_command(inbound: &str) -> Option<Command> {
    Command::from_str(base_command(inbound))
}
