//! Configuration for the slotclaim connector.
//!
//! Read from a TOML file; every section has defaults so an empty file (or
//! no file at all) is a valid configuration.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use slotclaim_coordinator::{ClaimTimings, DiscoveryConfig, RankFilter, TargetFilter};
use slotclaim_network::{ConnectionConfig, HeartbeatPolicy};
use slotclaim_protocol::*;
use slotclaim_state::ClaimantSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level connector configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub service: ServiceSection,
    pub timing: TimingSection,
    pub scan: ScanSection,
    /// Rotated in order; the run ends once all are exhausted.
    pub claimants: Vec<ClaimantSettings>,
    /// Identities used only for discovery.
    pub scouts: Vec<String>,
    /// Identity to token map backing the static credential source.
    pub credentials: HashMap<String, String>,
    pub storage: StorageSection,
    pub rpc: RpcSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Remote service address (`host:port`).
    pub endpoint: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:7000".into(),
        }
    }
}

/// Pacing and timeouts, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub stagger_interval_ms: u64,
    pub scan_interval_ms: u64,
    pub round_cooldown_ms: u64,
    pub action_settle_ms: u64,
    pub join_settle_ms: u64,
    pub reconnect_settle_ms: u64,
    pub scout_connect_stagger_ms: u64,
    pub error_penalty_ms: u64,
    pub request_timeout_ms: u64,
    pub list_timeout_ms: u64,
    pub action_timeout_ms: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            stagger_interval_ms: DEFAULT_STAGGER_INTERVAL_MS,
            scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
            round_cooldown_ms: DEFAULT_ROUND_COOLDOWN_MS,
            action_settle_ms: DEFAULT_ACTION_SETTLE_MS,
            join_settle_ms: DEFAULT_JOIN_SETTLE_MS,
            reconnect_settle_ms: DEFAULT_RECONNECT_SETTLE_MS,
            scout_connect_stagger_ms: DEFAULT_SCOUT_CONNECT_STAGGER_MS,
            error_penalty_ms: DEFAULT_ERROR_PENALTY_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            list_timeout_ms: DEFAULT_LIST_TIMEOUT_MS,
            action_timeout_ms: DEFAULT_ACTION_TIMEOUT_MS,
        }
    }
}

impl TimingSection {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn round_cooldown(&self) -> Duration {
        Duration::from_millis(self.round_cooldown_ms)
    }

    pub fn scout_connect_stagger(&self) -> Duration {
        Duration::from_millis(self.scout_connect_stagger_ms)
    }

    pub fn error_penalty(&self) -> Duration {
        Duration::from_millis(self.error_penalty_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn claim_timings(&self) -> ClaimTimings {
        ClaimTimings {
            join_timeout: self.request_timeout(),
            join_settle: Duration::from_millis(self.join_settle_ms),
            action_timeout: Duration::from_millis(self.action_timeout_ms),
            action_settle: Duration::from_millis(self.action_settle_ms),
        }
    }

    pub fn discovery(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            stagger_interval: Duration::from_millis(self.stagger_interval_ms),
            list_timeout: Duration::from_millis(self.list_timeout_ms),
        }
    }

    /// Connections owned by the orchestrator never run their own heartbeat.
    pub fn managed_connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            reconnect_settle: Duration::from_millis(self.reconnect_settle_ms),
            heartbeat: HeartbeatPolicy::Disabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    /// Discovery attempts per outer cycle.
    pub max_attempts: u32,
    /// Failed joins before a target is excluded for the rest of the run.
    pub blacklist_threshold: u32,
    pub disallowed_ranks: Vec<i64>,
    pub allowed_ranks: AllowedRanks,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_SCAN_ATTEMPTS,
            blacklist_threshold: DEFAULT_BLACKLIST_THRESHOLD,
            disallowed_ranks: DEFAULT_DISALLOWED_RANKS.to_vec(),
            allowed_ranks: AllowedRanks::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowedRanks {
    pub enabled: bool,
    pub ranks: Vec<i64>,
}

impl ScanSection {
    pub fn target_filter(&self) -> TargetFilter {
        TargetFilter {
            disallowed: self.disallowed_ranks.iter().copied().collect(),
            allowed: RankFilter {
                enabled: self.allowed_ranks.enabled,
                ranks: self.allowed_ranks.ranks.iter().copied().collect::<BTreeSet<_>>(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub stats_path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            stats_path: base.join("slotclaim").join("stats.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSection {
    pub bind_addr: String,
    pub max_connections: usize,
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9470".into(),
            max_connections: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl ConnectorConfig {
    /// Read from `path`. `None` means the file does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&contents)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Default location: `<config dir>/slotclaim/connector.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("slotclaim")
            .join("connector.toml")
    }

    /// Every identity that needs a connection, claimants first, each once.
    pub fn identities(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let all = self
            .claimants
            .iter()
            .map(|c| &c.identity)
            .chain(self.scouts.iter());
        for identity in all {
            if !out.contains(identity) {
                out.push(identity.clone());
            }
        }
        out
    }
}
