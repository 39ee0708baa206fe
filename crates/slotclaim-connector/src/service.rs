//! The in-process control handle for the orchestrator.
//!
//! [`ClaimService`] starts and stops runs and exposes the shared
//! [`ServiceState`]: the status snapshot read by the RPC server and the
//! operator event log.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use slotclaim_network::{CredentialCache, StaticCredentials, Transport};
use slotclaim_protocol::EVENT_LOG_CAPACITY;
use slotclaim_state::{RunState, StatsStore};

use crate::config::ConnectorConfig;
use crate::orchestrator::Orchestrator;

/// Where the orchestrator is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    ConnectingAll,
    QuotaCheck,
    ClaimantExhausted,
    Scanning,
    Disconnecting,
    Cooldown,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// One line of the operator event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimantStatus {
    pub identity: String,
    pub slot_id: u32,
    pub remaining_quota: Option<i64>,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub scanning: bool,
    pub phase: RunPhase,
    pub current_claimant: Option<String>,
    pub quota: Option<i64>,
    pub claimants: Vec<ClaimantStatus>,
    pub tier_distribution: BTreeMap<i64, u64>,
    pub blacklisted: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// State shared between the orchestrator, the service handle and the
/// RPC server.
pub struct ServiceState {
    pub running: bool,
    /// True only inside the inner scan loop.
    pub scanning: bool,
    pub phase: RunPhase,
    pub cursor: usize,
    pub claimants: Vec<ClaimantStatus>,
    pub tier_distribution: BTreeMap<i64, u64>,
    pub blacklisted: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub event_log: Vec<LogEntry>,
    log_tx: broadcast::Sender<LogEntry>,
}

impl ServiceState {
    pub fn new() -> Self {
        let (log_tx, _) = broadcast::channel(256);
        Self {
            running: false,
            scanning: false,
            phase: RunPhase::Idle,
            cursor: 0,
            claimants: Vec::new(),
            tier_distribution: BTreeMap::new(),
            blacklisted: Vec::new(),
            started_at: None,
            event_log: Vec::new(),
            log_tx,
        }
    }

    /// Push a log entry, capping the log at 1000 entries.
    pub fn push_log(&mut self, severity: Severity, message: String) {
        if self.event_log.len() >= EVENT_LOG_CAPACITY {
            self.event_log.remove(0);
        }
        let entry = LogEntry {
            timestamp: Utc::now(),
            severity,
            message,
        };
        // No subscribers is fine.
        let _ = self.log_tx.send(entry.clone());
        self.event_log.push(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.log_tx.subscribe()
    }

    /// Copy the observable parts of a run.
    pub fn sync_run(&mut self, run: &RunState) {
        self.cursor = run.cursor();
        self.claimants = run
            .claimants()
            .iter()
            .map(|r| ClaimantStatus {
                identity: r.identity.clone(),
                slot_id: r.slot_id,
                remaining_quota: r.remaining_quota,
                attempts: r.stats.attempts,
                successes: r.stats.successes,
                failures: r.stats.failures,
            })
            .collect();
        self.tier_distribution = run.tier_distribution().clone();
        self.blacklisted = run.blacklist.excluded().map(str::to_string).collect();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let current = self.claimants.get(self.cursor);
        StatusSnapshot {
            running: self.running,
            scanning: self.scanning,
            phase: self.phase,
            current_claimant: current.map(|c| c.identity.clone()),
            quota: current.and_then(|c| c.remaining_quota),
            claimants: self.claimants.clone(),
            tier_distribution: self.tier_distribution.clone(),
            blacklisted: self.blacklisted.clone(),
            started_at: self.started_at,
        }
    }
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Start/stop handle around one orchestrator task at a time.
pub struct ClaimService {
    config: Arc<ConnectorConfig>,
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialCache>,
    store: Arc<dyn StatsStore>,
    state: Arc<RwLock<ServiceState>>,
    run_flag: Mutex<Arc<AtomicBool>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClaimService {
    /// Build a service whose credentials come from the config file.
    pub fn new(
        config: ConnectorConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn StatsStore>,
    ) -> Self {
        let source = Arc::new(StaticCredentials::new(config.credentials.clone()));
        let credentials = Arc::new(CredentialCache::new(source));
        Self::with_credentials(config, transport, credentials, store)
    }

    pub fn with_credentials(
        config: ConnectorConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialCache>,
        store: Arc<dyn StatsStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            credentials,
            store,
            state: Arc::new(RwLock::new(ServiceState::new())),
            run_flag: Mutex::new(Arc::new(AtomicBool::new(false))),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> Arc<RwLock<ServiceState>> {
        Arc::clone(&self.state)
    }

    /// Start a fresh run. Returns `false` if one is still active.
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }

        let flag = Arc::new(AtomicBool::new(true));
        *self.run_flag.lock().await = Arc::clone(&flag);

        let baseline = match self.store.load() {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load stats, starting from zero");
                Default::default()
            }
        };
        let run = RunState::new(
            &self.config.claimants,
            self.config.scan.blacklist_threshold,
            baseline,
        );

        {
            let mut state = self.state.write().await;
            state.running = true;
            state.scanning = false;
            state.phase = RunPhase::Idle;
            state.started_at = Some(Utc::now());
            state.sync_run(&run);
            state.push_log(
                Severity::Info,
                format!("Run started with {} claimant(s)", self.config.claimants.len()),
            );
        }

        let orchestrator = Orchestrator::new(
            Arc::clone(&self.config),
            Arc::clone(&self.transport),
            Arc::clone(&self.credentials),
            Arc::clone(&self.store),
            Arc::clone(&self.state),
            flag,
            run,
        );
        *task = Some(tokio::spawn(orchestrator.run()));
        tracing::info!("Claim run started");
        true
    }

    /// Ask the running loop to exit at its next state boundary.
    /// Returns whether a run was active.
    pub async fn stop(&self) -> bool {
        let was_running = self.run_flag.lock().await.swap(false, Ordering::SeqCst);
        if was_running {
            self.state
                .write()
                .await
                .push_log(Severity::Info, "Stop requested".into());
            tracing::info!("Claim run stop requested");
        }
        was_running
    }

    /// Wait for the current run task, if any, to exit.
    pub async fn wait(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Orchestrator task failed");
            }
        }
    }

    pub async fn status(&self) -> StatusSnapshot {
        self.state.read().await.snapshot()
    }

    pub async fn subscribe_log(&self) -> broadcast::Receiver<LogEntry> {
        self.state.read().await.subscribe()
    }

    /// Most recent `limit` log entries, oldest first.
    pub async fn recent_log(&self, limit: usize) -> Vec<LogEntry> {
        let state = self.state.read().await;
        let skip = state.event_log.len().saturating_sub(limit);
        state.event_log[skip..].to_vec()
    }
}
