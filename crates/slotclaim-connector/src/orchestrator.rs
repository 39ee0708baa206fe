//! The outer/inner claim cycle.
//!
//! Outer cycle, once per claimant round:
//! `ConnectingAll → QuotaCheck → {ClaimantExhausted | Scanning} →
//! Disconnecting → Cooldown`, until every claimant is used up
//! (`Finished`) or the run flag is cleared.
//!
//! The run flag is checked at every state boundary. In-flight requests
//! and sleeps are never interrupted; the loop simply does not enter the
//! next state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::RwLock;

use slotclaim_coordinator::{
    fetch_quota, ClaimExecutor, ClaimOutcome, LoadoutResolver, TargetDiscovery,
};
use slotclaim_network::{Connection, CredentialCache, Requester, Transport};
use slotclaim_state::{RunState, StatsStore};

use crate::config::ConnectorConfig;
use crate::service::{RunPhase, ServiceState, Severity};

/// How one outer cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleEnd {
    /// Round finished normally; cool down before the next one.
    Completed,
    /// Quota or configuration could not be determined; retry the same
    /// claimant after a cooldown.
    Deferred,
    /// Claimant out of quota and rotated.
    Rotated,
    /// Run flag cleared mid-cycle.
    Stopped,
}

pub struct Orchestrator {
    config: Arc<ConnectorConfig>,
    credentials: Arc<CredentialCache>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn StatsStore>,
    state: Arc<RwLock<ServiceState>>,
    running: Arc<AtomicBool>,
    run: RunState,
    connections: HashMap<String, Connection>,
    discovery: TargetDiscovery,
    executor: ClaimExecutor,
    loadout: LoadoutResolver,
}

impl Orchestrator {
    pub fn new(
        config: Arc<ConnectorConfig>,
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialCache>,
        store: Arc<dyn StatsStore>,
        state: Arc<RwLock<ServiceState>>,
        running: Arc<AtomicBool>,
        run: RunState,
    ) -> Self {
        let discovery =
            TargetDiscovery::new(config.timing.discovery(), config.scan.target_filter());
        let executor = ClaimExecutor::new(config.timing.claim_timings());
        let loadout = LoadoutResolver::new(config.timing.request_timeout());
        Self {
            config,
            credentials,
            transport,
            store,
            state,
            running,
            run,
            connections: HashMap::new(),
            discovery,
            executor,
            loadout,
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Drive the run to completion or until stopped.
    pub async fn run(mut self) {
        self.open_connections().await;

        while self.is_running() && !self.run.is_finished() {
            match self.cycle().await {
                Ok(CycleEnd::Completed | CycleEnd::Deferred | CycleEnd::Rotated) => {
                    if !self.run.is_finished() {
                        self.cooldown().await;
                    }
                }
                Ok(CycleEnd::Stopped) => break,
                Err(e) => {
                    tracing::error!(error = %format!("{e:#}"), "Claim cycle failed");
                    self.note(Severity::Error, format!("Cycle error: {e:#}")).await;
                    self.disconnect_all().await;
                    tokio::time::sleep(self.config.timing.error_penalty()).await;
                }
            }
        }

        self.disconnect_all().await;
        self.persist();

        let finished = self.run.is_finished();
        {
            let mut state = self.state.write().await;
            state.sync_run(&self.run);
            state.scanning = false;
            state.running = false;
            state.phase = if finished { RunPhase::Finished } else { RunPhase::Idle };
            let message = if finished {
                "All claimants exhausted, run finished"
            } else {
                "Run stopped"
            };
            state.push_log(Severity::Info, message.into());
        }
        self.running.store(false, Ordering::SeqCst);
        tracing::info!(finished, "Claim run ended");
    }

    /// One connection per distinct identity, all handed to this loop.
    async fn open_connections(&mut self) {
        let connection_config = self.config.timing.managed_connection();
        for identity in self.config.identities() {
            let conn = Connection::new(
                identity.clone(),
                Arc::clone(&self.transport),
                Arc::clone(&self.credentials),
                connection_config.clone(),
            );
            conn.set_managed().await;
            self.connections.insert(identity, conn);
        }
    }

    async fn cycle(&mut self) -> anyhow::Result<CycleEnd> {
        let identity = self
            .run
            .current()
            .map(|r| r.identity.clone())
            .context("no current claimant")?;

        // ConnectingAll
        self.set_phase(RunPhase::ConnectingAll).await;
        if !self.connect_all(&identity).await? {
            self.disconnect_all().await;
            return Ok(CycleEnd::Deferred);
        }
        if !self.is_running() {
            return Ok(CycleEnd::Stopped);
        }

        if !self.prepare_claimant(&identity).await? {
            self.disconnect_all().await;
            return Ok(CycleEnd::Deferred);
        }
        if !self.is_running() {
            return Ok(CycleEnd::Stopped);
        }

        // QuotaCheck
        self.set_phase(RunPhase::QuotaCheck).await;
        let quota = self.run.current().and_then(|r| r.remaining_quota).unwrap_or(0);
        if quota <= 0 {
            self.set_phase(RunPhase::ClaimantExhausted).await;
            self.note(Severity::Info, format!("{identity} has no quota left")).await;
            self.run.advance();
            self.persist();
            self.publish().await;
            self.disconnect_all().await;
            return Ok(CycleEnd::Rotated);
        }

        // Scanning
        self.scan(&identity).await?;

        // Disconnecting
        self.disconnect_all().await;
        if !self.is_running() {
            return Ok(CycleEnd::Stopped);
        }
        Ok(CycleEnd::Completed)
    }

    /// Connect the claimant and then every scout, staggered. Only a
    /// failed claimant connect defers the cycle.
    async fn connect_all(&self, claimant: &str) -> anyhow::Result<bool> {
        let conn = self
            .connections
            .get(claimant)
            .with_context(|| format!("no connection for claimant {claimant}"))?;
        if !conn.connect().await {
            self.note(Severity::Warn, format!("Could not connect claimant {claimant}"))
                .await;
            return Ok(false);
        }

        for (index, scout) in self.config.scouts.iter().enumerate() {
            if !self.is_running() {
                break;
            }
            if index > 0 {
                tokio::time::sleep(self.config.timing.scout_connect_stagger()).await;
            }
            let Some(conn) = self.connections.get(scout) else {
                continue;
            };
            if !conn.connect().await {
                self.note(Severity::Warn, format!("Could not connect scout {scout}"))
                    .await;
            }
        }
        Ok(true)
    }

    /// Refresh the claimant's quota and make sure its claim configuration
    /// is cached. `false` means the cycle cannot proceed.
    async fn prepare_claimant(&mut self, identity: &str) -> anyhow::Result<bool> {
        let conn = self
            .connections
            .get(identity)
            .with_context(|| format!("no connection for claimant {identity}"))?;

        let quota = match fetch_quota(conn, self.config.timing.request_timeout()).await {
            Ok(quota) => quota,
            Err(e) => {
                tracing::warn!(identity = %identity, error = %e, "Could not determine quota");
                self.note(Severity::Warn, format!("Could not determine quota for {identity}"))
                    .await;
                return Ok(false);
            }
        };

        let record = self
            .run
            .current_mut()
            .context("claimant cursor out of range")?;
        record.remaining_quota = Some(quota);
        tracing::info!(identity = %identity, quota, "Quota refreshed");

        if quota > 0 && self.loadout.acquire(conn, record).await.is_none() {
            self.note(
                Severity::Warn,
                format!("No usable claim configuration for {identity}"),
            )
            .await;
            self.persist();
            self.publish().await;
            return Ok(false);
        }

        self.persist();
        self.publish().await;
        Ok(true)
    }

    async fn scan(&mut self, identity: &str) -> anyhow::Result<()> {
        let claimant = self
            .connections
            .get(identity)
            .with_context(|| format!("no connection for claimant {identity}"))?;
        let max_attempts = self.config.scan.max_attempts;

        self.set_phase(RunPhase::Scanning).await;
        self.set_scanning(true).await;

        for attempt in 1..=max_attempts {
            if !self.is_running() {
                break;
            }
            if attempt > 1 && attempt % 2 == 0 {
                claimant.keep_alive().await;
            }
            if !claimant.is_live() {
                self.note_lost(identity, attempt).await;
                break;
            }

            let scouts: Vec<&dyn Requester> = self
                .config
                .scouts
                .iter()
                .filter_map(|id| self.connections.get(id))
                .filter(|conn| conn.is_live())
                .map(|conn| conn as &dyn Requester)
                .collect();
            let found = self
                .discovery
                .discover(&scouts, self.run.last_claimed(), &self.run.blacklist)
                .await;

            let keep_scanning = match found {
                None => {
                    tracing::debug!(attempt, "No admissible target");
                    true
                }
                Some(target) if !self.discovery.filter().allowed.allows(target.rank) => {
                    tracing::debug!(
                        target_id = %target.id,
                        rank = target.rank,
                        "Target outside allowed ranks"
                    );
                    true
                }
                Some(target) => {
                    let outcome = self.executor.execute(claimant, &target, &mut self.run).await;
                    self.persist();
                    {
                        let mut state = self.state.write().await;
                        state.sync_run(&self.run);
                        state.push_log(
                            severity_for(outcome),
                            format!(
                                "Claim of {} (rank {}) by {identity}: {outcome}",
                                target.id, target.rank
                            ),
                        );
                    }
                    // A rejected join still waits out one scan interval.
                    outcome == ClaimOutcome::SoftFailContinue
                }
            };
            if !keep_scanning {
                break;
            }

            if !claimant.is_live() {
                self.note_lost(identity, attempt).await;
                break;
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.config.timing.scan_interval()).await;
            }
        }

        self.set_scanning(false).await;
        Ok(())
    }

    async fn note_lost(&self, identity: &str, attempt: u32) {
        tracing::warn!(identity = %identity, attempt, "Claimant connection lost, ending scan");
        self.note(
            Severity::Warn,
            format!("Claimant {identity} connection lost, ending scan"),
        )
        .await;
    }

    async fn disconnect_all(&self) {
        self.set_phase(RunPhase::Disconnecting).await;
        for conn in self.connections.values() {
            conn.disconnect().await;
        }
    }

    async fn cooldown(&self) {
        if !self.is_running() {
            return;
        }
        self.set_phase(RunPhase::Cooldown).await;
        tokio::time::sleep(self.config.timing.round_cooldown()).await;
    }

    /// Best-effort save of baseline plus this run's counters.
    fn persist(&self) {
        if let Err(e) = self.store.save(&self.run.persisted()) {
            tracing::warn!(error = %e, "Failed to persist stats");
        }
    }

    async fn publish(&self) {
        self.state.write().await.sync_run(&self.run);
    }

    async fn set_phase(&self, phase: RunPhase) {
        tracing::debug!(?phase, "Phase");
        self.state.write().await.phase = phase;
    }

    async fn set_scanning(&self, scanning: bool) {
        self.state.write().await.scanning = scanning;
    }

    async fn note(&self, severity: Severity, message: String) {
        self.state.write().await.push_log(severity, message);
    }
}

fn severity_for(outcome: ClaimOutcome) -> Severity {
    match outcome {
        ClaimOutcome::Success => Severity::Info,
        ClaimOutcome::SoftFailContinue | ClaimOutcome::SoftFailStop => Severity::Warn,
        ClaimOutcome::HardFailAbortRound => Severity::Error,
    }
}
