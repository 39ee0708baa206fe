//! One protocol client per identity.
//!
//! Lifecycle:
//! 1. `connect()` - resolve credential, open transport, start inbound pump
//! 2. `send_command()` - numbered request, suspended until reply or timeout
//! 3. `keep_alive()` - fire-and-forget liveness probe
//! 4. `disconnect()` / `reconnect()` - always caller-initiated
//!
//! The sequence counter belongs to the connection epoch: `reconnect()`
//! resets it to 1, mints a new epoch id and discards every pending entry
//! from the previous epoch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use slotclaim_protocol::{
    Command, InboundFrame, OutboundFrame, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_RECONNECT_SETTLE_MS,
};

use crate::correlator::{Correlator, Resolution};
use crate::credentials::CredentialCache;
use crate::transport::{Transport, TransportChannel, TransportEvent};
use crate::{BoxFuture, NetworkError};

/// Whether the connection probes and sweeps on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatPolicy {
    /// Send `keep_alive` and expire overdue requests on an interval.
    Automatic { interval: Duration },
    /// Only explicit probes. Used once an outer loop owns the lifetime.
    Disabled,
}

impl Default for HeartbeatPolicy {
    fn default() -> Self {
        Self::Automatic {
            interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Pause between disconnect and connect in `reconnect()`.
    pub reconnect_settle: Duration,
    pub heartbeat: HeartbeatPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_settle: Duration::from_millis(DEFAULT_RECONNECT_SETTLE_MS),
            heartbeat: HeartbeatPolicy::default(),
        }
    }
}

/// Request surface used by discovery and the claim executor.
///
/// Implemented by [`Connection`]; tests substitute scripted fakes.
pub trait Requester: Send + Sync {
    fn identity(&self) -> &str;

    fn is_live(&self) -> bool;

    /// Send a request and wait for its reply. `None` means "no data":
    /// timeout, not connected, or discarded by a reconnect.
    fn request<'a>(
        &'a self,
        command: Command,
        body: Value,
        timeout: Duration,
    ) -> BoxFuture<'a, Option<InboundFrame>>;

    /// Fire-and-forget liveness probe. Returns whether it was written.
    fn keep_alive<'a>(&'a self) -> BoxFuture<'a, bool>;
}

struct Session {
    epoch: Uuid,
    /// Bumped on every install/teardown so stale pumps can tell they are stale.
    generation: u64,
    next_seq: u64,
    correlator: Correlator,
    outbound: Option<mpsc::Sender<OutboundFrame>>,
    pump: Option<JoinHandle<()>>,
    heartbeat: HeartbeatPolicy,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl Session {
    fn teardown(&mut self) -> usize {
        self.generation += 1;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }
        self.outbound = None;
        self.correlator.clear()
    }
}

pub struct Connection {
    identity: String,
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialCache>,
    config: ConnectionConfig,
    live: Arc<AtomicBool>,
    session: Arc<Mutex<Session>>,
}

impl Connection {
    pub fn new(
        identity: impl Into<String>,
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialCache>,
        config: ConnectionConfig,
    ) -> Self {
        let session = Session {
            epoch: Uuid::new_v4(),
            generation: 0,
            next_seq: 1,
            correlator: Correlator::new(),
            outbound: None,
            pump: None,
            heartbeat: config.heartbeat,
            heartbeat_task: None,
        };
        Self {
            identity: identity.into(),
            transport,
            credentials,
            config,
            live: Arc::new(AtomicBool::new(false)),
            session: Arc::new(Mutex::new(session)),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub async fn epoch(&self) -> Uuid {
        self.session.lock().await.epoch
    }

    pub async fn pending_count(&self) -> usize {
        self.session.lock().await.correlator.len()
    }

    /// Hand lifetime management to an outer loop: stop automatic
    /// heartbeats and pending-request sweeps.
    pub async fn set_managed(&self) {
        self.set_heartbeat(HeartbeatPolicy::Disabled).await;
    }

    pub async fn set_heartbeat(&self, policy: HeartbeatPolicy) {
        let mut session = self.session.lock().await;
        session.heartbeat = policy;
        if policy == HeartbeatPolicy::Disabled {
            if let Some(task) = session.heartbeat_task.take() {
                task.abort();
            }
        }
    }

    /// Open the channel. Expected connectivity failures are logged and
    /// reported as `false`; already-live connections are reused.
    pub async fn connect(&self) -> bool {
        if self.is_live() {
            return true;
        }

        let credential = match self.credentials.resolve(&self.identity).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(identity = %self.identity, error = %e, "Failed to resolve credential");
                return false;
            }
        };

        match self.transport.open(&self.identity, &credential).await {
            Ok(channel) => {
                self.install(channel).await;
                tracing::info!(identity = %self.identity, "Connected");
                true
            }
            Err(e) => {
                if matches!(e, NetworkError::AuthRejected(_)) {
                    self.credentials.invalidate(&self.identity).await;
                }
                tracing::warn!(identity = %self.identity, error = %e, "Connect failed");
                false
            }
        }
    }

    pub async fn disconnect(&self) {
        let dropped = {
            let mut session = self.session.lock().await;
            let dropped = session.teardown();
            self.live.store(false, Ordering::SeqCst);
            dropped
        };
        tracing::debug!(identity = %self.identity, dropped_pending = dropped, "Disconnected");
    }

    /// Disconnect, start a new epoch, settle, then connect again.
    pub async fn reconnect(&self) -> bool {
        {
            let mut session = self.session.lock().await;
            session.teardown();
            session.next_seq = 1;
            session.epoch = Uuid::new_v4();
            self.live.store(false, Ordering::SeqCst);
            tracing::debug!(identity = %self.identity, epoch = %session.epoch, "Starting new connection epoch");
        }
        tokio::time::sleep(self.config.reconnect_settle).await;
        self.connect().await
    }

    /// Send a numbered request and wait for the correlated reply.
    ///
    /// Never fails: timeouts and closed channels resolve to `None`.
    pub async fn send_command(
        &self,
        command: Command,
        body: Value,
        timeout: Duration,
    ) -> Option<InboundFrame> {
        let (seq, epoch, rx, outbound) = {
            let mut session = self.session.lock().await;
            let Some(outbound) = session.outbound.clone() else {
                tracing::debug!(identity = %self.identity, command = %command, "Not connected, request skipped");
                return None;
            };
            let seq = session.next_seq;
            session.next_seq += 1;
            let rx = session.correlator.register(seq, command, timeout);
            (seq, session.epoch, rx, outbound)
        };

        if outbound
            .send(OutboundFrame::request(command, seq, body))
            .await
            .is_err()
        {
            self.cancel(seq, epoch).await;
            tracing::debug!(identity = %self.identity, command = %command, "Channel closed while sending");
            return None;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(frame)) => Some(frame),
            Ok(Err(_)) => None,
            Err(_) => {
                self.cancel(seq, epoch).await;
                tracing::debug!(
                    identity = %self.identity,
                    command = %command,
                    seq,
                    timeout_ms = timeout.as_millis() as u64,
                    "Request timed out"
                );
                None
            }
        }
    }

    /// Send an explicit keep-alive probe.
    pub async fn send_keep_alive(&self) -> bool {
        let outbound = self.session.lock().await.outbound.clone();
        match outbound {
            Some(tx) => tx
                .send(OutboundFrame::notification(
                    Command::KeepAlive,
                    serde_json::json!({}),
                ))
                .await
                .is_ok(),
            None => false,
        }
    }

    async fn cancel(&self, seq: u64, epoch: Uuid) {
        let mut session = self.session.lock().await;
        // A reconnect restarts numbering; never cancel the new epoch's entry.
        if session.epoch == epoch {
            session.correlator.cancel(seq);
        }
    }

    async fn install(&self, channel: TransportChannel) {
        let TransportChannel { outbound, inbound } = channel;
        let mut session = self.session.lock().await;
        session.teardown();
        let generation = session.generation;
        session.outbound = Some(outbound.clone());
        self.live.store(true, Ordering::SeqCst);

        session.pump = Some(tokio::spawn(pump(
            self.identity.clone(),
            generation,
            Arc::clone(&self.session),
            Arc::clone(&self.live),
            inbound,
        )));

        if let HeartbeatPolicy::Automatic { interval } = session.heartbeat {
            session.heartbeat_task = Some(tokio::spawn(heartbeat(
                self.identity.clone(),
                generation,
                interval,
                Arc::clone(&self.session),
                outbound,
            )));
        }
    }
}

impl Requester for Connection {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn is_live(&self) -> bool {
        Connection::is_live(self)
    }

    fn request<'a>(
        &'a self,
        command: Command,
        body: Value,
        timeout: Duration,
    ) -> BoxFuture<'a, Option<InboundFrame>> {
        Box::pin(self.send_command(command, body, timeout))
    }

    fn keep_alive<'a>(&'a self) -> BoxFuture<'a, bool> {
        Box::pin(self.send_keep_alive())
    }
}

/// Route inbound frames into the correlator until the channel ends, then
/// flip the liveness flag off.
async fn pump(
    identity: String,
    generation: u64,
    session: Arc<Mutex<Session>>,
    live: Arc<AtomicBool>,
    mut inbound: mpsc::Receiver<TransportEvent>,
) {
    let reason = loop {
        match inbound.recv().await {
            Some(TransportEvent::Message(frame)) => {
                let mut session = session.lock().await;
                if session.generation != generation {
                    return;
                }
                match session.correlator.resolve(frame) {
                    Resolution::ById(seq) | Resolution::ByCommand(seq) => {
                        tracing::trace!(identity = %identity, seq, "Reply correlated");
                    }
                    Resolution::Unmatched(frame) => {
                        tracing::debug!(
                            identity = %identity,
                            command = ?frame.command,
                            reply_to = ?frame.reply_to,
                            "Uncorrelated frame dropped"
                        );
                    }
                }
            }
            Some(TransportEvent::Closed { reason }) => break reason,
            None => break "inbound stream ended".to_string(),
        }
    };

    let mut session = session.lock().await;
    if session.generation != generation {
        return;
    }
    session.outbound = None;
    if let Some(task) = session.heartbeat_task.take() {
        task.abort();
    }
    let dropped = session.correlator.clear();
    session.pump = None;
    live.store(false, Ordering::SeqCst);
    tracing::info!(identity = %identity, reason = %reason, dropped_pending = dropped, "Connection closed");
}

async fn heartbeat(
    identity: String,
    generation: u64,
    interval: Duration,
    session: Arc<Mutex<Session>>,
    outbound: mpsc::Sender<OutboundFrame>,
) {
    loop {
        tokio::time::sleep(interval).await;
        {
            let mut session = session.lock().await;
            if session.generation != generation {
                return;
            }
            let expired = session.correlator.expire(tokio::time::Instant::now());
            if !expired.is_empty() {
                tracing::debug!(identity = %identity, count = expired.len(), "Expired overdue requests");
            }
        }
        let probe = OutboundFrame::notification(Command::KeepAlive, serde_json::json!({}));
        if outbound.send(probe).await.is_err() {
            return;
        }
    }
}
