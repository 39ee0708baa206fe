//! Two-stage request/response correlation.
//!
//! Pending requests are kept in a table keyed by sequence number. An
//! inbound frame is matched first by its `reply_to` field; when that is
//! absent or unknown, it is matched against the oldest pending request
//! whose command equals the frame's de-suffixed command name. Some
//! server-pushed replies omit the correlation field, which is what the
//! second stage is for.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use slotclaim_protocol::{reply_command, Command, InboundFrame};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// A request awaiting its reply.
#[derive(Debug)]
struct PendingRequest {
    command: Command,
    deadline: Instant,
    slot: oneshot::Sender<InboundFrame>,
}

/// How an inbound frame was matched.
#[derive(Debug)]
pub enum Resolution {
    /// Matched on `reply_to`.
    ById(u64),
    /// Matched on command name against the oldest pending request.
    ByCommand(u64),
    /// Nothing pending matches; the frame is handed back.
    Unmatched(InboundFrame),
}

#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<u64, PendingRequest>,
    /// Secondary index, oldest first.
    by_command: HashMap<Command, VecDeque<u64>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request and return the receiving half of its
    /// result slot.
    pub fn register(
        &mut self,
        seq: u64,
        command: Command,
        timeout: Duration,
    ) -> oneshot::Receiver<InboundFrame> {
        let (slot, rx) = oneshot::channel();
        if self.pending.contains_key(&seq) {
            self.remove_from_index(seq);
        }
        self.pending.insert(
            seq,
            PendingRequest {
                command,
                deadline: Instant::now() + timeout,
                slot,
            },
        );
        self.by_command.entry(command).or_default().push_back(seq);
        rx
    }

    /// Route an inbound frame to the request it answers.
    pub fn resolve(&mut self, frame: InboundFrame) -> Resolution {
        if let Some(seq) = frame.reply_to.filter(|s| self.pending.contains_key(s)) {
            self.complete(seq, frame);
            return Resolution::ById(seq);
        }

        let oldest = frame
            .command
            .as_deref()
            .and_then(reply_command)
            .and_then(|cmd| self.by_command.get(&cmd))
            .and_then(|queue| queue.front().copied());

        match oldest {
            Some(seq) => {
                self.complete(seq, frame);
                Resolution::ByCommand(seq)
            }
            None => Resolution::Unmatched(frame),
        }
    }

    /// Drop a pending request without completing it.
    pub fn cancel(&mut self, seq: u64) -> bool {
        self.remove_from_index(seq);
        self.pending.remove(&seq).is_some()
    }

    /// Drop every request whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<u64> {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in &expired {
            self.cancel(*seq);
        }
        expired
    }

    /// Discard everything. Waiting callers observe a closed slot.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.by_command.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.pending.contains_key(&seq)
    }

    fn complete(&mut self, seq: u64, frame: InboundFrame) {
        self.remove_from_index(seq);
        if let Some(pending) = self.pending.remove(&seq) {
            // The caller may already have timed out; the reply is then dropped.
            let _ = pending.slot.send(frame);
        }
    }

    fn remove_from_index(&mut self, seq: u64) {
        let Some(command) = self.pending.get(&seq).map(|p| p.command) else {
            return;
        };
        if let Some(queue) = self.by_command.get_mut(&command) {
            queue.retain(|s| *s != seq);
            if queue.is_empty() {
                self.by_command.remove(&command);
            }
        }
    }
}
