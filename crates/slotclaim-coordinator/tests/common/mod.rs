#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;

use slotclaim_network::{BoxFuture, Requester};
use slotclaim_protocol::{CandidateTarget, Command, InboundFrame};

type Responder = Box<dyn Fn(Command, &Value) -> Option<InboundFrame> + Send + Sync>;

/// Requester whose replies come from a closure. A `None` reply behaves like
/// a timeout: the call waits out the full timeout first.
pub struct ScriptedRequester {
    identity: String,
    live: AtomicBool,
    delay: Duration,
    responder: Responder,
    pub sent: Mutex<Vec<(Command, Value, Instant)>>,
}

impl ScriptedRequester {
    pub fn new(
        identity: &str,
        responder: impl Fn(Command, &Value) -> Option<InboundFrame> + Send + Sync + 'static,
    ) -> Self {
        Self {
            identity: identity.to_string(),
            live: AtomicBool::new(true),
            delay: Duration::ZERO,
            responder: Box::new(responder),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<Command> {
        self.sent.lock().unwrap().iter().map(|(c, _, _)| *c).collect()
    }

    pub fn count(&self, command: Command) -> usize {
        self.commands().into_iter().filter(|c| *c == command).count()
    }
}

impl Requester for ScriptedRequester {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn request<'a>(
        &'a self,
        command: Command,
        body: Value,
        timeout: Duration,
    ) -> BoxFuture<'a, Option<InboundFrame>> {
        Box::pin(async move {
            self.sent
                .lock()
                .unwrap()
                .push((command, body.clone(), Instant::now()));
            match (self.responder)(command, &body) {
                Some(reply) => {
                    tokio::time::sleep(self.delay.min(timeout)).await;
                    if self.delay > timeout {
                        None
                    } else {
                        Some(reply)
                    }
                }
                None => {
                    tokio::time::sleep(timeout).await;
                    None
                }
            }
        })
    }

    fn keep_alive<'a>(&'a self) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.is_live() })
    }
}

pub fn reply(command: Command, body: Value) -> InboundFrame {
    InboundFrame {
        command: Some(format!("{}_reply", command.as_str())),
        reply_to: None,
        body,
    }
}

pub fn error_reply(command: Command, message: &str) -> InboundFrame {
    reply(command, json!({ "error": message }))
}

pub fn target(id: &str, rank: i64) -> CandidateTarget {
    CandidateTarget {
        id: id.to_string(),
        owner_id: format!("owner-{id}"),
        name: format!("Target {id}"),
        rank,
    }
}

pub fn candidate_list(targets: &[CandidateTarget]) -> InboundFrame {
    reply(Command::ListCandidates, json!({ "targets": targets }))
}
