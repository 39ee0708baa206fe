#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

use slotclaim_connector::ConnectorConfig;
use slotclaim_network::{
    BoxFuture, Credential, NetworkError, Transport, TransportChannel, TransportEvent,
};
use slotclaim_protocol::{CandidateTarget, Command, InboundFrame, OutboundFrame};
use slotclaim_state::ClaimantSettings;

#[derive(Default)]
struct World {
    quotas: HashMap<String, i64>,
    candidates: Vec<CandidateTarget>,
    joined: HashMap<String, String>,
    refused: HashSet<String>,
    sent: Vec<(String, OutboundFrame, Instant)>,
    join_error: Option<String>,
    silent_joins: bool,
    /// First frame with this command closes the named identity's channel.
    close_on: Option<(Command, String)>,
    list_delay: Duration,
    channels: HashMap<String, mpsc::Sender<TransportEvent>>,
}

enum Response {
    Reply(InboundFrame),
    Silent,
    /// Close another identity's channel, then reply after `list_delay`.
    CloseThenReply(mpsc::Sender<TransportEvent>, Option<InboundFrame>),
}

/// In-memory remote service. Every identity sees the same world; claims
/// consume quota and remove the claimed target.
#[derive(Clone, Default)]
pub struct FakeService {
    world: Arc<Mutex<World>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_quota(&self, identity: &str, quota: i64) {
        self.world.lock().unwrap().quotas.insert(identity.into(), quota);
    }

    pub fn add_candidate(&self, id: &str, rank: i64) {
        self.world.lock().unwrap().candidates.push(CandidateTarget {
            id: id.into(),
            owner_id: format!("owner-{id}"),
            name: format!("Target {id}"),
            rank,
        });
    }

    pub fn refuse(&self, identity: &str) {
        self.world.lock().unwrap().refused.insert(identity.into());
    }

    /// Every join is answered with this error.
    pub fn reject_joins(&self, message: &str) {
        self.world.lock().unwrap().join_error = Some(message.into());
    }

    /// Joins are never answered.
    pub fn silence_joins(&self) {
        self.world.lock().unwrap().silent_joins = true;
    }

    /// The first `command` frame from any identity closes `identity`'s
    /// channel from the remote side.
    pub fn close_on(&self, command: Command, identity: &str) {
        self.world.lock().unwrap().close_on = Some((command, identity.into()));
    }

    pub fn delay_lists(&self, delay: Duration) {
        self.world.lock().unwrap().list_delay = delay;
    }

    pub fn sent(&self) -> Vec<(String, OutboundFrame)> {
        self.world
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(id, f, _)| (id.clone(), f.clone()))
            .collect()
    }

    pub fn count(&self, command: Command) -> usize {
        self.sent()
            .iter()
            .filter(|(_, f)| f.command == command.as_str())
            .count()
    }

    pub fn frames(&self, identity: &str, command: Command) -> Vec<OutboundFrame> {
        self.sent()
            .into_iter()
            .filter(|(id, f)| id == identity && f.command == command.as_str())
            .map(|(_, f)| f)
            .collect()
    }

    /// Virtual-clock send times of `identity`'s `command` frames.
    pub fn sent_at(&self, identity: &str, command: Command) -> Vec<Instant> {
        self.world
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(id, f, _)| id == identity && f.command == command.as_str())
            .map(|(_, _, at)| *at)
            .collect()
    }

    fn respond(&self, identity: &str, frame: &OutboundFrame) -> Response {
        let mut world = self.world.lock().unwrap();
        world
            .sent
            .push((identity.to_string(), frame.clone(), Instant::now()));

        let trigger = match &world.close_on {
            Some((command, _)) => frame.command == command.as_str(),
            None => false,
        };
        let victim = if trigger {
            world
                .close_on
                .take()
                .and_then(|(_, victim)| world.channels.remove(&victim))
        } else {
            None
        };

        let reply = Self::reply(&mut world, identity, frame);
        match (victim, reply) {
            (Some(victim), reply) => Response::CloseThenReply(victim, reply),
            (None, Some(reply)) => Response::Reply(reply),
            (None, None) => Response::Silent,
        }
    }

    fn reply(world: &mut World, identity: &str, frame: &OutboundFrame) -> Option<InboundFrame> {
        let seq = frame.seq?;
        let command = Command::from_str(&frame.command)?;
        let slots = json!([
            { "slot_id": 1, "units": [{ "unit": "a" }] },
            { "slot_id": 2, "units": [{ "unit": "b" }] }
        ]);
        let body = match command {
            Command::FetchQuota => {
                json!({ "remaining": world.quotas.get(identity).copied().unwrap_or(0) })
            }
            Command::FetchActiveConfiguration => json!({ "active_slot_id": 1, "slots": slots }),
            Command::SwitchConfiguration => json!({ "slots": slots }),
            Command::ListCandidates => json!({ "targets": world.candidates }),
            Command::JoinTarget if world.silent_joins => return None,
            Command::JoinTarget if world.join_error.is_some() => {
                json!({ "error": world.join_error.clone() })
            }
            Command::JoinTarget => {
                let target = frame.body["target_id"].as_str().unwrap_or_default().to_string();
                world.joined.insert(identity.to_string(), target);
                json!({})
            }
            Command::CommitConfiguration => json!({}),
            Command::StartAction => {
                if let Some(q) = world.quotas.get_mut(identity) {
                    *q -= 1;
                }
                if let Some(target) = world.joined.remove(identity) {
                    world.candidates.retain(|c| c.id != target);
                }
                json!({})
            }
            Command::KeepAlive => return None,
        };
        Some(InboundFrame {
            command: Some(format!("{}_reply", frame.command)),
            reply_to: Some(seq),
            body,
        })
    }
}

impl Transport for FakeService {
    fn open<'a>(
        &'a self,
        identity: &'a str,
        _credential: &'a Credential,
    ) -> BoxFuture<'a, Result<TransportChannel, NetworkError>> {
        Box::pin(async move {
            if self.world.lock().unwrap().refused.contains(identity) {
                return Err(NetworkError::Transport("connection refused".into()));
            }
            let (channel, mut outbound, inbound) = TransportChannel::pair(32);
            self.world
                .lock()
                .unwrap()
                .channels
                .insert(identity.to_string(), inbound.clone());
            let service = self.clone();
            let identity = identity.to_string();
            tokio::spawn(async move {
                while let Some(frame) = outbound.recv().await {
                    let is_list = frame.command == Command::ListCandidates.as_str();
                    let delay = service.world.lock().unwrap().list_delay;
                    let reply = match service.respond(&identity, &frame) {
                        Response::Reply(reply) => Some(reply),
                        Response::Silent => None,
                        Response::CloseThenReply(victim, reply) => {
                            let _ = victim
                                .send(TransportEvent::Closed {
                                    reason: "closed by remote".into(),
                                })
                                .await;
                            reply
                        }
                    };
                    let Some(reply) = reply else {
                        continue;
                    };
                    if is_list && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if inbound.send(TransportEvent::Message(reply)).await.is_err() {
                        return;
                    }
                }
            });
            Ok(channel)
        })
    }
}

/// Config with the given claimants (slot 2 each) and scouts, and a token
/// for every identity.
pub fn config(claimants: &[&str], scouts: &[&str]) -> ConnectorConfig {
    let mut config = ConnectorConfig::default();
    config.claimants = claimants
        .iter()
        .map(|id| ClaimantSettings {
            identity: id.to_string(),
            slot_id: 2,
        })
        .collect();
    config.scouts = scouts.iter().map(|s| s.to_string()).collect();
    for id in claimants.iter().chain(scouts) {
        config.credentials.insert(id.to_string(), format!("token-{id}"));
    }
    config
}
