//! slotclaim connector - runs the claim orchestrator as a service.
//!
//! Wires the protocol client, discovery and claim execution into the
//! outer/inner cycle ([`orchestrator`]), exposes start/stop/status through
//! [`ClaimService`], and serves those over a local JSON-RPC socket
//! ([`rpc_server`]).

pub mod config;
pub mod orchestrator;
pub mod rpc_server;
pub mod service;

pub use config::{ConfigError, ConnectorConfig};
pub use orchestrator::Orchestrator;
pub use rpc_server::RpcServer;
pub use service::{
    ClaimService, ClaimantStatus, LogEntry, RunPhase, ServiceState, Severity, StatusSnapshot,
};
