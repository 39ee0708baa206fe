//! Protocol client for one network identity.
//!
//! A [`Connection`] owns one [`Transport`] channel and layers on top of it
//! per-epoch sequence numbering, request/response correlation with a
//! command-name fallback, on-demand keep-alives and caller-driven
//! reconnection. Identity tokens come from a [`CredentialSource`] through a
//! 24h [`CredentialCache`].

pub mod connection;
pub mod correlator;
pub mod credentials;
pub mod line_transport;
pub mod transport;

use std::future::Future;
use std::pin::Pin;

pub use connection::{Connection, ConnectionConfig, HeartbeatPolicy, Requester};
pub use correlator::{Correlator, Resolution};
pub use credentials::{Credential, CredentialCache, CredentialSource, StaticCredentials};
pub use line_transport::JsonLineTransport;
pub use transport::{Transport, TransportChannel, TransportEvent};

/// Boxed future used at the trait seams of this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from the network layer.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("credential rejected for {0}")]
    AuthRejected(String),

    #[error("no credential available for {0}")]
    MissingCredential(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] slotclaim_protocol::ProtocolError),
}
