//! The transport capability a [`Connection`](crate::Connection) is built on.
//!
//! Opening a transport yields a duplex pair of channels: frames pushed into
//! `outbound` are written to the remote service, and everything the remote
//! service sends arrives on `inbound`. Dropping the outbound sender closes
//! the channel.

use slotclaim_protocol::{InboundFrame, OutboundFrame};
use tokio::sync::mpsc;

use crate::credentials::Credential;
use crate::{BoxFuture, NetworkError};

/// Event delivered on the inbound side of a channel.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A decoded frame from the remote service.
    Message(InboundFrame),
    /// The channel ended (socket error, EOF, or remote close).
    Closed { reason: String },
}

/// An open, authenticated duplex channel.
#[derive(Debug)]
pub struct TransportChannel {
    pub outbound: mpsc::Sender<OutboundFrame>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

impl TransportChannel {
    /// Build a channel pair with the given buffer size.
    ///
    /// Returns the channel handed to the connection plus the opposite ends
    /// kept by the transport implementation.
    pub fn pair(
        capacity: usize,
    ) -> (
        Self,
        mpsc::Receiver<OutboundFrame>,
        mpsc::Sender<TransportEvent>,
    ) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        (
            Self {
                outbound: out_tx,
                inbound: in_rx,
            },
            out_rx,
            in_tx,
        )
    }
}

/// Opens authenticated channels to the remote service.
pub trait Transport: Send + Sync {
    fn open<'a>(
        &'a self,
        identity: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<TransportChannel, NetworkError>>;
}
