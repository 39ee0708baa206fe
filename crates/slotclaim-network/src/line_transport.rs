//! Newline-delimited JSON over TCP.
//!
//! The first line written on a fresh socket is the `auth` frame; after
//! that every line in either direction is one frame. A read error or EOF
//! ends the channel with [`TransportEvent::Closed`].

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use slotclaim_protocol::{InboundFrame, OutboundFrame};

use crate::credentials::Credential;
use crate::transport::{Transport, TransportChannel, TransportEvent};
use crate::{BoxFuture, NetworkError};

#[derive(Debug, Clone)]
pub struct JsonLineTransport {
    endpoint: String,
    connect_timeout: Duration,
    channel_capacity: usize,
}

impl JsonLineTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(10),
            channel_capacity: 64,
        }
    }

    async fn open_inner(
        &self,
        identity: &str,
        credential: &Credential,
    ) -> Result<TransportChannel, NetworkError> {
        let connect = TcpStream::connect(&self.endpoint);
        let stream = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(stream) => stream?,
            Err(_) => {
                return Err(NetworkError::Transport(format!(
                    "connect to {} timed out",
                    self.endpoint
                )))
            }
        };
        stream.set_nodelay(true)?;

        let (reader, mut writer) = stream.into_split();

        let auth = serde_json::to_string(&OutboundFrame::auth(identity, &credential.token))
            .map_err(slotclaim_protocol::ProtocolError::from)?;
        writer.write_all(auth.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        let (channel, mut outbound_rx, inbound_tx) =
            TransportChannel::pair(self.channel_capacity);

        let writer_identity = identity.to_string();
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let line = match serde_json::to_string(&frame) {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(identity = %writer_identity, error = %e, "Failed to encode frame");
                        continue;
                    }
                };
                let written = async {
                    writer.write_all(line.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    tracing::debug!(identity = %writer_identity, error = %e, "Write failed");
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        let reader_identity = identity.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let reason = loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match InboundFrame::parse(&line) {
                        Ok(frame) => {
                            if inbound_tx.send(TransportEvent::Message(frame)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(identity = %reader_identity, error = %e, "Skipping malformed line");
                        }
                    },
                    Ok(None) => break "remote closed the connection".to_string(),
                    Err(e) => break format!("read error: {e}"),
                }
            };
            let _ = inbound_tx.send(TransportEvent::Closed { reason }).await;
        });

        Ok(channel)
    }
}

impl Transport for JsonLineTransport {
    fn open<'a>(
        &'a self,
        identity: &'a str,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<TransportChannel, NetworkError>> {
        Box::pin(self.open_inner(identity, credential))
    }
}
