//! JSON-RPC 2.0 control socket.
//!
//! Methods:
//! - `claim.start()` - start a fresh run
//! - `claim.stop()` - stop the run at its next state boundary
//! - `claim.get_status()` - status snapshot
//! - `claim.get_log({ limit? })` - most recent operator log entries
//!
//! Listens on localhost TCP. Each line received is a request; each line
//! sent is a response.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use slotclaim_protocol::control::{INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR};
use slotclaim_protocol::{ControlRequest, ControlResponse};

use crate::service::ClaimService;

const DEFAULT_LOG_LIMIT: usize = 100;

pub struct RpcServer {
    bind_addr: String,
    service: Arc<ClaimService>,
    max_connections: usize,
}

impl RpcServer {
    pub fn new(bind_addr: String, service: Arc<ClaimService>, max_connections: usize) -> Self {
        Self {
            bind_addr,
            service,
            max_connections,
        }
    }

    /// Accept connections until the listener fails.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "JSON-RPC server listening");
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.max_connections.max(1)));

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            tracing::debug!(peer = %peer_addr, "RPC client connected");

            let service = Arc::clone(&self.service);
            let permit = semaphore.clone().acquire_owned().await?;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, service).await {
                    tracing::warn!(peer = %peer_addr, error = %e, "RPC connection error");
                }
                drop(permit);
            });
        }
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    service: Arc<ClaimService>,
) -> Result<(), anyhow::Error> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = process_request(&line, &service).await;
        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Process a single request line and return the response.
pub async fn process_request(request_str: &str, service: &ClaimService) -> ControlResponse {
    let request: ControlRequest = match serde_json::from_str(request_str) {
        Ok(r) => r,
        Err(e) => {
            return ControlResponse::error(None, PARSE_ERROR, format!("Invalid JSON: {e}"));
        }
    };
    let id = request.id.clone();

    match request.method.as_str() {
        "claim.start" => {
            let started = service.start().await;
            ControlResponse::success(id, serde_json::json!({ "started": started }))
        }
        "claim.stop" => {
            let stopped = service.stop().await;
            ControlResponse::success(id, serde_json::json!({ "stopped": stopped }))
        }
        "claim.get_status" => {
            let status = service.status().await;
            match serde_json::to_value(status) {
                Ok(value) => ControlResponse::success(id, value),
                Err(e) => ControlResponse::error(id, -32603, format!("Internal error: {e}")),
            }
        }
        "claim.get_log" => handle_get_log(id, &request.params, service).await,
        _ => ControlResponse::error(
            id,
            METHOD_NOT_FOUND,
            format!("Unknown method: {}", request.method),
        ),
    }
}

async fn handle_get_log(
    id: Option<serde_json::Value>,
    params: &serde_json::Value,
    service: &ClaimService,
) -> ControlResponse {
    let limit = match params.get("limit") {
        None | Some(serde_json::Value::Null) => DEFAULT_LOG_LIMIT,
        Some(v) => match v.as_u64() {
            Some(n) => n as usize,
            None => {
                return ControlResponse::error(
                    id,
                    INVALID_PARAMS,
                    "limit must be a non-negative integer".into(),
                )
            }
        },
    };
    let entries = service.recent_log(limit).await;
    ControlResponse::success(id, serde_json::json!({ "entries": entries }))
}
