//! slotclaim protocol - core types and message definitions
//!
//! Describes the request/response contract spoken with the remote
//! service: command names, the line-framed JSON envelope, the typed
//! payloads carried inside it, and the JSON-RPC envelope used by the
//! local control socket.

pub mod commands;
pub mod constants;
pub mod control;
pub mod error;
pub mod messages;
pub mod types;

pub use commands::*;
pub use constants::*;
pub use control::{ControlRequest, ControlResponse, RpcError};
pub use error::*;
pub use messages::*;
pub use types::*;
