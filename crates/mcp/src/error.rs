//! Channel error types.

use crate::protocol::JsonRpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn server: {0}")]
    Spawn(std::io::Error),

    #[error("channel I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel not ready (state: {0})")]
    NotReady(crate::ChannelState),

    #[error("channel closed")]
    Closed,

    #[error("server exited unexpectedly")]
    ServerExited,

    #[error("server did not signal readiness within {0:?}")]
    ReadinessTimeout(std::time::Duration),

    #[error("timeout waiting for response")]
    Timeout,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("tool call failed: {0}")]
    ToolCallFailed(String),

    #[error("output too large: {size} bytes (max {max})")]
    OutputTooLarge { size: usize, max: usize },
}

impl Error {
    /// Whether the failure happened below the protocol layer (pipe, process, timeout).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Spawn(_)
                | Self::Io(_)
                | Self::NotReady(_)
                | Self::Closed
                | Self::ServerExited
                | Self::ReadinessTimeout(_)
                | Self::Timeout
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
