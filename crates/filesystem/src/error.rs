//! Filesystem server error types.

use mcp::JsonRpcError;
use thiserror::Error;

/// Errors raised while resolving or serving a request.
///
/// None of these terminate the server; each becomes a JSON-RPC error response.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid arguments: {0}")]
    InvalidParams(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unrecognized request: {0}")]
    Protocol(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FsError> for JsonRpcError {
    fn from(err: FsError) -> Self {
        let code = match &err {
            FsError::AccessDenied(_) => JsonRpcError::ACCESS_DENIED,
            FsError::NotFound(_) => JsonRpcError::NOT_FOUND,
            FsError::InvalidPath(_) | FsError::InvalidParams(_) => JsonRpcError::INVALID_PARAMS,
            FsError::UnknownTool(_) => JsonRpcError::METHOD_NOT_FOUND,
            FsError::Protocol(_) => JsonRpcError::INVALID_REQUEST,
            FsError::Config(_) | FsError::Io(_) => JsonRpcError::INTERNAL_ERROR,
        };
        JsonRpcError::new(code, err.to_string())
    }
}

pub type FsResult<T> = Result<T, FsError>;
