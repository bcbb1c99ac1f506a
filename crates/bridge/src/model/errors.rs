use std::time::Duration;

use thiserror::Error;

/// Errors from model provider calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// A network error occurred during the API call.
    #[error("network: {0}")]
    Network(String),

    /// The provider returned an error response.
    #[error("provider api: {0}")]
    Api(String),

    /// The provider response could not be parsed.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The model produced neither text nor a tool call.
    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("model did not respond within {0:?}")]
    Timeout(Duration),
}
