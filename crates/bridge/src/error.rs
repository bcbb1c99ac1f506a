use thiserror::Error;

use crate::bridge::BridgeState;
use crate::config::ConfigError;
use crate::model::ModelError;

#[derive(Debug, Error)]
pub enum Error {
    /// A configured server did not become ready; no partial registry is kept.
    #[error("failed to start server {server}: {source}")]
    Init {
        server: String,
        #[source]
        source: mcp::Error,
    },

    #[error("bridge is not ready (state: {0})")]
    NotReady(BridgeState),

    #[error("bridge is busy processing another message")]
    Busy,

    #[error("unknown server: {0}")]
    UnknownServer(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Channel(#[from] mcp::Error),

    /// A turn failed twice in a row; carries the last cause.
    #[error("turn {turn} failed: {cause}")]
    TurnFailed { turn: usize, cause: Box<Error> },

    #[error("no final answer after {0} turns")]
    LoopLimitExceeded(usize),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
