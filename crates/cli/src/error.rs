//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No configuration file was given and none was found.
    #[error("no config file found (looked in: {}). Pass --config PATH", display_paths(.searched))]
    ConfigNotFound { searched: Vec<PathBuf> },

    /// The message to send was empty.
    #[error("nothing to ask: message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Config(#[from] bridge::ConfigError),

    #[error(transparent)]
    Bridge(#[from] bridge::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;
