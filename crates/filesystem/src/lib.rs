//! Sandboxed filesystem tool server.
//!
//! Reads JSON-RPC requests (or a few natural-language phrasings) line by line
//! and serves `read_file`, `write_file`, `list_directory` and
//! `list_allowed_directories`, restricted to a set of allowed directories.

pub mod error;
pub mod handlers;
pub mod phrases;
pub mod sandbox;
pub mod server;

pub use error::{FsError, FsResult};
pub use sandbox::Sandbox;
pub use server::{FilesystemServer, READY_MESSAGE};
