//! Line-framed JSON-RPC tool protocol.
//!
//! This crate provides the wire types shared by tool servers and their
//! clients, and a [`Channel`] that drives a tool server child process over
//! its standard streams: one JSON document per line on stdin/stdout, and a
//! readiness signal observed on stderr.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Channel, ServerConfig, DEFAULT_READY_TIMEOUT};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig::new("filesystem", "mcp-filesystem").with_roots(["/tmp/x"]);
//!
//! let channel = Channel::start(config, DEFAULT_READY_TIMEOUT).await?;
//!
//! for tool in channel.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let result = channel.call_tool("read_file", Some(serde_json::json!({
//!     "path": "/tmp/x/test.txt"
//! }))).await?;
//! println!("{}", result.joined_text());
//!
//! channel.close().await;
//! # Ok(())
//! # }
//! ```

mod channel;
mod error;
mod protocol;

pub use channel::{
    Channel, ChannelState, DEFAULT_READY_MARKER, DEFAULT_READY_TIMEOUT, DEFAULT_TIMEOUT,
    MAX_OUTPUT_SIZE, ServerConfig,
};
pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, METHOD_CALL_TOOL, METHOD_LIST_TOOLS, RequestId, Tool, ToolContent,
};
