//! Tool-invocation bridge.
//!
//! A [`Bridge`] owns a [`Registry`] of tool servers (each behind an
//! [`mcp::Channel`]) and a model [`Backend`]. For every user message it runs
//! the tool-call loop: ask the model, execute the requested tool, fold the
//! result back into the conversation, and repeat until the model answers.
//!
//! # Example
//!
//! ```no_run
//! use bridge::{Bridge, BridgeConfig, Provider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig::load("toolbridge.toml")?;
//! let provider = Provider::from_config(&config.model)?;
//!
//! let bridge = Bridge::new(config, provider);
//! bridge.initialize().await?;
//! let answer = bridge
//!     .process_message("Read the complete contents of the file '/tmp/x/test.txt'")
//!     .await?;
//! println!("{answer}");
//! bridge.close().await;
//! # Ok(())
//! # }
//! ```

mod bridge;
pub mod config;
mod conversation;
mod error;
pub mod model;
pub mod providers;
mod registry;

#[cfg(all(test, unix))]
mod testing;

pub use bridge::{Bridge, BridgeState};
pub use config::{BridgeConfig, ConfigError, ModelConfig, ProviderKind, ServerEntry};
pub use conversation::Conversation;
pub use error::{Error, Result};
pub use model::{
    Backend, Message, ModelError, ModelReply, ModelRequest, Part, Role, ToolCall, ToolResult,
    ToolSpec,
};
pub use providers::{AnthropicBackend, OllamaBackend, Provider};
pub use registry::{RegisteredTool, Registry, TOOL_SEPARATOR};
