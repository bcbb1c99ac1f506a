//! Registry of running tool servers.

use std::collections::HashMap;
use std::time::Duration;

use mcp::{CallToolResult, Channel, ChannelState, JsonRpcError, ServerConfig, Tool};
use serde_json::Value;

use crate::model::ToolSpec;
use crate::{Error, Result};

/// Separates a server name from a tool name in qualified tool names.
pub const TOOL_SEPARATOR: &str = "__";

/// A tool with its source server.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    /// Name advertised to the model.
    pub name: String,
    /// The tool definition from the server.
    pub tool: Tool,
    /// Name of the server providing this tool.
    pub server_name: String,
}

/// Live channels keyed by server name, plus the designated primary.
pub struct Registry {
    primary: String,
    channels: HashMap<String, Channel>,
    tools: Vec<RegisteredTool>,
}

impl Registry {
    /// Start every configured server and discover its tools.
    ///
    /// Fails fast: if any server does not become ready, the servers already
    /// started are closed and no registry is produced.
    pub async fn start(
        configs: Vec<ServerConfig>,
        primary: &str,
        ready_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        if !configs.iter().any(|c| c.name == primary) {
            return Err(Error::UnknownServer(primary.to_string()));
        }

        let mut registry = Self {
            primary: primary.to_string(),
            channels: HashMap::new(),
            tools: Vec::new(),
        };

        for config in configs {
            let name = config.name.clone();
            if let Err(source) = registry.add(config, ready_timeout, request_timeout).await {
                registry.close().await;
                return Err(Error::Init {
                    server: name,
                    source,
                });
            }
        }

        tracing::info!(
            servers = registry.channels.len(),
            tools = registry.tools.len(),
            primary = %registry.primary,
            "registry ready"
        );
        Ok(registry)
    }

    async fn add(
        &mut self,
        config: ServerConfig,
        ready_timeout: Duration,
        request_timeout: Duration,
    ) -> mcp::Result<()> {
        let name = config.name.clone();
        let channel = Channel::start(config, ready_timeout)
            .await?
            .with_request_timeout(request_timeout);

        let tools = match channel.list_tools().await {
            Ok(tools) => tools,
            // A server without tools/list still answers direct calls.
            Err(mcp::Error::JsonRpc(e)) if e.code == JsonRpcError::METHOD_NOT_FOUND => {
                tracing::warn!(server = %name, "server does not list tools");
                Vec::new()
            }
            Err(e) => {
                channel.close().await;
                return Err(e);
            }
        };

        for tool in tools {
            let exposed = if name == self.primary {
                tool.name.clone()
            } else {
                format!("{name}{TOOL_SEPARATOR}{}", tool.name)
            };
            tracing::debug!(server = %name, tool = %exposed, "registered tool");
            self.tools.push(RegisteredTool {
                name: exposed,
                tool,
                server_name: name.clone(),
            });
        }

        self.channels.insert(name, channel);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Channel> {
        self.channels
            .get(name)
            .ok_or_else(|| Error::UnknownServer(name.to_string()))
    }

    pub fn primary(&self) -> Result<&Channel> {
        self.get(&self.primary)
    }

    pub fn primary_name(&self) -> &str {
        &self.primary
    }

    /// Route a tool name to its channel and the server-side tool name.
    ///
    /// `server__tool` routes to `server` when it is registered; anything else
    /// goes to the primary server unchanged.
    pub fn resolve<'a>(&self, tool_name: &'a str) -> Result<(&Channel, &'a str)> {
        if let Some((server, tool)) = tool_name.split_once(TOOL_SEPARATOR)
            && let Some(channel) = self.channels.get(server)
        {
            return Ok((channel, tool));
        }
        Ok((self.primary()?, tool_name))
    }

    /// Invoke a tool by its advertised name.
    pub async fn call_tool(&self, tool_name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        let (channel, tool) = self.resolve(tool_name)?;
        tracing::debug!(server = %channel.name(), tool, "dispatching tool call");
        Ok(channel.call_tool(tool, arguments).await?)
    }

    pub fn tools(&self) -> &[RegisteredTool] {
        &self.tools
    }

    /// Tool declarations, unioned across servers.
    pub fn declarations(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|registered| ToolSpec {
                name: registered.name.clone(),
                description: registered.tool.description.clone().unwrap_or_default(),
                schema: registered.tool.input_schema.clone(),
            })
            .collect()
    }

    /// Whether every channel is still ready.
    pub fn is_healthy(&self) -> bool {
        self.channels
            .values()
            .all(|channel| channel.state() == ChannelState::Ready)
    }

    /// Close every channel. Idempotent.
    pub async fn close(&self) {
        for channel in self.channels.values() {
            channel.close().await;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::{fake_server, silent_server};

    const READY: Duration = Duration::from_secs(5);
    const REQUEST: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn primary_tools_are_bare_others_qualified() {
        let configs = vec![fake_server("fs"), fake_server("notes")];
        let registry = Registry::start(configs, "fs", READY, REQUEST).await.unwrap();

        let names: Vec<_> = registry.declarations().into_iter().map(|t| t.name).collect();
        assert!(names.contains(&"read_file".to_string()));
        assert!(names.contains(&"notes__read_file".to_string()));
        assert_eq!(registry.primary_name(), "fs");

        registry.close().await;
    }

    #[tokio::test]
    async fn resolve_routes_by_prefix() {
        let configs = vec![fake_server("fs"), fake_server("notes")];
        let registry = Registry::start(configs, "fs", READY, REQUEST).await.unwrap();

        let (channel, tool) = registry.resolve("notes__read_file").unwrap();
        assert_eq!(channel.name(), "notes");
        assert_eq!(tool, "read_file");

        let (channel, tool) = registry.resolve("read_file").unwrap();
        assert_eq!(channel.name(), "fs");
        assert_eq!(tool, "read_file");

        // Unknown prefix falls back to the primary with the full name.
        let (channel, tool) = registry.resolve("other__thing").unwrap();
        assert_eq!(channel.name(), "fs");
        assert_eq!(tool, "other__thing");

        assert!(matches!(registry.get("nope"), Err(Error::UnknownServer(_))));
        registry.close().await;
    }

    #[tokio::test]
    async fn call_tool_round_trip() {
        let registry = Registry::start(vec![fake_server("fs")], "fs", READY, REQUEST)
            .await
            .unwrap();
        let result = registry.call_tool("read_file", None).await.unwrap();
        assert_eq!(result.joined_text(), "ok");
        registry.close().await;
    }

    #[tokio::test]
    async fn unknown_primary_fails_before_spawning() {
        let err = Registry::start(vec![fake_server("fs")], "missing", READY, REQUEST)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnknownServer(name) if name == "missing"));
    }

    #[tokio::test]
    async fn any_server_failing_fails_the_registry() {
        let configs = vec![fake_server("fs"), silent_server("stuck")];
        let err = Registry::start(configs, "fs", Duration::from_millis(300), REQUEST)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Init { ref server, .. } if server == "stuck"));
    }

    #[tokio::test]
    async fn close_marks_unhealthy() {
        let registry = Registry::start(vec![fake_server("fs")], "fs", READY, REQUEST)
            .await
            .unwrap();
        assert!(registry.is_healthy());
        registry.close().await;
        assert!(!registry.is_healthy());
        assert!(registry.call_tool("read_file", None).await.is_err());
    }
}
