//! Bridge configuration, loaded from TOML.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use mcp::ServerConfig;
use serde::Deserialize;

pub const DEFAULT_MAX_TURNS: usize = 10;
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Server used for tool calls that do not name one.
    pub primary_server: String,

    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Bound on model turns per message.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    #[serde(default)]
    pub servers: BTreeMap<String, ServerEntry>,

    #[serde(default)]
    pub model: ModelConfig,
}

/// One `[servers.NAME]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Working roots, appended to `args` at launch.
    #[serde(default)]
    pub roots: Vec<String>,

    #[serde(default)]
    pub ready_marker: Option<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ServerEntry {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            roots: Vec::new(),
            ready_marker: None,
            env: HashMap::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_roots(mut self, roots: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn to_server_config(&self, name: &str) -> ServerConfig {
        let mut config = ServerConfig::new(name, &self.command)
            .with_args(&self.args)
            .with_roots(&self.roots);
        config.ready_marker = self.ready_marker.clone();
        config.env = self.env.clone();
        config
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    Anthropic,
}

/// Model provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the provider API.
    #[serde(default)]
    pub url: Option<String>,

    /// Anthropic API key; falls back to `ANTHROPIC_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_model(),
            url: None,
            api_key: None,
        }
    }
}

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}

fn default_ready_timeout_secs() -> u64 {
    mcp::DEFAULT_READY_TIMEOUT.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    mcp::DEFAULT_TIMEOUT.as_secs()
}

fn default_model_timeout_secs() -> u64 {
    120
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl BridgeConfig {
    /// A configuration with no servers yet, using defaults everywhere else.
    pub fn new(primary_server: impl Into<String>) -> Self {
        Self {
            primary_server: primary_server.into(),
            system_prompt: None,
            max_turns: DEFAULT_MAX_TURNS,
            ready_timeout_secs: default_ready_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            model_timeout_secs: default_model_timeout_secs(),
            servers: BTreeMap::new(),
            model: ModelConfig::default(),
        }
    }

    pub fn with_server(mut self, name: impl Into<String>, entry: ServerEntry) -> Self {
        self.servers.insert(name.into(), entry);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Load and validate configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        if !self.servers.contains_key(&self.primary_server) {
            return Err(ConfigError::UnknownPrimary(self.primary_server.clone()));
        }
        if self.max_turns == 0 {
            return Err(ConfigError::Invalid("max_turns must be at least 1".to_string()));
        }
        for (field, secs) in [
            ("ready_timeout_secs", self.ready_timeout_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("model_timeout_secs", self.model_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be at least 1")));
            }
        }
        Ok(())
    }

    /// Launch configurations, in name order.
    pub fn server_configs(&self) -> Vec<ServerConfig> {
        self.servers
            .iter()
            .map(|(name, entry)| entry.to_server_config(name))
            .collect()
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("no servers configured: add at least one [servers.NAME] table")]
    NoServers,

    #[error("primary_server '{0}' is not a configured server")]
    UnknownPrimary(String),

    #[error("anthropic API key not configured: set model.api_key or ANTHROPIC_API_KEY")]
    MissingApiKey,

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
primary_server = "filesystem"
system_prompt = "You are a helpful assistant with filesystem access."
max_turns = 5
request_timeout_secs = 3

[servers.filesystem]
command = "mcp-filesystem"
roots = ["/tmp/x"]

[servers.notes]
command = "notes-server"
args = ["--quiet"]
ready_marker = "notes ready"
env = { NOTES_HOME = "/tmp/notes" }

[model]
provider = "anthropic"
model = "claude-sonnet-4-20250514"
"#;

    #[test]
    fn parse_full_config() {
        let config = BridgeConfig::parse(FULL).unwrap();
        assert_eq!(config.primary_server, "filesystem");
        assert_eq!(config.max_turns, 5);
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.ready_timeout(), mcp::DEFAULT_READY_TIMEOUT);
        assert_eq!(config.model.provider, ProviderKind::Anthropic);

        let servers = config.server_configs();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].name, "filesystem");
        assert_eq!(servers[0].launch_args().collect::<Vec<_>>(), ["/tmp/x"]);
        assert_eq!(servers[1].ready_marker.as_deref(), Some("notes ready"));
        assert_eq!(servers[1].env["NOTES_HOME"], "/tmp/notes");
    }

    #[test]
    fn defaults_apply() {
        let config = BridgeConfig::parse(
            r#"
primary_server = "fs"
[servers.fs]
command = "mcp-filesystem"
"#,
        )
        .unwrap();
        assert_eq!(config.max_turns, DEFAULT_MAX_TURNS);
        assert_eq!(config.model.provider, ProviderKind::Ollama);
        assert_eq!(config.model.model, DEFAULT_MODEL);
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn primary_must_be_configured() {
        let err = BridgeConfig::parse(
            r#"
primary_server = "missing"
[servers.fs]
command = "mcp-filesystem"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPrimary(name) if name == "missing"));
    }

    #[test]
    fn requires_a_server() {
        let err = BridgeConfig::parse(r#"primary_server = "fs""#).unwrap_err();
        assert!(matches!(err, ConfigError::NoServers));
    }

    #[test]
    fn zero_turns_rejected() {
        let config = BridgeConfig::new("fs")
            .with_server("fs", ServerEntry::new("mcp-filesystem"))
            .with_max_turns(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_timeouts_rejected() {
        for field in ["ready_timeout_secs", "request_timeout_secs", "model_timeout_secs"] {
            let toml = format!(
                "primary_server = \"fs\"\n{field} = 0\n[servers.fs]\ncommand = \"mcp-filesystem\"\n"
            );
            let err = BridgeConfig::parse(&toml).unwrap_err();
            assert!(
                matches!(&err, ConfigError::Invalid(msg) if msg.contains(field)),
                "{field}: {err}"
            );
        }
    }

    #[test]
    fn malformed_toml() {
        let err = BridgeConfig::parse("primary_server = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
