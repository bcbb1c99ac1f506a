//! Fakes shared by unit tests: `sh` tool servers and a scripted model.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use mcp::ServerConfig;

use crate::config::ServerEntry;
use crate::model::{Backend, Message, ModelError, ModelReply, ModelRequest};

const ID: &str = r#"id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')"#;

const LIST_REPLY: &str = r#"printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"read_file","description":"Read a file","inputSchema":{"type":"object"}}]}}\n' "$id""#;

/// Lists one tool, answers every call with `ok` and fails `broken_tool`.
fn fake_script() -> String {
    format!(
        r#"echo 'fake server running' >&2
while IFS= read -r line; do
  {ID}
  case "$line" in
    *'"tools/list"'*) {LIST_REPLY} ;;
    *'"broken_tool"'*) printf '{{"jsonrpc":"2.0","id":%s,"error":{{"code":-32001,"message":"access denied"}}}}\n' "$id" ;;
    *) printf '{{"jsonrpc":"2.0","id":%s,"result":{{"content":[{{"type":"text","text":"ok"}}]}}}}\n' "$id" ;;
  esac
done
"#
    )
}

pub fn fake_entry() -> ServerEntry {
    ServerEntry::new("sh").with_args(["-c".to_string(), fake_script()])
}

pub fn fake_server(name: &str) -> ServerConfig {
    fake_entry().to_server_config(name)
}

/// Never signals readiness.
pub fn silent_entry() -> ServerEntry {
    ServerEntry::new("sh").with_args(["-c", "sleep 30"])
}

pub fn silent_server(name: &str) -> ServerConfig {
    silent_entry().to_server_config(name)
}

/// Answers `tools/list`, then exits.
pub fn dying_entry() -> ServerEntry {
    let script = format!(
        "echo 'fake server running' >&2\nIFS= read -r line\n{ID}\n{LIST_REPLY}\nexit 0\n"
    );
    ServerEntry::new("sh").with_args(["-c".to_string(), script])
}

/// Replays canned replies and records every conversation it was shown.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<ModelReply, ModelError>>>,
    repeat: Option<ModelReply>,
    delay: Option<Duration>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = Result<ModelReply, ModelError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            repeat: None,
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Returns `reply` forever.
    pub fn repeating(reply: ModelReply) -> Self {
        let mut backend = Self::new([]);
        backend.repeat = Some(reply);
        backend
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

impl Backend for ScriptedBackend {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelError> {
        self.seen.lock().unwrap().push(request.messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().unwrap().pop_front();
        match (next, &self.repeat) {
            (Some(reply), _) => reply,
            (None, Some(reply)) => Ok(reply.clone()),
            (None, None) => Err(ModelError::EmptyResponse),
        }
    }
}
