//! Tool server channel (spawn, readiness, request/response, lifecycle).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    METHOD_CALL_TOOL, METHOD_LIST_TOOLS, RequestId, Tool,
};

/// Default timeout for a single request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default bound on waiting for the readiness signal.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Marker searched (case-insensitively) on stderr when none is configured.
pub const DEFAULT_READY_MARKER: &str = "server running";

/// Maximum response line size (1MB).
/// Sized for large tool outputs (file reads, directory listings).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Launch configuration for a tool server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Working roots, appended to `args` at launch.
    pub roots: Vec<String>,
    pub env: HashMap<String, String>,
    pub ready_marker: Option<String>,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            roots: Vec::new(),
            env: HashMap::new(),
            ready_marker: None,
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

    pub fn with_ready_marker(mut self, marker: impl Into<String>) -> Self {
        self.ready_marker = Some(marker.into());
        self
    }

    /// Arguments passed to the process: `args` followed by `roots`.
    pub fn launch_args(&self) -> impl Iterator<Item = &str> {
        self.args.iter().chain(self.roots.iter()).map(String::as_str)
    }

    fn ready_marker(&self) -> &str {
        self.ready_marker.as_deref().unwrap_or(DEFAULT_READY_MARKER)
    }
}

/// Lifecycle of a channel: `Starting -> Ready -> Closed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Starting,
    Ready,
    Closed,
    Failed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Framed line transport to one tool server process.
///
/// Requests are never pipelined: the pipes sit behind a single lock that is
/// held from write until the matching response has been read.
pub struct Channel {
    config: ServerConfig,
    request_timeout: Duration,
    state: watch::Sender<ChannelState>,
    process: Mutex<Child>,
    pipes: Mutex<Option<Pipes>>,
    ready_rx: Mutex<Option<oneshot::Receiver<bool>>>,
    next_id: AtomicI64,
}

struct Pipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// Partial response line. Survives a cancelled read so the next request
    /// resumes mid-line instead of parsing the tail.
    line: Vec<u8>,
}

impl Channel {
    /// Spawn the server process. The channel starts in `Starting`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(config.launch_args())
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(Error::Spawn)?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdin")))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdout")))?;
        let stderr = process
            .stderr
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stderr")))?;

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(watch_stderr(
            config.name.clone(),
            config.ready_marker().to_lowercase(),
            stderr,
            ready_tx,
        ));

        tracing::debug!(server = %config.name, command = %config.command, "spawned tool server");

        Ok(Self {
            config,
            request_timeout: DEFAULT_TIMEOUT,
            state: watch::Sender::new(ChannelState::Starting),
            process: Mutex::new(process),
            pipes: Mutex::new(Some(Pipes {
                stdin,
                stdout: BufReader::new(stdout),
                line: Vec::new(),
            })),
            ready_rx: Mutex::new(Some(ready_rx)),
            next_id: AtomicI64::new(1),
        })
    }

    /// Spawn the server and block until it is `Ready` or `ready_timeout` elapses.
    pub async fn start(config: ServerConfig, ready_timeout: Duration) -> Result<Self> {
        let channel = Self::spawn(config)?;
        channel.wait_ready(ready_timeout).await?;
        Ok(channel)
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Wait for the readiness signal on stderr.
    ///
    /// Timing out or the server exiting first moves the channel to `Failed`
    /// and terminates the process.
    pub async fn wait_ready(&self, ready_timeout: Duration) -> Result<()> {
        match self.state() {
            ChannelState::Starting => {}
            ChannelState::Ready => return Ok(()),
            ChannelState::Closed => return Err(Error::Closed),
            state @ ChannelState::Failed => return Err(Error::NotReady(state)),
        }

        let Some(ready_rx) = self.ready_rx.lock().await.take() else {
            return Err(Error::NotReady(self.state()));
        };

        match timeout(ready_timeout, ready_rx).await {
            Ok(Ok(true)) => {
                let became_ready = self.state.send_if_modified(|state| {
                    if *state == ChannelState::Starting {
                        *state = ChannelState::Ready;
                        true
                    } else {
                        false
                    }
                });
                if !became_ready {
                    return Err(Error::NotReady(self.state()));
                }
                tracing::info!(server = %self.config.name, "tool server ready");
                Ok(())
            }
            Ok(Ok(false)) | Ok(Err(_)) => {
                self.fail().await;
                Err(Error::ServerExited)
            }
            Err(_) => {
                tracing::warn!(
                    server = %self.config.name,
                    timeout = ?ready_timeout,
                    "tool server did not signal readiness"
                );
                self.fail().await;
                Err(Error::ReadinessTimeout(ready_timeout))
            }
        }
    }

    /// Refresh the list of available tools.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let result: ListToolsResult = self.request(METHOD_LIST_TOOLS, None::<()>).await?;
        Ok(result.tools)
    }

    /// Call a tool by name.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        let params = CallToolParams::new(name, arguments);
        let result: CallToolResult = self.request(METHOD_CALL_TOOL, Some(params)).await?;

        if result.is_error {
            return Err(Error::ToolCallFailed(result.joined_text()));
        }

        Ok(result)
    }

    /// Send one request and return its response.
    ///
    /// Fails with `NotReady` before readiness and with `Closed` once the
    /// channel is closed, including while the request is in flight.
    pub async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let mut state_rx = self.state.subscribe();
        match *state_rx.borrow_and_update() {
            ChannelState::Ready => {}
            ChannelState::Closed => return Err(Error::Closed),
            state => return Err(Error::NotReady(state)),
        }

        let Some(id) = request.id.clone() else {
            return Err(Error::Protocol("request has no id".to_string()));
        };

        let exchange = async {
            let mut pipes = self.pipes.lock().await;
            let pipes = pipes.as_mut().ok_or(Error::Closed)?;
            pipes.write(&request).await?;
            timeout(self.request_timeout, pipes.read_response(&id, &self.config.name))
                .await
                .map_err(|_| Error::Timeout)?
        };

        // Both branches reduce to owned values so no watch guard outlives the select.
        let outcome = tokio::select! {
            result = exchange => Ok(result),
            changed = state_rx.wait_for(|state| *state != ChannelState::Ready) => {
                Err(changed.map(|state| *state).ok())
            }
        };

        match outcome {
            Ok(result) => {
                // A broken stream cannot carry another request.
                if let Err(Error::ServerExited | Error::Io(_)) = &result {
                    tracing::warn!(server = %self.config.name, "tool server stream broke");
                    self.fail().await;
                }
                result
            }
            Err(Some(ChannelState::Closed) | None) => Err(Error::Closed),
            Err(Some(state)) => Err(Error::NotReady(state)),
        }
    }

    /// Check if the server process is still running.
    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        matches!(process.try_wait(), Ok(None))
    }

    /// Terminate the server and release its streams. Idempotent.
    pub async fn close(&self) {
        if self.state.send_replace(ChannelState::Closed) == ChannelState::Closed {
            return;
        }

        // Dropping stdin lets a well-behaved server exit on EOF.
        self.pipes.lock().await.take();

        let mut process = self.process.lock().await;
        if let Err(e) = process.kill().await {
            tracing::debug!(server = %self.config.name, error = %e, "kill after exit");
        }

        tracing::info!(server = %self.config.name, "channel closed");
    }

    // --- Internal methods ---

    async fn fail(&self) {
        self.state.send_if_modified(|state| {
            let changed = *state != ChannelState::Closed;
            if changed {
                *state = ChannelState::Failed;
            }
            changed
        });
        self.pipes.lock().await.take();
        let mut process = self.process.lock().await;
        if let Err(e) = process.kill().await {
            tracing::debug!(server = %self.config.name, error = %e, "kill after exit");
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let mut request = JsonRpcRequest::new(self.next_request_id(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        let response = self.send(request).await?;
        let result_value = response.into_result()?;
        serde_json::from_value(result_value).map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}

impl Pipes {
    async fn write(&mut self, request: &JsonRpcRequest) -> Result<()> {
        let request_json = serde_json::to_string(request)?;
        self.stdin.write_all(request_json.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read lines until the response carrying `id` arrives.
    ///
    /// Replies to other ids (e.g. a request that timed out earlier) and
    /// server notifications are skipped.
    async fn read_response(&mut self, id: &RequestId, server: &str) -> Result<JsonRpcResponse> {
        loop {
            let bytes_read = self.stdout.read_until(b'\n', &mut self.line).await?;
            if bytes_read == 0 {
                return Err(Error::ServerExited);
            }
            let raw = std::mem::take(&mut self.line);

            if raw.len() > MAX_OUTPUT_SIZE {
                return Err(Error::OutputTooLarge {
                    size: raw.len(),
                    max: MAX_OUTPUT_SIZE,
                });
            }

            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if line.is_empty() {
                return Err(Error::Protocol("empty line from server".to_string()));
            }

            let value: Value = serde_json::from_str(line)
                .map_err(|e| Error::Protocol(format!("malformed line from server: {e}")))?;

            if value.get("id").is_none() && value.get("method").is_some() {
                tracing::debug!(server, "skipping server notification");
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_value(value)
                .map_err(|e| Error::Protocol(format!("not a JSON-RPC response: {e}")))?;

            if &response.id != id {
                tracing::warn!(server, expected = %id, got = %response.id, "discarding uncorrelated response");
                continue;
            }

            return Ok(response);
        }
    }
}

/// Drain stderr into the log and report whether the readiness marker was seen
/// before the stream ended.
async fn watch_stderr(
    server: String,
    marker: String,
    stderr: ChildStderr,
    ready_tx: oneshot::Sender<bool>,
) {
    let mut lines = BufReader::new(stderr).lines();
    let mut ready_tx = Some(ready_tx);

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::debug!(server = %server, "{line}");
                if ready_tx.is_some() && line.to_lowercase().contains(&marker) {
                    if let Some(tx) = ready_tx.take() {
                        let _ = tx.send(true);
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(server = %server, error = %e, "failed to read server stderr");
                break;
            }
        }
    }

    if let Some(tx) = ready_tx.take() {
        let _ = tx.send(false);
    }
}
