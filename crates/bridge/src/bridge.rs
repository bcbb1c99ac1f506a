//! The model/tool-call loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;

use crate::config::BridgeConfig;
use crate::conversation::Conversation;
use crate::model::{Backend, ModelError, ModelReply, ToolResult, ToolSpec};
use crate::registry::Registry;
use crate::{Error, Result};

/// Lifecycle of a bridge.
///
/// `Ready` is re-entered after each processed message. `Failed` requires a
/// new `initialize` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Initializing,
    Ready,
    Processing,
    Failed,
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Drives one conversation at a time between a model backend and the
/// registered tool servers.
pub struct Bridge<B> {
    config: BridgeConfig,
    backend: B,
    state: watch::Sender<BridgeState>,
    registry: RwLock<Option<Arc<Registry>>>,
    init_lock: Mutex<()>,
    busy: AtomicBool,
}

enum Step {
    Answer(String),
    Continue,
}

/// Holds the busy flag for one `process_message` call.
///
/// Dropping it mid-turn (the caller cancelled) returns the bridge to `Ready`.
struct ProcessingGuard<'a> {
    busy: &'a AtomicBool,
    state: &'a watch::Sender<BridgeState>,
}

impl<'a> ProcessingGuard<'a> {
    fn acquire(busy: &'a AtomicBool, state: &'a watch::Sender<BridgeState>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { busy, state })
    }

    /// Leave `Processing` for `next`, unless something else (e.g. `close`)
    /// already moved the bridge on.
    fn finish(&self, next: BridgeState) {
        self.state.send_if_modified(|state| {
            let processing = *state == BridgeState::Processing;
            if processing {
                *state = next;
            }
            processing
        });
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.finish(BridgeState::Ready);
        self.busy.store(false, Ordering::Release);
    }
}

impl<B: Backend> Bridge<B> {
    pub fn new(config: BridgeConfig, backend: B) -> Self {
        Self {
            config,
            backend,
            state: watch::Sender::new(BridgeState::Uninitialized),
            registry: RwLock::new(None),
            init_lock: Mutex::new(()),
            busy: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Start every configured server.
    ///
    /// Idempotent: on a `Ready` bridge this is a no-op. From `Failed` the old
    /// servers are closed and started again.
    pub async fn initialize(&self) -> Result<()> {
        let _init = self.init_lock.lock().await;

        match self.state() {
            BridgeState::Ready => {
                tracing::debug!("bridge already initialized");
                return Ok(());
            }
            BridgeState::Processing => return Err(Error::Busy),
            _ => {}
        }

        self.config.validate()?;

        let stale = self.registry.write().await.take();
        if let Some(stale) = stale {
            stale.close().await;
        }

        self.state.send_replace(BridgeState::Initializing);
        let started = Registry::start(
            self.config.server_configs(),
            &self.config.primary_server,
            self.config.ready_timeout(),
            self.config.request_timeout(),
        )
        .await;

        match started {
            Ok(registry) => {
                *self.registry.write().await = Some(Arc::new(registry));
                self.state.send_replace(BridgeState::Ready);
                tracing::info!("bridge ready");
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(BridgeState::Failed);
                tracing::error!(error = %e, "bridge initialization failed");
                Err(e)
            }
        }
    }

    /// Tool declarations offered to the model.
    pub async fn tools(&self) -> Result<Vec<ToolSpec>> {
        match self.registry.read().await.as_ref() {
            Some(registry) => Ok(registry.declarations()),
            None => Err(Error::NotReady(self.state())),
        }
    }

    /// Run the tool-call loop for one user message and return the final answer.
    ///
    /// Only one message is processed at a time; a concurrent call fails with
    /// `Busy` instead of queueing.
    pub async fn process_message(&self, text: &str) -> Result<String> {
        let guard = ProcessingGuard::acquire(&self.busy, &self.state).ok_or(Error::Busy)?;

        let state = self.state();
        if state != BridgeState::Ready {
            return Err(Error::NotReady(state));
        }
        let Some(registry) = self.registry.read().await.clone() else {
            return Err(Error::NotReady(state));
        };

        self.state.send_replace(BridgeState::Processing);
        let outcome = self.run(&registry, text).await;

        if registry.is_healthy() {
            guard.finish(BridgeState::Ready);
        } else {
            tracing::error!("a tool server is no longer usable");
            guard.finish(BridgeState::Failed);
        }
        outcome
    }

    /// Close every server. The bridge may be initialized again afterwards.
    pub async fn close(&self) {
        let _init = self.init_lock.lock().await;
        let registry = self.registry.write().await.take();
        if let Some(registry) = registry {
            registry.close().await;
            tracing::info!("bridge closed");
        }
        self.state.send_replace(BridgeState::Uninitialized);
    }

    async fn run(&self, registry: &Registry, text: &str) -> Result<String> {
        let tools = registry.declarations();
        let mut conversation = Conversation::new(self.config.system_prompt.clone(), text);
        let max_turns = self.config.max_turns;

        for turn in 1..=max_turns {
            let mut retried = false;
            loop {
                match self.step(registry, &tools, &mut conversation, turn).await {
                    Ok(Step::Answer(answer)) => {
                        tracing::info!(turn, "final answer");
                        return Ok(answer);
                    }
                    Ok(Step::Continue) => break,
                    Err(e) if !retried => {
                        tracing::warn!(turn, error = %e, "turn failed, retrying");
                        retried = true;
                    }
                    Err(e) => {
                        tracing::error!(turn, error = %e, "turn failed twice");
                        return Err(Error::TurnFailed {
                            turn,
                            cause: Box::new(e),
                        });
                    }
                }
            }
        }

        tracing::warn!(max_turns, "no final answer within the turn limit");
        Err(Error::LoopLimitExceeded(max_turns))
    }

    /// One model call and, if requested, one tool call.
    ///
    /// Failures are recorded in the conversation before they are returned, so
    /// a retry shows the model what went wrong.
    async fn step(
        &self,
        registry: &Registry,
        tools: &[ToolSpec],
        conversation: &mut Conversation,
        turn: usize,
    ) -> Result<Step> {
        let model_timeout = self.config.model_timeout();
        let reply = match timeout(model_timeout, self.backend.complete(conversation.request(tools))).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                conversation.push_error(&e.to_string());
                return Err(e.into());
            }
            Err(_) => {
                let e = ModelError::Timeout(model_timeout);
                conversation.push_error(&e.to_string());
                return Err(e.into());
            }
        };

        let call = match reply {
            ModelReply::FinalAnswer(answer) => return Ok(Step::Answer(answer)),
            ModelReply::ToolCall(call) => call,
        };

        tracing::info!(turn, tool = %call.name, "tool call");
        let (id, name) = (call.id.clone(), call.name.clone());
        let arguments = (!call.input.is_null()).then(|| call.input.clone());
        conversation.push_tool_call(call);

        match registry.call_tool(&name, arguments).await {
            Ok(result) => {
                conversation.push_tool_result(ToolResult::success(id, result.joined_text()));
                Ok(Step::Continue)
            }
            Err(e) => {
                conversation.push_tool_result(ToolResult::failure(id, e.to_string()));
                Err(e)
            }
        }
    }
}
