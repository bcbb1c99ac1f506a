//! Per-message conversation state.

use crate::model::{Message, ModelRequest, Part, Role, ToolCall, ToolResult, ToolSpec};

/// Ordered turns of one `process_message` call. Never outlives it.
#[derive(Debug, Clone)]
pub struct Conversation {
    system: Option<String>,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system: Option<String>, user_text: impl Into<String>) -> Self {
        Self {
            system,
            messages: vec![Message::user(user_text)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn request<'a>(&'a self, tools: &'a [ToolSpec]) -> ModelRequest<'a> {
        ModelRequest {
            system: self.system.as_deref(),
            messages: &self.messages,
            tools,
        }
    }

    pub fn push_tool_call(&mut self, call: ToolCall) {
        self.messages.push(Message {
            role: Role::Assistant,
            parts: vec![Part::ToolCall(call)],
        });
    }

    pub fn push_tool_result(&mut self, result: ToolResult) {
        self.messages.push(Message {
            role: Role::User,
            parts: vec![Part::ToolResult(result)],
        });
    }

    /// Surface a failed model call so the retry can take it into account.
    pub fn push_error(&mut self, error: &str) {
        self.messages.push(Message::user(format!(
            "The previous attempt failed: {error}. Please try again."
        )));
    }
}
