use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ModelError;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// The outcome of a tool call, correlated with the call by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn failure(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: error.into(),
            is_error: true,
        }
    }
}

/// A part of a message, which can be text or a tool interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Part {
    Text(String),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

/// A message, consisting of a role and one or more parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Get combined text content from all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract all tool calls from this message.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }
}

/// A tool declaration advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

/// Everything needed for a model request.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system: Option<&'a str>,
    pub messages: &'a [Message],
    pub tools: &'a [ToolSpec],
}

/// The model's decision for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    FinalAnswer(String),
    ToolCall(ToolCall),
}

impl ModelReply {
    /// Build a reply from raw text and tool calls; the first tool call wins.
    ///
    /// Whitespace-only text with no tool call is an error, never an empty answer.
    pub fn from_parts(text: String, tool_calls: Vec<ToolCall>) -> Result<Self, ModelError> {
        if let Some(call) = tool_calls.into_iter().next() {
            return Ok(Self::ToolCall(call));
        }
        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(Self::FinalAnswer(text))
    }
}

/// Trait for model provider backends.
pub trait Backend: Send + Sync {
    fn complete(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelReply, ModelError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_extraction() {
        let msg = Message {
            role: Role::Assistant,
            parts: vec![
                Part::Text("Hello ".into()),
                Part::ToolCall(ToolCall::new("1", "read_file", Value::Null)),
                Part::Text("world".into()),
            ],
        };
        assert_eq!(msg.text(), "Hello world");
        assert_eq!(msg.tool_calls().len(), 1);
    }

    #[test]
    fn reply_prefers_tool_call() {
        let call = ToolCall::new("1", "read_file", serde_json::json!({"path": "/tmp/x/a"}));
        let reply = ModelReply::from_parts("Let me look.".into(), vec![call.clone()]).unwrap();
        assert_eq!(reply, ModelReply::ToolCall(call));
    }

    #[test]
    fn blank_reply_is_an_error() {
        let err = ModelReply::from_parts("  \n".into(), Vec::new()).unwrap_err();
        assert!(matches!(err, ModelError::EmptyResponse));
    }

    #[test]
    fn text_reply_is_final() {
        let reply = ModelReply::from_parts("done".into(), Vec::new()).unwrap();
        assert_eq!(reply, ModelReply::FinalAnswer("done".into()));
    }
}
