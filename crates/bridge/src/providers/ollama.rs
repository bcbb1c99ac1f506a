//! Ollama chat API backend (`POST {url}/api/chat`, non-streaming).

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{
    Backend, Message, ModelError, ModelReply, ModelRequest, Part, Role, ToolCall, ToolSpec,
};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ChatToolCall>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct ChatTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ChatToolFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ChatToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// Local model served by Ollama.
pub struct OllamaBackend {
    client: Client,
    model: String,
    url: String,
    next_call_id: AtomicU64,
}

impl OllamaBackend {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            url: DEFAULT_OLLAMA_URL.to_string(),
            next_call_id: AtomicU64::new(1),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Flatten the conversation into Ollama's role/content messages.
    ///
    /// Tool results become `tool` messages; Ollama has no call ids, so
    /// correlation relies on ordering.
    fn messages_to_api(system: Option<&str>, messages: &[Message]) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system {
            out.push(ChatMessage::new("system", system));
        }

        for msg in messages {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            let mut text = String::new();
            let mut tool_calls = Vec::new();

            for part in &msg.parts {
                match part {
                    Part::Text(t) => text.push_str(t),
                    Part::ToolCall(call) => tool_calls.push(ChatToolCall {
                        function: ChatFunctionCall {
                            name: call.name.clone(),
                            arguments: call.input.clone(),
                        },
                    }),
                    Part::ToolResult(result) => {
                        let content = if result.is_error {
                            format!("Error: {}", result.content)
                        } else {
                            result.content.clone()
                        };
                        out.push(ChatMessage::new("tool", content));
                    }
                }
            }

            if !text.is_empty() || !tool_calls.is_empty() {
                out.push(ChatMessage {
                    role: role.to_string(),
                    content: text,
                    tool_calls,
                });
            }
        }
        out
    }

    fn tool_to_api(spec: &ToolSpec) -> ChatTool<'_> {
        ChatTool {
            tool_type: "function",
            function: ChatToolFunction {
                name: &spec.name,
                description: &spec.description,
                parameters: &spec.schema,
            },
        }
    }

    fn response_to_reply(&self, message: ChatMessage) -> Result<ModelReply, ModelError> {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|call| {
                let id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
                ToolCall::new(format!("call_{id}"), call.function.name, call.function.arguments)
            })
            .collect();
        ModelReply::from_parts(message.content, calls)
    }
}

impl std::fmt::Display for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ollama({} at {})", self.model, self.url)
    }
}

impl Backend for OllamaBackend {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelError> {
        let chat = ChatRequest {
            model: &self.model,
            messages: Self::messages_to_api(request.system, request.messages),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
            stream: false,
        };

        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .json(&chat)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        self.response_to_reply(chat_response.message)
    }
}
