//! Request dispatch and the stdio serve loop.

use mcp::{
    CallToolParams, CallToolResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, METHOD_CALL_TOOL, METHOD_LIST_TOOLS, RequestId, Tool,
};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{FsError, FsResult};
use crate::handlers::{self, PathArgs, WriteFileArgs, parse_args};
use crate::phrases;
use crate::sandbox::Sandbox;

/// Printed to stderr once the server accepts requests.
pub const READY_MESSAGE: &str = "Secure MCP Filesystem Server running on stdio";

const TOOL_NAMES: [&str; 4] = [
    "read_file",
    "write_file",
    "list_directory",
    "list_allowed_directories",
];

/// A filesystem tool server bound to one sandbox.
pub struct FilesystemServer {
    sandbox: Sandbox,
}

impl FilesystemServer {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Declarations returned by `tools/list`.
    pub fn tools() -> Vec<Tool> {
        let path_schema = |description: &str| {
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": description }
                },
                "required": ["path"]
            })
        };

        vec![
            Tool {
                name: "read_file".to_string(),
                description: Some(
                    "Read the complete contents of a file inside the allowed directories."
                        .to_string(),
                ),
                input_schema: path_schema("Path of the file to read"),
            },
            Tool {
                name: "write_file".to_string(),
                description: Some(
                    "Create a file or overwrite an existing one with new content.".to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path of the file to write" },
                        "content": { "type": "string", "description": "Text to write" }
                    },
                    "required": ["path", "content"]
                }),
            },
            Tool {
                name: "list_directory".to_string(),
                description: Some(
                    "List the entries of a directory, marking each as [FILE] or [DIR].".to_string(),
                ),
                input_schema: path_schema("Path of the directory to list"),
            },
            Tool {
                name: "list_allowed_directories".to_string(),
                description: Some(
                    "List the directories this server is allowed to access.".to_string(),
                ),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
        ]
    }

    pub async fn call_tool(&self, params: CallToolParams) -> FsResult<CallToolResult> {
        tracing::info!(tool = %params.name, "tool call");

        match params.name.as_str() {
            "read_file" => {
                handlers::read_file(&self.sandbox, parse_args::<PathArgs>(params.arguments)?).await
            }
            "write_file" => {
                let args = parse_args::<WriteFileArgs>(params.arguments)?;
                handlers::write_file(&self.sandbox, args).await
            }
            "list_directory" => {
                let args = parse_args::<PathArgs>(params.arguments)?;
                handlers::list_directory(&self.sandbox, args).await
            }
            "list_allowed_directories" => Ok(handlers::list_allowed_directories(&self.sandbox)),
            other => Err(FsError::UnknownTool(other.to_string())),
        }
    }

    /// Handle one input line. Returns `None` for blank lines and notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(value @ Value::Object(_)) => {
                let id = value
                    .get("id")
                    .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok())
                    .unwrap_or(RequestId::Null);
                match serde_json::from_value::<JsonRpcRequest>(value) {
                    Ok(request) => self.handle_request(request).await,
                    Err(e) => Some(JsonRpcResponse::failure(
                        id,
                        JsonRpcError::invalid_request(e.to_string()),
                    )),
                }
            }
            // A JSON string carries a natural-language request.
            Ok(Value::String(text)) => Some(self.handle_phrase(&text).await),
            Ok(_) => Some(JsonRpcResponse::failure(
                RequestId::Null,
                JsonRpcError::invalid_request("expected a request object or text"),
            )),
            Err(e) if line.starts_with('{') || line.starts_with('[') => Some(
                JsonRpcResponse::failure(RequestId::Null, JsonRpcError::parse_error(e.to_string())),
            ),
            Err(_) => Some(self.handle_phrase(line).await),
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let outcome = match request.method.as_str() {
            METHOD_LIST_TOOLS => to_value(&ListToolsResult {
                tools: Self::tools(),
            }),
            METHOD_CALL_TOOL => match parse_args::<CallToolParams>(request.params) {
                Ok(params) => self.dispatch(params).await,
                Err(e) => Err(e.into()),
            },
            // Operations may also be invoked directly by name.
            method if TOOL_NAMES.contains(&method) => {
                self.dispatch(CallToolParams::new(method, request.params))
                    .await
            }
            method => Err(JsonRpcError::method_not_found(method)),
        };

        let Some(id) = request.id else {
            tracing::debug!(method = %request.method, "notification handled");
            return None;
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    async fn handle_phrase(&self, text: &str) -> JsonRpcResponse {
        let outcome = match phrases::parse(text) {
            Some(params) => self.dispatch(params).await,
            None => {
                tracing::warn!(line = %text, "unrecognized request");
                Err(FsError::Protocol(text.to_string()).into())
            }
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(RequestId::Null, result),
            Err(error) => JsonRpcResponse::failure(RequestId::Null, error),
        }
    }

    async fn dispatch(&self, params: CallToolParams) -> Result<Value, JsonRpcError> {
        match self.call_tool(params).await {
            Ok(result) => to_value(&result),
            Err(e) => {
                tracing::warn!(error = %e, "tool call failed");
                Err(e.into())
            }
        }
    }

    /// Serve requests from `reader` until end of input, one response line per
    /// request line.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(());
            }

            let line = String::from_utf8_lossy(&buf);
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };

            let mut json = serde_json::to_string(&response)?;
            json.push('\n');
            writer.write_all(json.as_bytes()).await?;
            writer.flush().await?;
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, BufReader};

    fn fixture() -> (TempDir, FilesystemServer, String) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap().display().to_string();
        std::fs::write(format!("{root}/test.txt"), "Hello, world!").unwrap();
        let server = FilesystemServer::new(Sandbox::new([root.as_str()]).unwrap());
        (dir, server, root)
    }

    fn text(response: &JsonRpcResponse) -> String {
        let result: CallToolResult =
            serde_json::from_value(response.result.clone().unwrap()).unwrap();
        result.joined_text()
    }

    fn call(id: i64, name: &str, arguments: Value) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        })
        .to_string()
    }

    #[tokio::test]
    async fn lists_tools() {
        let (_dir, server, _root) = fixture();
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
            .await
            .unwrap();
        let result: ListToolsResult = serde_json::from_value(response.result.unwrap()).unwrap();
        let names: Vec<_> = result.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, TOOL_NAMES);
    }

    #[tokio::test]
    async fn reads_file_via_tools_call() {
        let (_dir, server, root) = fixture();
        let line = call(2, "read_file", json!({ "path": format!("{root}/test.txt") }));
        let response = server.handle_line(&line).await.unwrap();
        assert_eq!(response.id, RequestId::Number(2));
        assert_eq!(text(&response), "Hello, world!");
    }

    #[tokio::test]
    async fn direct_method_form() {
        let (_dir, server, root) = fixture();
        let line = json!({
            "jsonrpc": "2.0",
            "id": "a",
            "method": "read_file",
            "params": { "path": format!("{root}/test.txt") }
        })
        .to_string();
        let response = server.handle_line(&line).await.unwrap();
        assert_eq!(response.id, RequestId::from("a"));
        assert_eq!(text(&response), "Hello, world!");
    }

    #[tokio::test]
    async fn outside_path_is_access_denied() {
        let (_dir, server, _root) = fixture();
        let outside = TempDir::new().unwrap();
        let secret = outside.path().join("secret.txt");
        std::fs::write(&secret, "nope").unwrap();

        let line = call(3, "read_file", json!({ "path": secret }));
        let response = server.handle_line(&line).await.unwrap();
        assert_eq!(response.id, RequestId::Number(3));
        assert_eq!(response.error.unwrap().code, JsonRpcError::ACCESS_DENIED);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_dir, server, root) = fixture();
        let line = call(4, "read_file", json!({ "path": format!("{root}/missing.txt") }));
        let response = server.handle_line(&line).await.unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::NOT_FOUND);
    }

    #[tokio::test]
    async fn natural_language_read() {
        let (_dir, server, root) = fixture();
        let line = format!("read the complete contents of the file '{root}/test.txt'");
        let response = server.handle_line(&line).await.unwrap();
        assert_eq!(response.id, RequestId::Null);
        assert_eq!(text(&response), "Hello, world!");

        let quoted = serde_json::to_string(&line).unwrap();
        let response = server.handle_line(&quoted).await.unwrap();
        assert_eq!(text(&response), "Hello, world!");
    }

    #[tokio::test]
    async fn unrecognized_text_is_protocol_error() {
        let (_dir, server, _root) = fixture();
        let response = server.handle_line("make me a sandwich").await.unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error() {
        let (_dir, server, _root) = fixture();
        let response = server.handle_line(r#"{"jsonrpc":"2.0","#).await.unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::PARSE_ERROR);
    }

    #[tokio::test]
    async fn unknown_method_and_tool() {
        let (_dir, server, _root) = fixture();
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":5,"method":"delete_file"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::METHOD_NOT_FOUND);

        let response = server.handle_line(&call(6, "delete_file", json!({}))).await.unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn notifications_and_blank_lines_get_no_response() {
        let (_dir, server, _root) = fixture();
        assert!(server.handle_line("   ").await.is_none());
        assert!(
            server
                .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn serve_answers_each_line_and_stops_at_eof() {
        let (_dir, server, root) = fixture();
        let (mut client, server_io) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);

        let input = format!(
            "{}\n\n{}\nnonsense\n",
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
            call(2, "write_file", json!({ "path": format!("{root}/out.txt"), "content": "hi" })),
        );

        let serve = tokio::spawn(async move {
            server
                .serve(BufReader::new(server_read), server_write)
                .await
        });

        client.write_all(input.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();

        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        serve.await.unwrap().unwrap();

        let responses: Vec<JsonRpcResponse> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].id, RequestId::Number(1));
        assert_eq!(responses[1].id, RequestId::Number(2));
        assert!(responses[2].error.is_some());
        assert_eq!(std::fs::read_to_string(format!("{root}/out.txt")).unwrap(), "hi");
    }
}
