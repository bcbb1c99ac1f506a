//! Filesystem operation handlers.
//!
//! Each handler resolves its path through the sandbox before touching disk.

use mcp::CallToolResult;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::fs;

use crate::error::{FsError, FsResult};
use crate::sandbox::Sandbox;

#[derive(Debug, Deserialize)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteFileArgs {
    pub path: String,
    pub content: String,
}

/// Decode tool arguments, treating a missing object as empty.
pub fn parse_args<T: DeserializeOwned>(arguments: Option<Value>) -> FsResult<T> {
    let value = arguments.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(value).map_err(|e| FsError::InvalidParams(e.to_string()))
}

pub fn list_allowed_directories(sandbox: &Sandbox) -> CallToolResult {
    let roots = sandbox
        .roots()
        .iter()
        .map(|root| root.display().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    CallToolResult::text(format!("Allowed directories:\n{roots}"))
}

pub async fn read_file(sandbox: &Sandbox, args: PathArgs) -> FsResult<CallToolResult> {
    let canonical = sandbox.resolve_existing(&args.path)?;
    if canonical.is_dir() {
        return Err(FsError::InvalidPath(format!(
            "{} is a directory",
            canonical.display()
        )));
    }

    let bytes = fs::read(&canonical).await?;
    tracing::debug!(path = %canonical.display(), bytes = bytes.len(), "read file");

    Ok(CallToolResult::text(String::from_utf8_lossy(&bytes).into_owned()))
}

pub async fn write_file(sandbox: &Sandbox, args: WriteFileArgs) -> FsResult<CallToolResult> {
    let target = sandbox.resolve_for_write(&args.path)?;
    if target.is_dir() {
        return Err(FsError::InvalidPath(format!(
            "{} is a directory",
            target.display()
        )));
    }

    fs::write(&target, args.content.as_bytes()).await?;
    tracing::debug!(path = %target.display(), bytes = args.content.len(), "wrote file");

    Ok(CallToolResult::text(format!(
        "Successfully wrote to {}",
        target.display()
    )))
}

/// Entries of a directory, one per line, prefixed `[DIR]` or `[FILE]` and
/// sorted by name.
pub async fn list_directory(sandbox: &Sandbox, args: PathArgs) -> FsResult<CallToolResult> {
    let canonical = sandbox.resolve_existing(&args.path)?;
    if !canonical.is_dir() {
        return Err(FsError::InvalidPath(format!(
            "{} is not a directory",
            canonical.display()
        )));
    }

    let mut entries = Vec::new();
    let mut reader = fs::read_dir(&canonical).await?;
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().await?.is_dir();
        entries.push((name, is_dir));
    }
    entries.sort();

    let listing = entries
        .into_iter()
        .map(|(name, is_dir)| {
            let prefix = if is_dir { "[DIR]" } else { "[FILE]" };
            format!("{prefix} {name}")
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(CallToolResult::text(listing))
}
