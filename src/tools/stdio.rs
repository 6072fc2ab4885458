//! Newline-delimited JSON tool protocol
//!
//! One request per line: `{"id": ..., "tool": "...", "arguments": {...}}`.
//! Every line gets exactly one response line carrying the same `id` and
//! either a `result` or an `error` object. The special tool `list_tools`
//! returns the tool descriptors.

use super::server::ToolServer;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub const LIST_TOOLS: &str = "list_tools";

#[derive(Debug, Deserialize)]
struct ToolRequest {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct ToolResponse {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

impl ToolResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, kind: &str, message: String) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorBody {
                kind: kind.to_string(),
                message,
            }),
        }
    }

    fn from_error(id: Value, error: &Error) -> Self {
        Self::err(id, error.kind(), error.to_string())
    }
}

/// Serve requests from `reader` until EOF
pub async fn serve<R, W>(server: &ToolServer, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = handle_line(server, line).await;
        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
        writer.flush().await?;
    }
    tracing::debug!("Tool input closed");
    Ok(())
}

async fn handle_line(server: &ToolServer, line: &str) -> ToolResponse {
    let request: ToolRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "Malformed tool request");
            return ToolResponse::err(Value::Null, "invalid_request", e.to_string());
        }
    };

    if request.tool == LIST_TOOLS {
        return match serde_json::to_value(server.tools()) {
            Ok(tools) => ToolResponse::ok(request.id, tools),
            Err(e) => ToolResponse::from_error(request.id, &Error::from(e)),
        };
    }

    tracing::debug!(tool = %request.tool, "Tool call");
    match server.handle_request(&request.tool, request.arguments).await {
        Ok(result) => ToolResponse::ok(request.id, result),
        Err(e) => {
            tracing::warn!(tool = %request.tool, error = %e, "Tool call failed");
            ToolResponse::from_error(request.id, &e)
        }
    }
}
