//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! This module provides the core MCP server implementation including:
//! - JSON-RPC 2.0 request/response handling
//! - Tool definitions and schemas
//! - Stdio-based server communication with concurrent, cancellable tool calls

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{handle_tool_call, SharedState, ANALYZE_TOOL, PRIOR_RESULT_TOOL};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// Protocol revision advertised in the initialize handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// One inbound JSON-RPC 2.0 message. `id` is absent for notifications.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Outbound JSON-RPC 2.0 message; exactly one of `result` and `error` is set.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// `null` when the request could not be parsed.
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct Capabilities {
    pub tools: ToolCapabilities,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCapabilities {
    pub list_changed: bool,
}

/// Answer to `initialize`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: Capabilities,
    pub server_info: ServerInfo,
}

/// Tool advertised by `tools/list`, with a JSON Schema for its arguments.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Parameters of a `notifications/cancelled` notification.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    pub request_id: Value,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Text content item of a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub content: Vec<ToolResultContent>,
    /// Set only when the tool itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// In-flight tool calls keyed by their serialized request id.
type InFlight = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// MCP Server running over stdio.
///
/// Tool calls run as separate tasks so a long analysis never blocks
/// `ping`, `notifications/cancelled` or other calls. Responses are written
/// by a single writer task in completion order.
pub struct McpServer {
    state: SharedState,
    in_flight: InFlight,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self {
            state,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run the server using async stdio
    pub async fn run(&self) -> std::io::Result<()> {
        info!("MCP Hypothesis Analysis Server starting...");
        let reader = BufReader::new(tokio::io::stdin());
        self.serve(reader, tokio::io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC from `reader`, writing responses to
    /// `writer`. Returns after EOF once every in-flight call has answered.
    pub async fn serve<R, W>(&self, mut reader: R, writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer_task = tokio::spawn(write_responses(writer, rx));
        let mut calls = JoinSet::new();
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            // EOF reached
            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            while calls.try_join_next().is_some() {}

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            let request = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => request,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    let _ = tx.send(JsonRpcResponse::error(
                        None,
                        -32700,
                        format!("Parse error: {}", e),
                    ));
                    continue;
                }
            };

            if request.method == "tools/call" {
                self.spawn_tool_call(&mut calls, request, tx.clone()).await;
            } else if let Some(response) = self.handle_request(request).await {
                let _ = tx.send(response);
            }
        }

        let pending = {
            let runs = self.in_flight.lock().await;
            for token in runs.values() {
                token.cancel();
            }
            runs.len()
        };
        if pending > 0 {
            info!(pending, "Cancelled in-flight tool calls on disconnect");
        }

        while calls.join_next().await.is_some() {}
        drop(tx);

        match writer_task.await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
        }
    }

    /// Run a tool call in its own task, registered for cancellation.
    async fn spawn_tool_call(
        &self,
        calls: &mut JoinSet<()>,
        request: JsonRpcRequest,
        tx: mpsc::UnboundedSender<JsonRpcResponse>,
    ) {
        let cancel = CancellationToken::new();
        let key = request.id.as_ref().map(request_key);
        if let Some(key) = &key {
            let mut runs = self.in_flight.lock().await;
            if runs.contains_key(key) {
                warn!(request_id = %key, "Rejecting tool call that reuses an in-flight id");
                let _ = tx.send(JsonRpcResponse::error(
                    request.id,
                    -32600,
                    format!("Invalid Request: id {} is already in flight", key),
                ));
                return;
            }
            runs.insert(key.clone(), cancel.clone());
        }

        let state = Arc::clone(&self.state);
        let in_flight = Arc::clone(&self.in_flight);

        calls.spawn(async move {
            let response = tool_call(&state, request.id, request.params, cancel).await;
            if let Some(key) = key {
                in_flight.lock().await.remove(&key);
            }
            let _ = tx.send(response);
        });
    }

    /// Handle a single non-tool JSON-RPC request
    /// Returns None for notifications (requests without id) per JSON-RPC 2.0 spec
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" | "notifications/initialized" => {
                debug!("Received initialized notification");
                None
            }
            "notifications/cancelled" => {
                self.handle_cancelled(request.params).await;
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                // For unknown methods, only respond if it's a request (has id)
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    /// Cancel the in-flight call named by a `notifications/cancelled`.
    async fn handle_cancelled(&self, params: Option<Value>) {
        let parsed = params.map(serde_json::from_value::<CancelledParams>);
        let params = match parsed {
            Some(Ok(p)) => p,
            _ => {
                warn!("Ignoring malformed cancellation notification");
                return;
            }
        };

        let key = request_key(&params.request_id);
        match self.in_flight.lock().await.get(&key) {
            Some(token) => {
                info!(
                    request_id = %key,
                    reason = params.reason.as_deref().unwrap_or("unspecified"),
                    "Cancelling tool call"
                );
                token.cancel();
            }
            None => debug!(request_id = %key, "Cancellation for unknown or finished request"),
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "mcp-hypothesis-analysis".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }

    /// Handle tools/list request
    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling tools/list request");

        JsonRpcResponse::success(
            id,
            serde_json::json!({
                "tools": all_tools()
            }),
        )
    }
}

/// Serialized form of a JSON-RPC id, so `1` and `"1"` stay distinct.
fn request_key(id: &Value) -> String {
    id.to_string()
}

/// Handle tools/call request
async fn tool_call(
    state: &SharedState,
    id: Option<Value>,
    params: Option<Value>,
    cancel: CancellationToken,
) -> JsonRpcResponse {
    let params: ToolCallParams = match params {
        Some(p) => match serde_json::from_value(p) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e));
            }
        },
        None => {
            return JsonRpcResponse::error(id, -32602, "Missing params");
        }
    };

    info!(tool = %params.name, "Handling tool call");

    let (content, is_error) =
        match handle_tool_call(state, &params.name, params.arguments, cancel).await {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result).unwrap_or_else(|e| {
                    error!(error = %e, "Failed to serialize tool result");
                    format!("{{\"error\": \"Serialization failed: {}\"}}", e)
                });
                (
                    ToolResultContent {
                        content_type: "text".to_string(),
                        text,
                    },
                    None,
                )
            }
            Err(e) => (
                ToolResultContent {
                    content_type: "text".to_string(),
                    text: format!("Error: {}", e),
                },
                Some(true),
            ),
        };

    let tool_result = ToolCallResult {
        content: vec![content],
        is_error,
    };

    match serde_json::to_value(tool_result) {
        Ok(val) => JsonRpcResponse::success(id, val),
        Err(e) => {
            error!(error = %e, "Failed to serialize tool call result");
            JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
        }
    }
}

/// Drain the response channel into `writer`, one JSON document per line.
async fn write_responses<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let response_json = serde_json::to_string(&response)?;
        debug!(response = %response_json, "Sending response");

        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Every tool this server exposes.
pub fn all_tools() -> Vec<Tool> {
    vec![get_analyze_tool(), get_prior_result_tool()]
}

/// Get the hypothesis analysis tool definition
fn get_analyze_tool() -> Tool {
    Tool {
        name: ANALYZE_TOOL.to_string(),
        description: "Run a trading hypothesis through context, research, contradiction/confirmation, synthesis and alert stages. Returns confirmations, contradictions, a 0-100 confidence score, a synthesis, recommendations and alerts. Always returns a result; status is success, partial or error.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "mode": {
                    "type": "string",
                    "enum": ["analyze", "refine", "generate"],
                    "default": "analyze",
                    "description": "analyze a stated hypothesis, refine a loose idea, or generate one from context"
                },
                "hypothesis": {
                    "type": "string",
                    "description": "Hypothesis text (required for analyze)"
                },
                "idea": {
                    "type": "string",
                    "description": "Loose idea to refine (refine mode; falls back to hypothesis)"
                },
                "context": {
                    "type": "object",
                    "description": "Optional structured context such as sectors, timeframe or risk tolerance"
                },
                "hypothesis_id": {
                    "type": "string",
                    "description": "Stable id for trend comparison; derived from the text when omitted"
                }
            },
            "additionalProperties": false
        }),
    }
}

/// Get the prior result lookup tool definition
fn get_prior_result_tool() -> Tool {
    Tool {
        name: PRIOR_RESULT_TOOL.to_string(),
        description: "Return the most recent stored non-error analysis result for a hypothesis.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "hypothesis_id": {
                    "type": "string",
                    "description": "Id returned by hypothesis_analyze"
                },
                "hypothesis": {
                    "type": "string",
                    "description": "Hypothesis text; the id is derived from it when hypothesis_id is omitted"
                }
            },
            "additionalProperties": false
        }),
    }
}
