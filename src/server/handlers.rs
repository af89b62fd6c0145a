use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::SharedState;
use crate::analysis::types::derive_hypothesis_id;
use crate::analysis::HypothesisRequest;
use crate::error::{McpError, McpResult};

/// Tool that runs the analysis pipeline.
pub const ANALYZE_TOOL: &str = "hypothesis_analyze";
/// Tool that reads the latest stored result for a hypothesis.
pub const PRIOR_RESULT_TOOL: &str = "hypothesis_prior_result";

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
    cancel: CancellationToken,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        ANALYZE_TOOL => handle_analyze(state, arguments, cancel).await,
        PRIOR_RESULT_TOOL => handle_prior_result(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

/// Run one analysis and save the result. A failed save is logged and does
/// not change what the caller receives.
async fn handle_analyze(
    state: &SharedState,
    arguments: Option<Value>,
    cancel: CancellationToken,
) -> McpResult<Value> {
    let request: HypothesisRequest = parse_arguments(ANALYZE_TOOL, arguments)?;
    let result = state.orchestrator.run_with_cancel(request, cancel).await;

    if let Err(e) = state.store.save_result(&result).await {
        warn!(run_id = %result.run_id, error = %e, "Failed to save analysis result");
    }

    serde_json::to_value(result).map_err(McpError::Json)
}

#[derive(Debug, Deserialize)]
struct PriorResultParams {
    #[serde(default)]
    hypothesis_id: Option<String>,
    #[serde(default)]
    hypothesis: Option<String>,
}

async fn handle_prior_result(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: PriorResultParams = parse_arguments(PRIOR_RESULT_TOOL, arguments)?;

    let hypothesis_id = match (params.hypothesis_id, params.hypothesis) {
        (Some(id), _) if !id.trim().is_empty() => id,
        (_, Some(text)) if !text.trim().is_empty() => derive_hypothesis_id(&text),
        _ => {
            return Err(McpError::InvalidParameters {
                tool_name: PRIOR_RESULT_TOOL.to_string(),
                message: "Either hypothesis_id or hypothesis is required".to_string(),
            })
        }
    };

    let prior = state
        .store
        .get_prior_result(&hypothesis_id)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    Ok(json!({
        "hypothesis_id": hypothesis_id,
        "found": prior.is_some(),
        "result": prior,
    }))
}

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}
