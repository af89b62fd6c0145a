//! Reasoning capability interface and its Langbase implementation.

pub mod schema;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::config::PipeConfig;
use crate::error::{CallError, CallResult};
use crate::langbase::{LangbaseClient, Message, PipeRequest};
use crate::prompts::{CLASSIFY_EVIDENCE_PROMPT, CONTEXT_PROMPT, SYNTHESIS_PROMPT};

pub use schema::{
    parse_output, Classification, ClassificationOutput, ClassifiedSnippet, ContextOutput,
    SynthesisOutput, Validate,
};

/// Which output schema an inference is expected to satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningTask {
    Context,
    ClassifyEvidence,
    Synthesis,
}

impl ReasoningTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningTask::Context => "context",
            ReasoningTask::ClassifyEvidence => "classify_evidence",
            ReasoningTask::Synthesis => "synthesis",
        }
    }
}

/// One inference: the task selects the schema, the prompt carries the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub task: ReasoningTask,
    pub prompt: String,
}

impl InferenceRequest {
    pub fn new(task: ReasoningTask, prompt: impl Into<String>) -> Self {
        Self {
            task,
            prompt: prompt.into(),
        }
    }
}

/// Opaque text-generation capability returning structured JSON.
///
/// Implementations perform a single attempt; timeouts and retries are the
/// call policy's job.
#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    async fn infer(&self, request: &InferenceRequest) -> CallResult<serde_json::Value>;
}

/// Reasoning capability backed by three Langbase pipes.
#[derive(Clone)]
pub struct LangbaseReasoner {
    client: LangbaseClient,
    pipes: PipeConfig,
}

impl LangbaseReasoner {
    pub fn new(client: LangbaseClient, pipes: PipeConfig) -> Self {
        Self { client, pipes }
    }

    fn pipe_for(&self, task: ReasoningTask) -> (&str, &'static str) {
        match task {
            ReasoningTask::Context => (&self.pipes.context, CONTEXT_PROMPT),
            ReasoningTask::ClassifyEvidence => (&self.pipes.classify, CLASSIFY_EVIDENCE_PROMPT),
            ReasoningTask::Synthesis => (&self.pipes.synthesis, SYNTHESIS_PROMPT),
        }
    }
}

#[async_trait]
impl ReasoningCapability for LangbaseReasoner {
    async fn infer(&self, request: &InferenceRequest) -> CallResult<serde_json::Value> {
        let (pipe, system_prompt) = self.pipe_for(request.task);
        let start = Instant::now();

        let pipe_request = PipeRequest::new(
            pipe,
            vec![
                Message::system(system_prompt),
                Message::user(request.prompt.clone()),
            ],
        )
        .with_variable("task", request.task.as_str());

        let response = self.client.call_pipe(&pipe_request).await?;

        if !response.success {
            return Err(CallError::ProviderError {
                message: format!("pipe {} reported success=false", pipe),
            });
        }

        let json_str = schema::extract_json_from_completion(&response.completion)
            .map_err(|message| CallError::MalformedOutput { message })?;
        let value = serde_json::from_str(json_str).map_err(|e| CallError::MalformedOutput {
            message: format!("completion is not valid JSON: {}", e),
        })?;

        debug!(
            task = request.task.as_str(),
            pipe = %pipe,
            tokens = ?response.total_tokens(),
            latency_ms = start.elapsed().as_millis(),
            "Inference completed"
        );

        Ok(value)
    }
}
