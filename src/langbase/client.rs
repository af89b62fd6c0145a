use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::types::{CreatePipeRequest, CreatePipeResponse, PipeRequest, PipeResponse};
use crate::config::{LangbaseConfig, PipeConfig, RequestConfig};
use crate::error::{LangbaseError, LangbaseResult};
use crate::prompts::{CLASSIFY_EVIDENCE_PROMPT, CONTEXT_PROMPT, SYNTHESIS_PROMPT};

/// Client for interacting with Langbase Pipes API.
///
/// Each call is a single HTTP attempt bounded by the request timeout;
/// retries and backoff belong to the orchestration call policy.
#[derive(Clone)]
pub struct LangbaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
}

impl LangbaseClient {
    /// Create a new Langbase client
    pub fn new(config: &LangbaseConfig, request_config: &RequestConfig) -> LangbaseResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LangbaseError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_ms: request_config.timeout_ms,
        })
    }

    /// POST `body` to `path` and decode the JSON answer. Non-2xx statuses
    /// become [`LangbaseError::Api`] carrying the response body.
    async fn post_json<B, T>(&self, path: &str, body: &B) -> LangbaseResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LangbaseError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    LangbaseError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LangbaseError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| LangbaseError::InvalidResponse {
                message: format!("{} returned an unexpected body: {}", path, e),
            })
    }

    /// Run a pipe once. Single attempt; the caller owns retries.
    pub async fn call_pipe(&self, request: &PipeRequest) -> LangbaseResult<PipeResponse> {
        let start = Instant::now();
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            "Calling Langbase pipe"
        );

        let response: PipeResponse = self.post_json("/v1/pipes/run", request).await?;

        debug!(
            pipe = %request.name,
            success = response.success,
            tokens = ?response.total_tokens(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Langbase pipe call returned"
        );
        Ok(response)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create or update a pipe.
    pub async fn create_pipe(
        &self,
        request: &CreatePipeRequest,
    ) -> LangbaseResult<CreatePipeResponse> {
        info!(pipe = %request.name, model = %request.model, "Upserting Langbase pipe");
        let created: CreatePipeResponse = self.post_json("/v1/pipes", request).await?;
        debug!(pipe = %created.name, url = %created.url, status = %created.status, "Pipe upserted");
        Ok(created)
    }

    /// Ensure a JSON-output pipe exists with the given system prompt.
    pub async fn ensure_pipe(
        &self,
        pipe_name: &str,
        description: &str,
        system_prompt: &str,
    ) -> LangbaseResult<()> {
        let request = CreatePipeRequest::json_pipe(pipe_name, description, system_prompt);
        match self.create_pipe(&request).await {
            Ok(_) => info!(pipe = %pipe_name, "Pipe ready"),
            // 409: created concurrently or upsert disabled on the account
            Err(LangbaseError::Api { status: 409, .. }) => {
                info!(pipe = %pipe_name, "Pipe already exists")
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Ensure every pipe the analysis pipeline calls exists.
    pub async fn ensure_pipes(&self, pipes: &PipeConfig) -> LangbaseResult<()> {
        self.ensure_pipe(
            &pipes.context,
            "Hypothesis normalization and context framing",
            CONTEXT_PROMPT,
        )
        .await?;
        self.ensure_pipe(
            &pipes.classify,
            "Evidence classification (confirms / contradicts)",
            CLASSIFY_EVIDENCE_PROMPT,
        )
        .await?;
        self.ensure_pipe(
            &pipes.synthesis,
            "Evidence synthesis and recommendation",
            SYNTHESIS_PROMPT,
        )
        .await
    }
}
