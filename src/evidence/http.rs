use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{EvidenceProvider, EvidenceSnippet};
use crate::config::{EvidenceConfig, RequestConfig};
use crate::error::{CallResult, EvidenceError, EvidenceResult};

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<EvidenceSnippet>,
}

/// Evidence provider backed by a JSON search endpoint (`POST {base}/search`).
#[derive(Clone)]
pub struct HttpEvidenceProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout_ms: u64,
}

impl HttpEvidenceProvider {
    /// Create a new evidence client
    pub fn new(config: &EvidenceConfig, request_config: &RequestConfig) -> EvidenceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(EvidenceError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_ms: request_config.timeout_ms,
        })
    }

    /// Run one search request.
    pub async fn search(&self, text: &str, limit: usize) -> EvidenceResult<Vec<EvidenceSnippet>> {
        let url = format!("{}/search", self.base_url);
        let start = Instant::now();

        let mut request = self
            .client
            .post(&url)
            .json(&SearchRequest { query: text, limit });
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EvidenceError::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            } else {
                EvidenceError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(EvidenceError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let body: SearchResponse =
            response
                .json()
                .await
                .map_err(|e| EvidenceError::InvalidResponse {
                    message: format!("Failed to parse search response: {}", e),
                })?;

        let mut results: Vec<EvidenceSnippet> = body
            .results
            .into_iter()
            .filter(|s| !s.text.trim().is_empty())
            .collect();
        results.truncate(limit);

        debug!(
            query = %text,
            snippets = results.len(),
            latency_ms = start.elapsed().as_millis(),
            "Evidence search succeeded"
        );

        Ok(results)
    }
}

#[async_trait]
impl EvidenceProvider for HttpEvidenceProvider {
    async fn query(&self, text: &str, limit: usize) -> CallResult<Vec<EvidenceSnippet>> {
        Ok(self.search(text, limit).await?)
    }
}
