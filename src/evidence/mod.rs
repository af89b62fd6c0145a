//! Evidence provider interface and the HTTP search client.
//!
//! The research stage only needs `query(text) -> snippets`; which news or
//! filings corpus answers the query is the endpoint's business.

mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CallResult;

pub use http::HttpEvidenceProvider;

/// A verbatim text snippet returned by an evidence query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSnippet {
    pub text: String,
    pub source: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl EvidenceSnippet {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            timestamp: None,
            url: None,
        }
    }
}

/// External source of evidence snippets. Non-deterministic and unreliable;
/// callers wrap every query in the call policy.
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    /// Search for snippets relevant to `text`, returning at most `limit`.
    async fn query(&self, text: &str, limit: usize) -> CallResult<Vec<EvidenceSnippet>>;
}
