//! Hypothesis store: prior results for trend comparison.
//!
//! The orchestrator only reads through [`HypothesisStore::get_prior_result`];
//! saving is done by the caller once a run has returned.

mod sqlite;

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::analysis::types::{AnalysisResult, RunStatus};
use crate::error::StorageResult;

pub use sqlite::SqliteHypothesisStore;

/// Persistence collaborator for analysis results.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HypothesisStore: Send + Sync {
    /// Most recent result for `hypothesis_id` whose status is not `error`.
    async fn get_prior_result(&self, hypothesis_id: &str) -> StorageResult<Option<AnalysisResult>>;

    /// Append a result. Results are never updated in place.
    async fn save_result(&self, result: &AnalysisResult) -> StorageResult<()>;
}

/// Process-local store, used by tests and by the CLI when no database is wanted.
#[derive(Debug, Default)]
pub struct InMemoryHypothesisStore {
    results: RwLock<HashMap<String, Vec<AnalysisResult>>>,
}

impl InMemoryHypothesisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of results stored for `hypothesis_id`, error results included.
    pub async fn count(&self, hypothesis_id: &str) -> usize {
        self.results
            .read()
            .await
            .get(hypothesis_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl HypothesisStore for InMemoryHypothesisStore {
    async fn get_prior_result(&self, hypothesis_id: &str) -> StorageResult<Option<AnalysisResult>> {
        Ok(self.results.read().await.get(hypothesis_id).and_then(|list| {
            list.iter()
                .rev()
                .find(|r| r.status != RunStatus::Error)
                .cloned()
        }))
    }

    async fn save_result(&self, result: &AnalysisResult) -> StorageResult<()> {
        self.results
            .write()
            .await
            .entry(result.hypothesis_id.clone())
            .or_default()
            .push(result.clone());
        Ok(())
    }
}
