//! Stage contract and the per-run context every stage receives.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::policy::{cutoff, CallFailure, CallPolicy, Cutoff};
use super::state::{AnalysisState, Phase, StateDelta};
use super::types::{StageName, StageStatus};
use crate::config::{PipelineConfig, StageTimeouts};
use crate::error::{AnalysisError, CallResult};
use crate::evidence::{EvidenceProvider, EvidenceSnippet};
use crate::reasoning::{parse_output, InferenceRequest, ReasoningCapability, Validate};
use crate::store::HypothesisStore;

/// How a stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Ok,
    /// Completed with a salvageable partial delta.
    Degraded(String),
    /// Contributed nothing.
    Failed(String),
}

/// A stage's delta together with its outcome. A failed report always
/// carries an empty delta.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub delta: StateDelta,
    pub outcome: StageOutcome,
    /// Individual call failures that did not sink the stage.
    pub failures: Vec<String>,
}

impl StageReport {
    pub fn ok(delta: StateDelta) -> Self {
        Self {
            delta,
            outcome: StageOutcome::Ok,
            failures: Vec::new(),
        }
    }

    pub fn degraded(delta: StateDelta, reason: impl Into<String>) -> Self {
        Self {
            delta,
            outcome: StageOutcome::Degraded(reason.into()),
            failures: Vec::new(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            delta: StateDelta::default(),
            outcome: StageOutcome::Failed(reason.into()),
            failures: Vec::new(),
        }
    }

    pub fn with_failures(mut self, failures: Vec<String>) -> Self {
        self.failures = failures;
        self
    }

    pub fn status(&self) -> StageStatus {
        match self.outcome {
            StageOutcome::Ok => StageStatus::Ok,
            StageOutcome::Degraded(_) => StageStatus::Degraded,
            StageOutcome::Failed(_) => StageStatus::Failed,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.outcome {
            StageOutcome::Ok => None,
            StageOutcome::Degraded(reason) | StageOutcome::Failed(reason) => Some(reason),
        }
    }
}

/// One orchestration unit of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    /// Aggregate budget for this stage's own work.
    fn timeout(&self, timeouts: &StageTimeouts) -> Duration;

    /// Phase the run enters once this stage's delta is committed.
    fn completes(&self) -> Phase;

    /// Run the stage against a read-only view of the state. All external
    /// waits must end by `deadline`. `Err` aborts the run.
    async fn execute(
        &self,
        state: &AnalysisState,
        ctx: &RunContext,
        deadline: Instant,
    ) -> Result<StageReport, AnalysisError>;
}

/// Everything a stage may use during one run. Built fresh per run; only the
/// provider handles are shared between runs.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub config: Arc<PipelineConfig>,
    pub policy: CallPolicy,
    pub max_snippets_per_query: usize,
    pub reasoner: Arc<dyn ReasoningCapability>,
    pub evidence: Arc<dyn EvidenceProvider>,
    pub store: Arc<dyn HypothesisStore>,
    pub cancel: CancellationToken,
    /// Wall-clock end of the run budget (before grace).
    pub run_deadline: Instant,
}

impl RunContext {
    pub fn grace(&self) -> Duration {
        self.config.cancel_grace()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the run was cancelled or ran out of budget.
    pub fn is_interrupted(&self) -> bool {
        self.is_cancelled() || Instant::now() >= self.run_deadline
    }

    /// Resolves when the stage must stop waiting (see [`cutoff`]).
    pub fn stop_at(&self, deadline: Instant) -> impl Future<Output = Cutoff> + '_ {
        cutoff(deadline, &self.cancel, self.grace())
    }

    /// Await `fut` unless the stage is cut off first.
    pub async fn within<F: Future>(&self, deadline: Instant, fut: F) -> Result<F::Output, Cutoff> {
        tokio::select! {
            output = fut => Ok(output),
            reason = self.stop_at(deadline) => Err(reason),
        }
    }

    /// One policy-governed inference whose output must parse into `T` and
    /// pass `check`. Schema failures are retried like any other call error.
    pub async fn infer_checked<T, C>(&self, request: &InferenceRequest, check: C) -> CallResult<T>
    where
        T: DeserializeOwned + Validate,
        C: Fn(&T) -> CallResult<()>,
    {
        let reasoner = &self.reasoner;
        let check = &check;
        self.policy
            .run(request.task.as_str(), move || async move {
                let value = reasoner.infer(request).await?;
                let parsed: T = parse_output(value)?;
                check(&parsed)?;
                Ok(parsed)
            })
            .await
    }

    /// [`Self::infer_checked`] without extra checks, bounded by `deadline`.
    pub async fn infer<T>(&self, deadline: Instant, request: &InferenceRequest) -> Result<T, CallFailure>
    where
        T: DeserializeOwned + Validate,
    {
        let call = self.infer_checked(request, |_: &T| Ok(()));
        Ok(self.within(deadline, call).await??)
    }

    /// One policy-governed evidence query, truncated to the per-query limit.
    pub async fn query_evidence(&self, text: &str) -> CallResult<Vec<EvidenceSnippet>> {
        let evidence = &self.evidence;
        let limit = self.max_snippets_per_query;
        let mut snippets = self
            .policy
            .run("evidence_query", move || async move { evidence.query(text, limit).await })
            .await?;
        snippets.truncate(limit);
        Ok(snippets)
    }
}
