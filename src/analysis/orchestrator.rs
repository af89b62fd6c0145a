//! Runs one request through the pipeline and always returns a well-formed
//! [`AnalysisResult`].

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::aggregator::aggregate;
use super::policy::{cutoff, CallPolicy};
use super::stage::{RunContext, StageReport};
use super::stages::Pipeline;
use super::state::{AnalysisState, Phase};
use super::types::{
    derive_hypothesis_id, AnalysisResult, Hypothesis, HypothesisRequest, RunStatus, StageName,
    StageStatus, TraceEntry,
};
use crate::config::{Config, PipelineConfig};
use crate::error::AnalysisError;
use crate::evidence::EvidenceProvider;
use crate::reasoning::ReasoningCapability;
use crate::store::HypothesisStore;

/// Extra wait beyond the grace window before a stage that ignores its
/// deadline is abandoned.
const BACKSTOP_SLACK: Duration = Duration::from_millis(250);

/// Owns pipeline execution. Holds only shared provider handles and
/// configuration; all per-run state lives in [`RunContext`] and
/// [`AnalysisState`].
pub struct Orchestrator {
    reasoner: Arc<dyn ReasoningCapability>,
    evidence: Arc<dyn EvidenceProvider>,
    store: Arc<dyn HypothesisStore>,
    config: Arc<PipelineConfig>,
    policy: CallPolicy,
    max_snippets_per_query: usize,
    pipeline: Pipeline,
}

impl Orchestrator {
    pub fn new(
        reasoner: Arc<dyn ReasoningCapability>,
        evidence: Arc<dyn EvidenceProvider>,
        store: Arc<dyn HypothesisStore>,
        config: PipelineConfig,
        policy: CallPolicy,
        max_snippets_per_query: usize,
    ) -> Self {
        Self {
            reasoner,
            evidence,
            store,
            config: Arc::new(config),
            policy,
            max_snippets_per_query,
            pipeline: Pipeline::standard(),
        }
    }

    /// Build from the application configuration.
    pub fn from_config(
        config: &Config,
        reasoner: Arc<dyn ReasoningCapability>,
        evidence: Arc<dyn EvidenceProvider>,
        store: Arc<dyn HypothesisStore>,
    ) -> Self {
        Self::new(
            reasoner,
            evidence,
            store,
            config.pipeline.clone(),
            CallPolicy::from_config(&config.request),
            config.evidence.max_snippets,
        )
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run without external cancellation.
    pub async fn run(&self, request: HypothesisRequest) -> AnalysisResult {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Run until completion, run timeout or cancellation of `cancel`.
    pub async fn run_with_cancel(
        &self,
        request: HypothesisRequest,
        cancel: CancellationToken,
    ) -> AnalysisResult {
        let run_id = Uuid::new_v4();
        let span = info_span!("analysis_run", run_id = %run_id, mode = request.mode.as_str());
        self.execute(run_id, request, cancel).instrument(span).await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        request: HypothesisRequest,
        cancel: CancellationToken,
    ) -> AnalysisResult {
        let started = Instant::now();
        let run_deadline = started + self.config.run_timeout();
        let grace = self.config.cancel_grace();

        let hypothesis = match Hypothesis::from_request(request.clone(), self.config.max_input_chars)
        {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "Rejected input");
                let state = AnalysisState::new(rejected_hypothesis(&request));
                return self.abort(state, run_id, Vec::new(), e);
            }
        };

        info!(hypothesis_id = %hypothesis.hypothesis_id, "Analysis run started");

        let ctx = RunContext {
            run_id,
            config: Arc::clone(&self.config),
            policy: self.policy.clone(),
            max_snippets_per_query: self.max_snippets_per_query,
            reasoner: Arc::clone(&self.reasoner),
            evidence: Arc::clone(&self.evidence),
            store: Arc::clone(&self.store),
            cancel,
            run_deadline,
        };

        let mut state = AnalysisState::new(hypothesis);
        let mut phase = Phase::Init;
        let mut interrupted: Option<AnalysisError> = None;
        let mut any_failed = false;

        for stage in self.pipeline.stages() {
            let name = stage.name();

            if interrupted.is_none() {
                interrupted = self.interruption(&ctx);
            }
            if let Some(reason) = &interrupted {
                debug!(stage = %name, reason = reason.kind(), "Stage skipped");
                state.trace.push(TraceEntry::skipped(name, reason));
                continue;
            }

            let stage_started = Instant::now();
            let stage_deadline =
                (stage_started + stage.timeout(&self.config.stage_timeouts)).min(run_deadline + grace);
            let backstop = cutoff(
                run_deadline + grace + BACKSTOP_SLACK,
                &ctx.cancel,
                grace + BACKSTOP_SLACK,
            );

            let outcome = tokio::select! {
                result = stage.execute(&state, &ctx, stage_deadline) => Some(result),
                _ = backstop => None,
            };
            let duration_ms = stage_started.elapsed().as_millis() as u64;

            let report = match outcome {
                Some(Ok(report)) => report,
                Some(Err(e)) => {
                    warn!(stage = %name, error = %e, "Unrecoverable stage error, aborting run");
                    let mut trace = std::mem::take(&mut state.trace);
                    trace.push(TraceEntry {
                        stage: name,
                        status: StageStatus::Failed,
                        duration_ms,
                        error: Some(e.to_string()),
                        failures: Vec::new(),
                    });
                    let fresh = AnalysisState::new(state.hypothesis.clone());
                    return self.abort(fresh, run_id, trace, e);
                }
                None => StageReport::failed("stage did not finish within the grace period"),
            };

            self.commit(&mut state, &mut phase, stage.completes(), name, report, duration_ms, &mut any_failed);
        }

        if interrupted.is_none() {
            interrupted = self.interruption(&ctx);
        }
        phase.advance(Phase::Finalized);

        let status = if interrupted.is_some() || any_failed {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };

        let result = aggregate(state, run_id, status, None, &self.config.scoring);

        info!(
            status = result.status.as_str(),
            confidence = result.confidence,
            interrupted = interrupted.as_ref().map(|e| e.kind()),
            latency_ms = started.elapsed().as_millis() as u64,
            "Analysis run finished"
        );

        result
    }

    /// Apply one stage report: one delta, one trace entry, one transition.
    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        state: &mut AnalysisState,
        phase: &mut Phase,
        next: Phase,
        name: StageName,
        report: StageReport,
        duration_ms: u64,
        any_failed: &mut bool,
    ) {
        let status = report.status();
        match status {
            StageStatus::Ok => debug!(stage = %name, latency_ms = duration_ms, "Stage completed"),
            _ => warn!(
                stage = %name,
                status = ?status,
                reason = report.reason().unwrap_or_default(),
                failures = report.failures.len(),
                latency_ms = duration_ms,
                "Stage did not complete cleanly"
            ),
        }

        let entry = TraceEntry {
            stage: name,
            status,
            duration_ms,
            error: report.reason().map(String::from),
            failures: report.failures,
        };

        if status == StageStatus::Failed {
            *any_failed = true;
        } else {
            state.apply(report.delta);
        }
        state.trace.push(entry);
        phase.advance(next);
    }

    fn interruption(&self, ctx: &RunContext) -> Option<AnalysisError> {
        if ctx.is_cancelled() {
            Some(AnalysisError::RunCancelled {
                reason: "cancelled by caller".to_string(),
            })
        } else if Instant::now() >= ctx.run_deadline {
            Some(AnalysisError::RunTimeout {
                budget_ms: self.config.run_timeout_ms,
            })
        } else {
            None
        }
    }

    /// Finalize as `error`: no partial content, every stage accounted for.
    fn abort(
        &self,
        mut state: AnalysisState,
        run_id: Uuid,
        mut trace: Vec<TraceEntry>,
        error: AnalysisError,
    ) -> AnalysisResult {
        let mut phase = Phase::Init;
        phase.advance(Phase::Aborted);

        for name in StageName::ALL.iter().skip(trace.len()) {
            trace.push(TraceEntry::skipped(*name, &error));
        }
        state.trace = trace;

        info!(error = %error, phase = ?phase, "Analysis run aborted");
        aggregate(
            state,
            run_id,
            RunStatus::Error,
            Some(error.to_string()),
            &self.config.scoring,
        )
    }
}

/// Best-effort hypothesis for a request that failed validation, so the
/// error result still carries a mode and id.
fn rejected_hypothesis(request: &HypothesisRequest) -> Hypothesis {
    let text = request
        .hypothesis
        .as_deref()
        .or(request.idea.as_deref())
        .unwrap_or_default()
        .trim()
        .to_string();
    let hypothesis_id = request
        .hypothesis_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| derive_hypothesis_id(&text));

    Hypothesis {
        text,
        mode: request.mode,
        context: None,
        hypothesis_id,
    }
}
