use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::analysis::policy::{fan_out, Cutoff};
use crate::analysis::stage::{RunContext, Stage, StageReport};
use crate::analysis::state::{AnalysisState, Phase, StateDelta};
use crate::analysis::types::{Direction, StageName, StructuredStatement};
use crate::config::StageTimeouts;
use crate::error::AnalysisError;

/// Issues evidence queries in parallel and merges the snippets into
/// research notes in query-issue order.
pub struct ResearchStage;

/// Queries for a hypothesis: the statement itself, the context's search
/// terms, then contradiction-seeking queries on the subject. Case-insensitive
/// duplicates are dropped and the list is capped at `max_queries`.
pub fn derive_queries(
    processed: &str,
    statement: Option<&StructuredStatement>,
    max_queries: usize,
) -> Vec<String> {
    let mut candidates = vec![processed.to_string()];

    if let Some(statement) = statement {
        candidates.extend(statement.search_terms.iter().cloned());

        let subject = statement.subject.trim();
        if !subject.is_empty() {
            candidates.push(format!("{} risks", subject));
            let opposing = match statement.direction {
                Direction::Bearish => "bullish",
                Direction::Bullish | Direction::Neutral => "bearish",
            };
            candidates.push(format!("{} {} outlook", subject, opposing));
        }
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .take(max_queries)
        .collect()
}

#[async_trait]
impl Stage for ResearchStage {
    fn name(&self) -> StageName {
        StageName::Research
    }

    fn timeout(&self, timeouts: &StageTimeouts) -> Duration {
        Duration::from_millis(timeouts.research_ms)
    }

    fn completes(&self) -> Phase {
        Phase::ResearchDone
    }

    async fn execute(
        &self,
        state: &AnalysisState,
        ctx: &RunContext,
        deadline: Instant,
    ) -> Result<StageReport, AnalysisError> {
        let queries = derive_queries(
            state.working_hypothesis(),
            state.statement.as_ref(),
            ctx.config.max_queries,
        );
        if queries.is_empty() {
            return Ok(StageReport::failed("no research queries could be derived"));
        }

        let out = fan_out(
            queries.clone(),
            ctx.config.max_concurrency,
            ctx.stop_at(deadline),
            move |_, query: String| async move { ctx.query_evidence(&query).await },
        )
        .await;

        let mut notes = Vec::new();
        let mut seen = HashSet::new();
        let mut failures = Vec::new();
        let mut succeeded = 0;

        for (query, slot) in queries.iter().zip(out.slots) {
            match slot {
                Some(Ok(snippets)) => {
                    succeeded += 1;
                    for snippet in snippets {
                        if seen.insert((snippet.source.clone(), snippet.text.clone())) {
                            notes.push(snippet);
                        }
                    }
                }
                Some(Err(e)) => failures.push(format!("query '{}': {}", query, e)),
                None => failures.push(format!(
                    "query '{}': {}",
                    query,
                    out.cutoff.unwrap_or(Cutoff::Deadline)
                )),
            }
        }

        debug!(
            run_id = %ctx.run_id,
            queries = queries.len(),
            succeeded,
            notes = notes.len(),
            "Research fan-out finished"
        );

        if succeeded == 0 {
            return Ok(
                StageReport::failed(format!("all {} evidence queries failed", queries.len()))
                    .with_failures(failures),
            );
        }

        let delta = StateDelta {
            research_summary: Some(format!(
                "{} evidence snippets from {} of {} queries",
                notes.len(),
                succeeded,
                queries.len()
            )),
            research_notes: notes,
            ..Default::default()
        };

        if failures.is_empty() {
            Ok(StageReport::ok(delta))
        } else {
            let reason = format!("{} of {} evidence queries failed", failures.len(), queries.len());
            Ok(StageReport::degraded(delta, reason).with_failures(failures))
        }
    }
}
