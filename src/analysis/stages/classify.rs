use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::analysis::policy::{fan_out, Cutoff};
use crate::analysis::stage::{RunContext, Stage, StageReport};
use crate::analysis::state::{AnalysisState, Phase, StateDelta};
use crate::analysis::types::{EvidenceItem, Polarity, StageName};
use crate::config::StageTimeouts;
use crate::error::{AnalysisError, CallError};
use crate::evidence::EvidenceSnippet;
use crate::reasoning::{Classification, ClassificationOutput, InferenceRequest, ReasoningTask};

/// Contradiction/confirmation extraction: classifies research notes in
/// concurrent batches.
pub struct ClassifyStage;

fn build_prompt(hypothesis: &str, batch: &[EvidenceSnippet]) -> String {
    let mut prompt = format!("Hypothesis: \"{}\"\n\nSnippets:\n", hypothesis);
    for (index, snippet) in batch.iter().enumerate() {
        let date = snippet
            .timestamp
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string());
        let _ = writeln!(
            prompt,
            "[{}] ({}, {}) {}",
            index, snippet.source, date, snippet.text
        );
    }
    prompt
}

/// Map a validated classification back onto the batch. Quotes and sources
/// come from the snippets; neutral and repeated indices are dropped.
fn to_items(output: ClassificationOutput, batch: &[EvidenceSnippet]) -> Vec<EvidenceItem> {
    let mut classified = output.items;
    classified.sort_by_key(|c| c.index);

    let mut seen = HashSet::new();
    classified
        .into_iter()
        .filter(|c| seen.insert(c.index))
        .filter_map(|c| {
            let polarity = match c.polarity {
                Classification::Confirms => Polarity::Confirms,
                Classification::Contradicts => Polarity::Contradicts,
                Classification::Neutral => return None,
            };
            let snippet = batch.get(c.index)?;
            Some(EvidenceItem {
                quote: snippet.text.clone(),
                reason: c.reason.trim().to_string(),
                source: snippet.source.clone(),
                strength: c.strength,
                polarity,
            })
        })
        .collect()
}

#[async_trait]
impl Stage for ClassifyStage {
    fn name(&self) -> StageName {
        StageName::ContradictionConfirmation
    }

    fn timeout(&self, timeouts: &StageTimeouts) -> Duration {
        Duration::from_millis(timeouts.classify_ms)
    }

    fn completes(&self) -> Phase {
        Phase::EvidenceClassified
    }

    async fn execute(
        &self,
        state: &AnalysisState,
        ctx: &RunContext,
        deadline: Instant,
    ) -> Result<StageReport, AnalysisError> {
        if state.research_notes.is_empty() {
            return Ok(StageReport::ok(StateDelta::default()));
        }

        let hypothesis = state.working_hypothesis();
        let batches: Vec<&[EvidenceSnippet]> = state
            .research_notes
            .chunks(ctx.config.classify_batch_size.max(1))
            .collect();
        let total = batches.len();

        let out = fan_out(
            batches.clone(),
            ctx.config.max_concurrency,
            ctx.stop_at(deadline),
            move |_, batch| async move {
                let request = InferenceRequest::new(
                    ReasoningTask::ClassifyEvidence,
                    build_prompt(hypothesis, batch),
                );
                let len = batch.len();
                let output = ctx
                    .infer_checked(&request, move |o: &ClassificationOutput| {
                        o.check_indices(len)
                    })
                    .await?;
                Ok::<_, CallError>(to_items(output, batch))
            },
        )
        .await;

        let mut evidence = Vec::new();
        let mut failures = Vec::new();
        let mut succeeded = 0;

        for (number, slot) in out.slots.into_iter().enumerate() {
            match slot {
                Some(Ok(items)) => {
                    succeeded += 1;
                    evidence.extend(items);
                }
                Some(Err(e)) => failures.push(format!("batch {}: {}", number, e)),
                None => failures.push(format!(
                    "batch {}: {}",
                    number,
                    out.cutoff.unwrap_or(Cutoff::Deadline)
                )),
            }
        }

        debug!(
            run_id = %ctx.run_id,
            batches = total,
            succeeded,
            items = evidence.len(),
            "Classification fan-out finished"
        );

        if succeeded == 0 {
            return Ok(
                StageReport::failed(format!("all {} classification batches failed", total))
                    .with_failures(failures),
            );
        }

        let delta = StateDelta {
            evidence,
            ..Default::default()
        };

        if failures.is_empty() {
            Ok(StageReport::ok(delta))
        } else {
            let reason = format!("{} of {} classification batches failed", failures.len(), total);
            Ok(StageReport::degraded(delta, reason).with_failures(failures))
        }
    }
}
