use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::analysis::stage::{RunContext, Stage, StageReport};
use crate::analysis::state::{AnalysisState, Phase, StateDelta};
use crate::analysis::types::{Hypothesis, Mode, StageName, StructuredStatement};
use crate::config::StageTimeouts;
use crate::error::AnalysisError;
use crate::prompts::{ANALYZE_INSTRUCTION, GENERATE_INSTRUCTION, REFINE_INSTRUCTION};
use crate::reasoning::{ContextOutput, InferenceRequest, ReasoningTask};

/// Normalizes the raw input into a structured statement.
pub struct ContextStage;

fn build_prompt(hypothesis: &Hypothesis) -> String {
    let mut prompt = match hypothesis.mode {
        Mode::Analyze => format!("{}\n\nHypothesis: \"{}\"", ANALYZE_INSTRUCTION, hypothesis.text),
        Mode::Refine => format!("{}\n\nIdea: \"{}\"", REFINE_INSTRUCTION, hypothesis.text),
        Mode::Generate if hypothesis.text.is_empty() => GENERATE_INSTRUCTION.to_string(),
        Mode::Generate => format!("{}\n\nSeed idea: \"{}\"", GENERATE_INSTRUCTION, hypothesis.text),
    };

    if let Some(context) = &hypothesis.context {
        let rendered =
            serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
        prompt.push_str("\n\nContext:\n");
        prompt.push_str(&rendered);
    }

    prompt
}

fn clean_terms(terms: Vec<String>) -> Vec<String> {
    terms
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn statement_from(output: ContextOutput) -> (String, StructuredStatement) {
    let statement = StructuredStatement {
        subject: output.subject.trim().to_string(),
        direction: output.direction,
        target: output.target.filter(|t| !t.trim().is_empty()),
        timeframe: output.timeframe.filter(|t| !t.trim().is_empty()),
        search_terms: clean_terms(output.search_terms),
        risk_areas: clean_terms(output.risk_areas),
    };
    (output.processed_hypothesis.trim().to_string(), statement)
}

#[async_trait]
impl Stage for ContextStage {
    fn name(&self) -> StageName {
        StageName::Context
    }

    fn timeout(&self, timeouts: &StageTimeouts) -> Duration {
        Duration::from_millis(timeouts.context_ms)
    }

    fn completes(&self) -> Phase {
        Phase::ContextDone
    }

    async fn execute(
        &self,
        state: &AnalysisState,
        ctx: &RunContext,
        deadline: Instant,
    ) -> Result<StageReport, AnalysisError> {
        let hypothesis = &state.hypothesis;
        let request = InferenceRequest::new(ReasoningTask::Context, build_prompt(hypothesis));

        match ctx.infer::<ContextOutput>(deadline, &request).await {
            Ok(output) => {
                let (processed, statement) = statement_from(output);
                Ok(StageReport::ok(StateDelta {
                    processed_hypothesis: Some(processed),
                    statement: Some(statement),
                    ..Default::default()
                }))
            }
            // Nothing to fall back on in generate mode without seed text.
            Err(failure) if hypothesis.text.is_empty() => {
                if ctx.is_interrupted() {
                    Ok(StageReport::failed(failure.to_string()))
                } else {
                    Err(AnalysisError::UnrecoverableInput {
                        reason: format!("could not generate a hypothesis: {}", failure),
                    })
                }
            }
            Err(failure) => {
                warn!(run_id = %ctx.run_id, error = %failure, "Normalization failed, using raw text");
                Ok(StageReport::degraded(
                    StateDelta {
                        processed_hypothesis: Some(hypothesis.text.clone()),
                        ..Default::default()
                    },
                    format!("normalization failed, using raw text: {}", failure),
                ))
            }
        }
    }
}
