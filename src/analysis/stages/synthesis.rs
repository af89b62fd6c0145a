use async_trait::async_trait;
use std::fmt::Write as _;
use std::time::Duration;
use tokio::time::Instant;

use crate::analysis::aggregator::{confidence_score, dedup_evidence};
use crate::analysis::stage::{RunContext, Stage, StageReport};
use crate::analysis::state::{AnalysisState, Phase, StateDelta};
use crate::analysis::types::{EvidenceItem, Polarity, StageName};
use crate::config::StageTimeouts;
use crate::error::AnalysisError;
use crate::reasoning::{InferenceRequest, ReasoningTask, SynthesisOutput};

/// Produces the narrative and recommendation from all classified evidence.
pub struct SynthesisStage;

fn write_items(prompt: &mut String, heading: &str, items: &[&EvidenceItem]) {
    let _ = writeln!(prompt, "\n{} ({}):", heading, items.len());
    if items.is_empty() {
        prompt.push_str("- none\n");
    }
    for item in items {
        let _ = writeln!(
            prompt,
            "- [{:?}] {} ({}): {}",
            item.strength, item.quote, item.source, item.reason
        );
    }
}

fn build_prompt(hypothesis: &str, items: &[EvidenceItem], confidence: u8) -> String {
    let confirmations: Vec<&EvidenceItem> = items
        .iter()
        .filter(|i| i.polarity == Polarity::Confirms)
        .collect();
    let contradictions: Vec<&EvidenceItem> = items
        .iter()
        .filter(|i| i.polarity == Polarity::Contradicts)
        .collect();

    let mut prompt = format!(
        "Hypothesis: \"{}\"\nEvidence-weighted confidence: {}%\n",
        hypothesis, confidence
    );
    write_items(&mut prompt, "Supporting evidence", &confirmations);
    write_items(&mut prompt, "Contradicting evidence", &contradictions);
    prompt
}

#[async_trait]
impl Stage for SynthesisStage {
    fn name(&self) -> StageName {
        StageName::Synthesis
    }

    fn timeout(&self, timeouts: &StageTimeouts) -> Duration {
        Duration::from_millis(timeouts.synthesis_ms)
    }

    fn completes(&self) -> Phase {
        Phase::Synthesized
    }

    async fn execute(
        &self,
        state: &AnalysisState,
        ctx: &RunContext,
        deadline: Instant,
    ) -> Result<StageReport, AnalysisError> {
        let items = dedup_evidence(&state.evidence);

        if items.is_empty() {
            return Ok(StageReport::degraded(
                StateDelta {
                    low_confidence_synthesis: true,
                    ..Default::default()
                },
                "no classified evidence to synthesize",
            ));
        }

        let confidence = confidence_score(&items, &ctx.config.scoring);
        let request = InferenceRequest::new(
            ReasoningTask::Synthesis,
            build_prompt(state.working_hypothesis(), &items, confidence),
        );

        match ctx.infer::<SynthesisOutput>(deadline, &request).await {
            Ok(output) => Ok(StageReport::ok(StateDelta {
                synthesis: Some(output.synthesis.trim().to_string()),
                recommendation: Some(output.recommendation.trim().to_string()),
                ..Default::default()
            })),
            Err(failure) => Ok(StageReport::failed(format!("synthesis failed: {}", failure))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::Strength;

    #[test]
    fn test_prompt_lists_both_sides() {
        let items = vec![
            EvidenceItem {
                quote: "OPEC+ extends cuts".into(),
                reason: "supply tightens".into(),
                source: "reuters".into(),
                strength: Strength::Moderate,
                polarity: Polarity::Confirms,
            },
        ];
        let prompt = build_prompt("Oil will rise", &items, 52);
        assert!(prompt.contains("confidence: 52%"));
        assert!(prompt.contains("Supporting evidence (1):"));
        assert!(prompt.contains("- [Moderate] OPEC+ extends cuts (reuters): supply tightens"));
        assert!(prompt.contains("Contradicting evidence (0):\n- none"));
    }
}
