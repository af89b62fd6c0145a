//! Result aggregation: deduplication, confidence scoring, normalization.

use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

use super::state::AnalysisState;
use super::types::{
    AnalysisResult, EvidenceItem, Polarity, ResearchSummary, RunStatus, Strength,
    INSUFFICIENT_EVIDENCE, SCHEMA_VERSION,
};
use crate::config::ScoringWeights;

/// Weight contributed by one item of the given strength.
pub fn weight(strength: Strength, weights: &ScoringWeights) -> i32 {
    match strength {
        Strength::Strong => weights.strong,
        Strength::Moderate => weights.moderate,
        Strength::Weak => weights.weak,
    }
}

/// Collapse items with identical (source, quote). The higher strength wins;
/// on ties the first seen is kept. The kept item stays at the position of
/// the first occurrence and keeps its own polarity.
pub fn dedup_evidence(items: &[EvidenceItem]) -> Vec<EvidenceItem> {
    let mut kept: Vec<EvidenceItem> = Vec::with_capacity(items.len());
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();

    for item in items {
        match index.get(&(item.source.as_str(), item.quote.as_str())) {
            Some(&pos) => {
                if item.strength.rank() > kept[pos].strength.rank() {
                    kept[pos] = item.clone();
                }
            }
            None => {
                index.insert((item.source.as_str(), item.quote.as_str()), kept.len());
                kept.push(item.clone());
            }
        }
    }

    kept
}

/// `clamp(baseline + Σ confirmations − Σ contradictions, 0, 100)`.
///
/// Order-independent, so identical item sets always score the same.
pub fn confidence_score(items: &[EvidenceItem], weights: &ScoringWeights) -> u8 {
    let delta: i64 = items
        .iter()
        .map(|item| {
            let w = i64::from(weight(item.strength, weights));
            match item.polarity {
                Polarity::Confirms => w,
                Polarity::Contradicts => -w,
            }
        })
        .sum();

    (i64::from(weights.baseline) + delta).clamp(0, 100) as u8
}

/// Human-readable band for a confidence value.
pub fn verdict(confidence: u8) -> &'static str {
    match confidence {
        70..=u8::MAX => "Consider Position",
        50..=69 => "Monitor Closely",
        30..=49 => "Exercise Caution",
        _ => "Avoid or Wait",
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

/// Build the terminal result from the final state.
pub fn aggregate(
    state: AnalysisState,
    run_id: Uuid,
    status: RunStatus,
    error: Option<String>,
    weights: &ScoringWeights,
) -> AnalysisResult {
    let items = dedup_evidence(&state.evidence);
    let confidence = confidence_score(&items, weights);
    let (confirmations, contradictions): (Vec<_>, Vec<_>) = items
        .into_iter()
        .partition(|item| item.polarity == Polarity::Confirms);

    let synthesis = non_empty(state.synthesis);
    let recommendations = non_empty(state.recommendation);
    let low_confidence_synthesis = state.low_confidence_synthesis || synthesis.is_none();

    let summary = non_empty(state.research_summary).unwrap_or_else(|| {
        if state.research_notes.is_empty() {
            "No research notes were collected".to_string()
        } else {
            format!("{} evidence snippets collected", state.research_notes.len())
        }
    });

    let processed_hypothesis = state
        .processed_hypothesis
        .unwrap_or_else(|| state.hypothesis.text.clone());

    AnalysisResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        hypothesis_id: state.hypothesis.hypothesis_id,
        mode: state.hypothesis.mode,
        status,
        processed_hypothesis,
        research: ResearchSummary {
            summary,
            notes: state.research_notes,
        },
        contradictions_count: contradictions.len(),
        contradictions,
        confirmations_count: confirmations.len(),
        confirmations,
        confidence,
        verdict: verdict(confidence).to_string(),
        synthesis: synthesis.unwrap_or_else(|| INSUFFICIENT_EVIDENCE.to_string()),
        recommendations: recommendations.unwrap_or_else(|| INSUFFICIENT_EVIDENCE.to_string()),
        low_confidence_synthesis,
        alerts: state.alerts,
        trace: state.trace,
        completed_at: Utc::now(),
        error,
    }
}
