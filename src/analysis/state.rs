//! Mutable per-run accumulator and the additive deltas stages produce.

use serde::{Deserialize, Serialize};

use super::types::{
    Alert, EvidenceItem, Hypothesis, Polarity, StructuredStatement, TraceEntry,
};
use crate::evidence::EvidenceSnippet;

/// Orchestrator phases. Strictly forward; `Aborted` only from `Init`/`ContextDone`
/// on unrecoverable input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    ContextDone,
    ResearchDone,
    EvidenceClassified,
    Synthesized,
    Finalized,
    Aborted,
}

impl Phase {
    fn ordinal(&self) -> u8 {
        match self {
            Phase::Init => 0,
            Phase::ContextDone => 1,
            Phase::ResearchDone => 2,
            Phase::EvidenceClassified => 3,
            Phase::Synthesized => 4,
            Phase::Finalized => 5,
            Phase::Aborted => 6,
        }
    }

    /// Whether the run has reached a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Finalized | Phase::Aborted)
    }

    /// Move to `next` if it is strictly later and the run is not terminal.
    pub fn advance(&mut self, next: Phase) -> bool {
        if self.is_terminal() || next.ordinal() <= self.ordinal() {
            return false;
        }
        *self = next;
        true
    }
}

/// Additive contribution of one stage. Applying a delta never removes or
/// overwrites anything already committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub processed_hypothesis: Option<String>,
    pub statement: Option<StructuredStatement>,
    pub research_notes: Vec<EvidenceSnippet>,
    pub research_summary: Option<String>,
    /// Classified items in classification order, both polarities.
    pub evidence: Vec<EvidenceItem>,
    pub synthesis: Option<String>,
    pub recommendation: Option<String>,
    pub low_confidence_synthesis: bool,
    pub alerts: Vec<Alert>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        *self == StateDelta::default()
    }
}

/// Accumulated state of one run. Owned and written only by the orchestrator.
#[derive(Debug, Clone)]
pub struct AnalysisState {
    pub hypothesis: Hypothesis,
    pub processed_hypothesis: Option<String>,
    pub statement: Option<StructuredStatement>,
    pub research_notes: Vec<EvidenceSnippet>,
    pub research_summary: Option<String>,
    pub evidence: Vec<EvidenceItem>,
    pub synthesis: Option<String>,
    pub recommendation: Option<String>,
    pub low_confidence_synthesis: bool,
    pub alerts: Vec<Alert>,
    pub trace: Vec<TraceEntry>,
}

impl AnalysisState {
    pub fn new(hypothesis: Hypothesis) -> Self {
        Self {
            hypothesis,
            processed_hypothesis: None,
            statement: None,
            research_notes: Vec::new(),
            research_summary: None,
            evidence: Vec::new(),
            synthesis: None,
            recommendation: None,
            low_confidence_synthesis: false,
            alerts: Vec::new(),
            trace: Vec::new(),
        }
    }

    /// Commit a stage delta. Scalar fields are only set once.
    pub fn apply(&mut self, delta: StateDelta) {
        fn set_once<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }

        set_once(&mut self.processed_hypothesis, delta.processed_hypothesis);
        set_once(&mut self.statement, delta.statement);
        set_once(&mut self.research_summary, delta.research_summary);
        set_once(&mut self.synthesis, delta.synthesis);
        set_once(&mut self.recommendation, delta.recommendation);
        self.research_notes.extend(delta.research_notes);
        self.evidence.extend(delta.evidence);
        self.alerts.extend(delta.alerts);
        self.low_confidence_synthesis |= delta.low_confidence_synthesis;
    }

    /// Text the later stages reason about: the normalized statement when the
    /// context stage produced one, the raw input otherwise.
    pub fn working_hypothesis(&self) -> &str {
        self.processed_hypothesis
            .as_deref()
            .unwrap_or(&self.hypothesis.text)
    }

    pub fn items(&self, polarity: Polarity) -> impl Iterator<Item = &EvidenceItem> {
        self.evidence.iter().filter(move |i| i.polarity == polarity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::{HypothesisRequest, Strength};

    fn state() -> AnalysisState {
        let h = Hypothesis::from_request(HypothesisRequest::analyze("Oil will rise"), 100)
            .unwrap();
        AnalysisState::new(h)
    }

    #[test]
    fn test_phase_is_strictly_forward() {
        let mut phase = Phase::Init;
        assert!(phase.advance(Phase::ContextDone));
        assert!(!phase.advance(Phase::Init));
        assert!(!phase.advance(Phase::ContextDone));
        assert!(phase.advance(Phase::Finalized));
        assert!(!phase.advance(Phase::Aborted));
        assert!(phase.is_terminal());
    }

    #[test]
    fn test_apply_never_retracts() {
        let mut s = state();
        s.apply(StateDelta {
            processed_hypothesis: Some("Crude oil > $100".into()),
            research_notes: vec![EvidenceSnippet::new("a", "wire")],
            ..Default::default()
        });
        s.apply(StateDelta {
            processed_hypothesis: Some("overwritten?".into()),
            research_notes: vec![EvidenceSnippet::new("b", "wire")],
            ..Default::default()
        });
        assert_eq!(s.working_hypothesis(), "Crude oil > $100");
        assert_eq!(s.research_notes.len(), 2);

        s.apply(StateDelta::default());
        assert_eq!(s.research_notes.len(), 2);
    }

    #[test]
    fn test_working_hypothesis_falls_back_to_raw_text() {
        let s = state();
        assert_eq!(s.working_hypothesis(), "Oil will rise");
    }

    #[test]
    fn test_items_filters_by_polarity() {
        let mut s = state();
        let item = |polarity| EvidenceItem {
            quote: "q".into(),
            reason: "r".into(),
            source: "s".into(),
            strength: Strength::Weak,
            polarity,
        };
        s.apply(StateDelta {
            evidence: vec![item(Polarity::Confirms), item(Polarity::Contradicts)],
            ..Default::default()
        });
        assert_eq!(s.items(Polarity::Confirms).count(), 1);
        assert_eq!(s.items(Polarity::Contradicts).count(), 1);
    }
}
