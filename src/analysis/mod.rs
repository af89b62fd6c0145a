//! Hypothesis analysis pipeline.
//!
//! A run moves one [`AnalysisState`] through five stages in fixed order:
//! context, research, contradiction/confirmation, synthesis and alert.
//! Stages return additive [`StateDelta`]s that only the [`Orchestrator`]
//! commits, and the [`aggregator`] turns the final state into an
//! [`AnalysisResult`].

pub mod aggregator;
pub mod orchestrator;
pub mod policy;
pub mod stage;
pub mod stages;
pub mod state;
pub mod types;

pub use aggregator::{aggregate, confidence_score, dedup_evidence, verdict};
pub use orchestrator::Orchestrator;
pub use policy::{CallPolicy, Cutoff};
pub use stage::{RunContext, Stage, StageOutcome, StageReport};
pub use stages::Pipeline;
pub use state::{AnalysisState, Phase, StateDelta};
pub use types::{
    AnalysisResult, EvidenceItem, Hypothesis, HypothesisRequest, Mode, Polarity, RunStatus,
    StageName, StageStatus, Strength, TraceEntry,
};
