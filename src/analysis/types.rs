//! Data model for one analysis run: request, hypothesis, evidence items,
//! alerts, trace entries and the terminal result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::evidence::EvidenceSnippet;

/// Version of the [`AnalysisResult`] JSON contract.
pub const SCHEMA_VERSION: u32 = 1;

/// Fallback used whenever synthesis or recommendation text is unavailable.
pub const INSUFFICIENT_EVIDENCE: &str = "insufficient evidence";

/// Declared intent of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Structure and test a hypothesis the caller wrote.
    #[default]
    Analyze,
    /// Turn a loose idea into a formal hypothesis, then test it.
    Refine,
    /// Propose a hypothesis from the request context, then test it.
    Generate,
}

impl Mode {
    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Analyze => "analyze",
            Mode::Refine => "refine",
            Mode::Generate => "generate",
        }
    }
}

/// Inbound analysis request, as received from a tool call or the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HypothesisRequest {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub hypothesis: Option<String>,
    #[serde(default)]
    pub idea: Option<String>,
    /// Optional structured context (sectors, timeframe, risk tolerance, ...).
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub hypothesis_id: Option<String>,
}

impl HypothesisRequest {
    /// Convenience constructor for an `analyze` request.
    pub fn analyze(hypothesis: impl Into<String>) -> Self {
        Self {
            mode: Mode::Analyze,
            hypothesis: Some(hypothesis.into()),
            ..Default::default()
        }
    }
}

/// Validated, immutable input of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Raw text as supplied (hypothesis or idea). Empty only in `generate` mode.
    pub text: String,
    pub mode: Mode,
    pub context: Option<serde_json::Value>,
    pub hypothesis_id: String,
}

impl Hypothesis {
    /// Validate a request. Every rejection is [`AnalysisError::UnrecoverableInput`].
    pub fn from_request(
        request: HypothesisRequest,
        max_input_chars: usize,
    ) -> Result<Self, AnalysisError> {
        let unrecoverable = |reason: String| AnalysisError::UnrecoverableInput { reason };

        let non_empty = |value: Option<String>| {
            value
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let text = match request.mode {
            Mode::Analyze => non_empty(request.hypothesis)
                .ok_or_else(|| unrecoverable("hypothesis is required in analyze mode".into()))?,
            Mode::Refine => non_empty(request.idea)
                .or_else(|| non_empty(request.hypothesis))
                .ok_or_else(|| unrecoverable("idea is required in refine mode".into()))?,
            Mode::Generate => non_empty(request.hypothesis)
                .or_else(|| non_empty(request.idea))
                .unwrap_or_default(),
        };

        let chars = text.chars().count();
        if chars > max_input_chars {
            return Err(unrecoverable(format!(
                "input is {} characters, limit is {}",
                chars, max_input_chars
            )));
        }
        if !text.is_empty() && !text.chars().any(char::is_alphanumeric) {
            return Err(unrecoverable(
                "input contains no alphanumeric characters".into(),
            ));
        }

        let context = match request.context {
            None | Some(serde_json::Value::Null) => None,
            Some(value @ serde_json::Value::Object(_)) => Some(value),
            Some(_) => return Err(unrecoverable("context must be a JSON object".into())),
        };

        let hypothesis_id = match non_empty(request.hypothesis_id) {
            Some(id) => id,
            None if text.is_empty() => derive_hypothesis_id(&format!(
                "generate:{}",
                context.as_ref().map(|c| c.to_string()).unwrap_or_default()
            )),
            None => derive_hypothesis_id(&text),
        };

        Ok(Self {
            text,
            mode: request.mode,
            context,
            hypothesis_id,
        })
    }
}

/// Stable id for a hypothesis text: UUID v5 over the whitespace-normalized,
/// lower-cased text. Re-running the same hypothesis finds its prior result.
pub fn derive_hypothesis_id(text: &str) -> String {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    Uuid::new_v5(&Uuid::NAMESPACE_OID, normalized.as_bytes()).to_string()
}

/// Directional bias of a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

/// Structured statement produced by the context stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredStatement {
    pub subject: String,
    pub direction: Direction,
    pub target: Option<String>,
    pub timeframe: Option<String>,
    pub search_terms: Vec<String>,
    pub risk_areas: Vec<String>,
}

/// How strongly an item bears on the hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strength {
    Strong,
    #[serde(alias = "Medium")]
    Moderate,
    Weak,
}

impl Strength {
    /// Ordering used when deduplicating: higher wins.
    pub fn rank(&self) -> u8 {
        match self {
            Strength::Strong => 3,
            Strength::Moderate => 2,
            Strength::Weak => 1,
        }
    }
}

/// Whether an item supports or opposes the hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Confirms,
    Contradicts,
}

/// One classified piece of evidence. The quote is always the verbatim
/// research snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub quote: String,
    pub reason: String,
    pub source: String,
    pub strength: Strength,
    pub polarity: Polarity,
}

/// Alert category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Recommendation,
    Warning,
    Trigger,
}

/// Alert urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    High,
    Medium,
    Low,
}

/// An actionable alert emitted by the alert stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub message: String,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
}

impl Alert {
    pub fn new(message: impl Into<String>, alert_type: AlertType, priority: AlertPriority) -> Self {
        Self {
            message: message.into(),
            alert_type,
            priority,
        }
    }
}

/// Pipeline stages in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Context,
    Research,
    ContradictionConfirmation,
    Synthesis,
    Alert,
}

impl StageName {
    /// All stages, in the order the pipeline runs them.
    pub const ALL: [StageName; 5] = [
        StageName::Context,
        StageName::Research,
        StageName::ContradictionConfirmation,
        StageName::Synthesis,
        StageName::Alert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Context => "context",
            StageName::Research => "research",
            StageName::ContradictionConfirmation => "contradiction_confirmation",
            StageName::Synthesis => "synthesis",
            StageName::Alert => "alert",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage status recorded in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Ok,
    Degraded,
    Failed,
    /// Never ran because the run timed out, was cancelled or aborted.
    Skipped,
}

/// One entry of the stage trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub stage: StageName,
    pub status: StageStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Individual call failures inside a fan-out stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

impl TraceEntry {
    pub fn skipped(stage: StageName, reason: &AnalysisError) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            duration_ms: 0,
            error: Some(reason.kind().to_string()),
            failures: Vec::new(),
        }
    }
}

/// Completeness of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Error => "error",
        }
    }
}

/// Research section of the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchSummary {
    pub summary: String,
    pub notes: Vec<EvidenceSnippet>,
}

/// Terminal artifact of a run. Built once by the aggregator and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub hypothesis_id: String,
    pub mode: Mode,
    pub status: RunStatus,
    pub processed_hypothesis: String,
    pub research: ResearchSummary,
    pub contradictions: Vec<EvidenceItem>,
    pub contradictions_count: usize,
    pub confirmations: Vec<EvidenceItem>,
    pub confirmations_count: usize,
    pub confidence: u8,
    pub verdict: String,
    pub synthesis: String,
    pub recommendations: String,
    pub low_confidence_synthesis: bool,
    pub alerts: Vec<Alert>,
    pub trace: Vec<TraceEntry>,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
