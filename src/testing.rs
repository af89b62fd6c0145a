//! Deterministic collaborators for exercising the pipeline without network
//! access. Used by the unit tests and the integration tests under `tests/`.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::analysis::types::{
    AnalysisResult, Mode, ResearchSummary, RunStatus, StageName, StageStatus, TraceEntry,
    SCHEMA_VERSION,
};
use crate::analysis::verdict;
use crate::error::{CallError, CallResult};
use crate::evidence::{EvidenceProvider, EvidenceSnippet};
use crate::reasoning::{InferenceRequest, ReasoningCapability, ReasoningTask};

type Script = dyn Fn(&InferenceRequest) -> CallResult<Value> + Send + Sync;

/// Reasoning capability answering from a closure.
pub struct ScriptedReasoner {
    script: Box<Script>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedReasoner {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&InferenceRequest) -> CallResult<Value> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every task with well-formed output. Snippets are classified
    /// by the keywords they contain.
    pub fn keyword(confirm: &[&str], contradict: &[&str]) -> Self {
        let confirm: Vec<String> = confirm.iter().map(|k| k.to_lowercase()).collect();
        let contradict: Vec<String> = contradict.iter().map(|k| k.to_lowercase()).collect();
        Self::new(move |request| match request.task {
            ReasoningTask::Context => Ok(context_json("Crude Oil", "bullish", &["OPEC cuts"])),
            ReasoningTask::ClassifyEvidence => {
                Ok(classify_by_keywords(&request.prompt, &confirm, &contradict))
            }
            ReasoningTask::Synthesis => Ok(synthesis_json()),
        })
    }

    /// Fails every call with a provider error.
    pub fn failing() -> Self {
        Self::new(|_| {
            Err(CallError::ProviderError {
                message: "reasoning backend unavailable".to_string(),
            })
        })
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls made for `task`, in order.
    pub fn requests_for(&self, task: ReasoningTask) -> Vec<InferenceRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|r| r.task == task)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReasoningCapability for ScriptedReasoner {
    async fn infer(&self, request: &InferenceRequest) -> CallResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.script)(request)
    }
}

/// Context task output.
pub fn context_json(subject: &str, direction: &str, search_terms: &[&str]) -> Value {
    json!({
        "processed_hypothesis": format!("{} will move {}", subject, direction),
        "subject": subject,
        "direction": direction,
        "target": null,
        "timeframe": "next quarter",
        "search_terms": search_terms,
        "risk_areas": ["demand"]
    })
}

/// Synthesis task output.
pub fn synthesis_json() -> Value {
    json!({
        "synthesis": "Supply discipline supports the thesis while demand data argues for caution.",
        "recommendation": "Scale in gradually and watch demand indicators."
    })
}

/// Classify each `[i] (source, date) text` line of a classification prompt.
/// Lines matching neither keyword list are neutral.
pub fn classify_by_keywords(prompt: &str, confirm: &[String], contradict: &[String]) -> Value {
    let items: Vec<Value> = prompt
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix('[')?;
            let (index, rest) = rest.split_once(']')?;
            let index: usize = index.parse().ok()?;
            let text = rest.to_lowercase();
            let (polarity, reason) = if contradict.iter().any(|k| text.contains(k.as_str())) {
                ("contradicts", "works against the thesis")
            } else if confirm.iter().any(|k| text.contains(k.as_str())) {
                ("confirms", "supports the thesis")
            } else {
                ("neutral", "not relevant")
            };
            let strength = if text.contains("sharply") { "Strong" } else { "Moderate" };
            Some(json!({
                "index": index,
                "polarity": polarity,
                "strength": strength,
                "reason": reason
            }))
        })
        .collect();
    json!({ "items": items })
}

/// Evidence provider serving canned snippets.
#[derive(Default)]
pub struct FixedEvidenceProvider {
    by_query: HashMap<String, Vec<EvidenceSnippet>>,
    default: Vec<EvidenceSnippet>,
    failing: bool,
    failing_queries: HashSet<String>,
    delay: Option<Duration>,
    queries: Mutex<Vec<String>>,
}

impl FixedEvidenceProvider {
    /// Answer every query with `snippets`.
    pub fn new(snippets: Vec<EvidenceSnippet>) -> Self {
        Self {
            default: snippets,
            ..Default::default()
        }
    }

    /// Fail every query with a provider error.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    /// Answer `query` (exact match) with `snippets` instead of the default.
    pub fn with_query(mut self, query: impl Into<String>, snippets: Vec<EvidenceSnippet>) -> Self {
        self.by_query.insert(query.into(), snippets);
        self
    }

    /// Fail `query` (exact match) with a provider error.
    pub fn with_failing_query(mut self, query: impl Into<String>) -> Self {
        self.failing_queries.insert(query.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queries received so far, in arrival order.
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl EvidenceProvider for FixedEvidenceProvider {
    async fn query(&self, text: &str, limit: usize) -> CallResult<Vec<EvidenceSnippet>> {
        self.queries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(text.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing || self.failing_queries.contains(text) {
            return Err(CallError::ProviderError {
                message: "evidence search unavailable".to_string(),
            });
        }
        let snippets = self.by_query.get(text).unwrap_or(&self.default);
        Ok(snippets.iter().take(limit).cloned().collect())
    }
}

/// A stored-looking result with the given confidence and no evidence.
pub fn sample_result(hypothesis_id: &str, status: RunStatus, confidence: u8) -> AnalysisResult {
    let trace = StageName::ALL
        .iter()
        .map(|stage| TraceEntry {
            stage: *stage,
            status: StageStatus::Ok,
            duration_ms: 5,
            error: None,
            failures: Vec::new(),
        })
        .collect();

    AnalysisResult {
        schema_version: SCHEMA_VERSION,
        run_id: Uuid::new_v4(),
        hypothesis_id: hypothesis_id.to_string(),
        mode: Mode::Analyze,
        status,
        processed_hypothesis: "Crude oil will rise".to_string(),
        research: ResearchSummary {
            summary: "0 evidence snippets from 1 of 1 queries".to_string(),
            notes: Vec::new(),
        },
        contradictions: Vec::new(),
        contradictions_count: 0,
        confirmations: Vec::new(),
        confirmations_count: 0,
        confidence,
        verdict: verdict(confidence).to_string(),
        synthesis: "stored synthesis".to_string(),
        recommendations: "stored recommendation".to_string(),
        low_confidence_synthesis: false,
        alerts: Vec::new(),
        trace,
        completed_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap_or_else(Utc::now),
        error: None,
    }
}
