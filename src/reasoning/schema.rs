//! Typed output schemas for each reasoning task.
//!
//! Model output is deserialized strictly and then checked for the semantic
//! constraints serde cannot express. Anything that fails either step is
//! [`CallError::MalformedOutput`]; nothing is patched up.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::analysis::types::{Direction, Strength};
use crate::error::{CallError, CallResult};

/// Output of the context (normalization) task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextOutput {
    pub processed_hypothesis: String,
    pub subject: String,
    pub direction: Direction,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub search_terms: Vec<String>,
    #[serde(default)]
    pub risk_areas: Vec<String>,
}

/// Classification of a single snippet within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Confirms,
    Contradicts,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedSnippet {
    /// Position of the snippet within the batch that was sent.
    pub index: usize,
    pub polarity: Classification,
    pub strength: Strength,
    pub reason: String,
}

/// Output of the evidence classification task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutput {
    pub items: Vec<ClassifiedSnippet>,
}

/// Output of the synthesis task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOutput {
    pub synthesis: String,
    pub recommendation: String,
}

/// Semantic checks applied after deserialization.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

impl Validate for ContextOutput {
    fn validate(&self) -> Result<(), String> {
        if self.processed_hypothesis.trim().is_empty() {
            return Err("processed_hypothesis is empty".to_string());
        }
        if self.subject.trim().is_empty() {
            return Err("subject is empty".to_string());
        }
        Ok(())
    }
}

impl Validate for ClassificationOutput {
    fn validate(&self) -> Result<(), String> {
        match self.items.iter().find(|item| item.reason.trim().is_empty()) {
            Some(item) => Err(format!("item {} has an empty reason", item.index)),
            None => Ok(()),
        }
    }
}

impl ClassificationOutput {
    /// Reject indices outside the batch that was sent.
    pub fn check_indices(&self, batch_len: usize) -> CallResult<()> {
        match self.items.iter().find(|item| item.index >= batch_len) {
            Some(item) => Err(CallError::MalformedOutput {
                message: format!(
                    "classification index {} out of range for batch of {}",
                    item.index, batch_len
                ),
            }),
            None => Ok(()),
        }
    }
}

impl Validate for SynthesisOutput {
    fn validate(&self) -> Result<(), String> {
        if self.synthesis.trim().is_empty() {
            return Err("synthesis is empty".to_string());
        }
        if self.recommendation.trim().is_empty() {
            return Err("recommendation is empty".to_string());
        }
        Ok(())
    }
}

/// Deserialize and validate structured model output.
pub fn parse_output<T>(value: serde_json::Value) -> CallResult<T>
where
    T: DeserializeOwned + Validate,
{
    let parsed: T = serde_json::from_value(value).map_err(|e| CallError::MalformedOutput {
        message: format!("schema mismatch: {}", e),
    })?;
    parsed
        .validate()
        .map_err(|message| CallError::MalformedOutput { message })?;
    Ok(parsed)
}

/// Locate the JSON document in a completion. Accepts bare JSON, the first
/// fenced block (with or without a `json` tag), or a single object wrapped
/// in prose.
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let text = completion.trim();
    if text.starts_with(&['{', '['][..]) {
        return Ok(text);
    }

    if let Some((_, opened)) = text.split_once("```") {
        let body = opened.strip_prefix("json").unwrap_or(opened);
        let body = body.split("```").next().unwrap_or(body).trim();
        if body.is_empty() {
            return Err("fenced block in completion is empty".to_string());
        }
        return Ok(body);
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(open), Some(close)) if open < close => Ok(&text[open..=close]),
        _ => Err(format!(
            "no JSON in completion: '{}'",
            text.chars().take(100).collect::<String>()
        )),
    }
}
