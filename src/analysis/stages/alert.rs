use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::analysis::aggregator::{confidence_score, dedup_evidence};
use crate::analysis::stage::{RunContext, Stage, StageReport};
use crate::analysis::state::{AnalysisState, Phase, StateDelta};
use crate::analysis::types::{
    Alert, AlertPriority, AlertType, AnalysisResult, EvidenceItem, Polarity, StageName, Strength,
};
use crate::config::{AlertThresholds, StageTimeouts};
use crate::error::AnalysisError;

/// Rule-based alerts from counts, confidence and the trend against the
/// prior stored result. Makes no reasoning call.
pub struct AlertStage;

/// Apply the alert rules. `items` must already be deduplicated.
pub fn evaluate_alerts(
    confidence: u8,
    items: &[EvidenceItem],
    prior: Option<&AnalysisResult>,
    thresholds: &AlertThresholds,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if confidence < thresholds.low_confidence {
        let message = match prior {
            Some(p) if p.confidence >= thresholds.low_confidence => {
                format!("Confidence dropped below {}%", thresholds.low_confidence)
            }
            _ => format!("Confidence is below {}%", thresholds.low_confidence),
        };
        alerts.push(Alert::new(message, AlertType::Warning, AlertPriority::High));
    }

    if let Some(p) = prior {
        let change = i16::from(confidence) - i16::from(p.confidence);
        let delta = i16::from(thresholds.trend_delta.max(1));
        if change <= -delta {
            alerts.push(Alert::new(
                format!(
                    "Confidence fell {} points since the previous analysis ({}% -> {}%)",
                    -change, p.confidence, confidence
                ),
                AlertType::Warning,
                AlertPriority::High,
            ));
        } else if change >= delta {
            alerts.push(Alert::new(
                format!(
                    "Confidence rose {} points since the previous analysis ({}% -> {}%)",
                    change, p.confidence, confidence
                ),
                AlertType::Trigger,
                AlertPriority::Low,
            ));
        }
    }

    let known: HashSet<(&str, &str)> = prior
        .map(|p| {
            p.contradictions
                .iter()
                .map(|c| (c.source.as_str(), c.quote.as_str()))
                .collect()
        })
        .unwrap_or_default();

    for item in items {
        if item.polarity == Polarity::Contradicts
            && item.strength == Strength::Strong
            && !known.contains(&(item.source.as_str(), item.quote.as_str()))
        {
            alerts.push(Alert::new(
                format!("New strong contradiction found: {} ({})", item.reason, item.source),
                AlertType::Warning,
                AlertPriority::High,
            ));
        }
    }

    if confidence >= thresholds.high_confidence {
        alerts.push(Alert::new(
            format!(
                "Confidence at {}%: conditions support considering an entry",
                confidence
            ),
            AlertType::Recommendation,
            AlertPriority::Medium,
        ));
    }

    if items.is_empty() {
        alerts.push(Alert::new(
            "No classified evidence; the analysis is inconclusive",
            AlertType::Warning,
            AlertPriority::Medium,
        ));
    }

    alerts
}

#[async_trait]
impl Stage for AlertStage {
    fn name(&self) -> StageName {
        StageName::Alert
    }

    fn timeout(&self, timeouts: &StageTimeouts) -> Duration {
        Duration::from_millis(timeouts.alert_ms)
    }

    fn completes(&self) -> Phase {
        Phase::Finalized
    }

    async fn execute(
        &self,
        state: &AnalysisState,
        ctx: &RunContext,
        deadline: Instant,
    ) -> Result<StageReport, AnalysisError> {
        let items = dedup_evidence(&state.evidence);
        let confidence = confidence_score(&items, &ctx.config.scoring);

        let lookup = ctx
            .within(
                deadline,
                ctx.store.get_prior_result(&state.hypothesis.hypothesis_id),
            )
            .await;

        let (prior, lookup_error) = match lookup {
            Ok(Ok(prior)) => (prior, None),
            Ok(Err(e)) => (None, Some(format!("prior result lookup failed: {}", e))),
            Err(cutoff) => (None, Some(format!("prior result lookup failed: {}", cutoff))),
        };

        let alerts = evaluate_alerts(confidence, &items, prior.as_ref(), &ctx.config.alerts);
        let delta = StateDelta {
            alerts,
            ..Default::default()
        };

        match lookup_error {
            None => Ok(StageReport::ok(delta)),
            Some(reason) => {
                warn!(run_id = %ctx.run_id, error = %reason, "Alerts computed without trend");
                Ok(StageReport::degraded(delta, reason))
            }
        }
    }
}
