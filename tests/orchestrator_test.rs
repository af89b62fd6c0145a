//! End-to-end pipeline tests against deterministic fake providers
//!
//! Every run here goes through the real orchestrator, stages and aggregator;
//! only the reasoning capability, evidence provider and store are fakes.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use mcp_hypothesis_analysis::analysis::types::{derive_hypothesis_id, INSUFFICIENT_EVIDENCE};
use mcp_hypothesis_analysis::analysis::{
    confidence_score, dedup_evidence, CallPolicy, EvidenceItem, HypothesisRequest, Mode,
    Orchestrator, Polarity, RunStatus, StageName, StageStatus, Strength,
};
use mcp_hypothesis_analysis::config::PipelineConfig;
use mcp_hypothesis_analysis::evidence::{EvidenceProvider, EvidenceSnippet};
use mcp_hypothesis_analysis::reasoning::{ReasoningCapability, ReasoningTask};
use mcp_hypothesis_analysis::store::{HypothesisStore, InMemoryHypothesisStore};
use mcp_hypothesis_analysis::testing::{
    classify_by_keywords, context_json, sample_result, synthesis_json, FixedEvidenceProvider,
    ScriptedReasoner,
};

const OIL: &str = "Oil will exceed $85 by March";

fn fast_policy() -> CallPolicy {
    CallPolicy {
        call_timeout: Duration::from_secs(5),
        max_retries: 2,
        retry_delay: Duration::from_millis(1),
    }
}

fn orchestrator_with(
    reasoner: Arc<dyn ReasoningCapability>,
    evidence: Arc<dyn EvidenceProvider>,
    store: Arc<dyn HypothesisStore>,
    config: PipelineConfig,
) -> Orchestrator {
    Orchestrator::new(reasoner, evidence, store, config, fast_policy(), 5)
}

fn orchestrator(
    reasoner: Arc<dyn ReasoningCapability>,
    evidence: Arc<dyn EvidenceProvider>,
) -> Orchestrator {
    orchestrator_with(
        reasoner,
        evidence,
        Arc::new(InMemoryHypothesisStore::new()),
        PipelineConfig::default(),
    )
}

fn oil_snippets() -> Vec<EvidenceSnippet> {
    vec![
        EvidenceSnippet::new("OPEC+ cuts output sharply through Q1", "reuters"),
        EvidenceSnippet::new("US inventories build sharply into a glut", "eia"),
    ]
}

fn oil_reasoner() -> Arc<ScriptedReasoner> {
    Arc::new(ScriptedReasoner::keyword(&["cuts"], &["glut"]))
}

fn stages(result: &mcp_hypothesis_analysis::analysis::AnalysisResult) -> Vec<StageName> {
    result.trace.iter().map(|t| t.stage).collect()
}

fn statuses(result: &mcp_hypothesis_analysis::analysis::AnalysisResult) -> Vec<StageStatus> {
    result.trace.iter().map(|t| t.status).collect()
}

mod success_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_healthy_providers_yield_success() {
        let evidence = Arc::new(FixedEvidenceProvider::new(oil_snippets()));
        let result = orchestrator(oil_reasoner(), evidence)
            .run(HypothesisRequest::analyze(OIL))
            .await;

        assert_eq!(result.status, RunStatus::Success);
        assert!(result.confidence <= 100);
        assert!(result.error.is_none());
        assert_eq!(result.processed_hypothesis, "Crude Oil will move bullish");
        assert_eq!(result.hypothesis_id, derive_hypothesis_id(OIL));
        assert_eq!(
            result.synthesis.as_str(),
            synthesis_json()["synthesis"].as_str().unwrap()
        );
        assert!(!result.low_confidence_synthesis);
        assert!(result.trace.iter().all(|t| t.status == StageStatus::Ok));
    }

    #[tokio::test]
    async fn test_oil_scenario_balances_to_baseline() {
        let evidence = Arc::new(FixedEvidenceProvider::new(oil_snippets()));
        let result = orchestrator(oil_reasoner(), evidence)
            .run(HypothesisRequest::analyze(OIL))
            .await;

        assert_eq!(result.confidence, 50);
        assert_eq!(result.confirmations_count, 1);
        assert_eq!(result.confirmations.len(), 1);
        assert_eq!(result.contradictions_count, 1);
        assert_eq!(result.contradictions.len(), 1);
        assert_eq!(result.confirmations[0].source, "reuters");
        assert_eq!(result.confirmations[0].strength, Strength::Strong);
        assert_eq!(result.contradictions[0].source, "eia");
        assert_eq!(result.contradictions[0].strength, Strength::Strong);
        // Every query returned both snippets; research keeps one copy each.
        assert_eq!(result.research.notes.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_evidence_falls_back_to_insufficient_evidence() {
        let reasoner = oil_reasoner();
        let evidence = Arc::new(FixedEvidenceProvider::new(Vec::new()));
        let result = orchestrator(reasoner.clone(), evidence)
            .run(HypothesisRequest::analyze(OIL))
            .await;

        assert_eq!(result.confidence, 50);
        assert_eq!(result.synthesis, INSUFFICIENT_EVIDENCE);
        assert_eq!(result.recommendations, INSUFFICIENT_EVIDENCE);
        assert!(result.low_confidence_synthesis);
        assert!(result.confirmations.is_empty());
        assert!(result.contradictions.is_empty());
        assert!(reasoner.requests_for(ReasoningTask::Synthesis).is_empty());
        assert!(reasoner.requests_for(ReasoningTask::ClassifyEvidence).is_empty());

        let synthesis = &result.trace[3];
        assert_eq!(synthesis.stage, StageName::Synthesis);
        assert_eq!(synthesis.status, StageStatus::Degraded);
        assert!(result
            .alerts
            .iter()
            .any(|a| a.message.contains("inconclusive")));
    }

    #[tokio::test]
    async fn test_refine_mode_uses_idea() {
        let reasoner = oil_reasoner();
        let evidence = Arc::new(FixedEvidenceProvider::new(oil_snippets()));
        let result = orchestrator(reasoner.clone(), evidence)
            .run(HypothesisRequest {
                mode: Mode::Refine,
                idea: Some("oil looks tight".into()),
                ..Default::default()
            })
            .await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.mode, Mode::Refine);
        let context_calls = reasoner.requests_for(ReasoningTask::Context);
        assert_eq!(context_calls.len(), 1);
        assert!(context_calls[0].prompt.contains("oil looks tight"));
    }
}

mod determinism_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_identical_runs_score_identically() {
        let evidence = Arc::new(FixedEvidenceProvider::new(oil_snippets()));
        let orchestrator = orchestrator(oil_reasoner(), evidence);

        let first = orchestrator.run(HypothesisRequest::analyze(OIL)).await;
        let second = orchestrator.run(HypothesisRequest::analyze(OIL)).await;

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(first.confirmations, second.confirmations);
        assert_eq!(first.contradictions, second.contradictions);
        assert_eq!(first.research.notes, second.research.notes);
    }

    #[tokio::test]
    async fn test_rescoring_result_items_reproduces_confidence() {
        let evidence = Arc::new(FixedEvidenceProvider::new(oil_snippets()));
        let orchestrator = orchestrator(oil_reasoner(), evidence);
        let result = orchestrator.run(HypothesisRequest::analyze(OIL)).await;

        let items: Vec<EvidenceItem> = result
            .confirmations
            .iter()
            .chain(result.contradictions.iter())
            .cloned()
            .collect();
        let weights = &orchestrator.config().scoring;
        assert_eq!(confidence_score(&items, weights), result.confidence);
        assert_eq!(confidence_score(&items, weights), confidence_score(&items, weights));
    }

    #[tokio::test]
    async fn test_more_strong_confirmations_never_lower_confidence() {
        let mut previous = 0;
        for supporting in 0..5 {
            let mut snippets: Vec<EvidenceSnippet> = (0..supporting)
                .map(|i| EvidenceSnippet::new(format!("OPEC cuts sharply, report {}", i), "wire"))
                .collect();
            snippets.push(EvidenceSnippet::new("Demand glut builds sharply", "eia"));

            let evidence = Arc::new(FixedEvidenceProvider::new(snippets));
            let result = orchestrator(oil_reasoner(), evidence)
                .run(HypothesisRequest::analyze(OIL))
                .await;

            assert_eq!(result.confirmations_count, supporting);
            assert!(
                result.confidence >= previous,
                "{} confirmations scored {} after {}",
                supporting,
                result.confidence,
                previous
            );
            previous = result.confidence;
        }
    }

    #[test]
    fn test_dedup_keeps_higher_strength() {
        let item = |strength| EvidenceItem {
            quote: "OPEC+ cuts output".into(),
            reason: "supply".into(),
            source: "reuters".into(),
            strength,
            polarity: Polarity::Confirms,
        };
        let deduped = dedup_evidence(&[
            item(Strength::Weak),
            item(Strength::Strong),
            item(Strength::Moderate),
        ]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].strength, Strength::Strong);
    }
}

mod ordering_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_trace_follows_stage_order() {
        let evidence = Arc::new(
            FixedEvidenceProvider::new(oil_snippets()).with_delay(Duration::from_millis(5)),
        );
        let result = orchestrator(oil_reasoner(), evidence)
            .run(HypothesisRequest::analyze(OIL))
            .await;
        assert_eq!(stages(&result), StageName::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_research_notes_follow_query_order() {
        let evidence = Arc::new(
            FixedEvidenceProvider::new(Vec::new())
                .with_query(
                    "Crude Oil bearish outlook",
                    vec![EvidenceSnippet::new("fourth", "d")],
                )
                .with_query("Crude Oil risks", vec![EvidenceSnippet::new("third", "c")])
                .with_query("OPEC cuts", vec![EvidenceSnippet::new("second", "b")])
                .with_query(
                    "Crude Oil will move bullish",
                    vec![EvidenceSnippet::new("first", "a")],
                ),
        );
        let result = orchestrator(oil_reasoner(), evidence.clone())
            .run(HypothesisRequest::analyze(OIL))
            .await;

        let notes: Vec<&str> = result.research.notes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(notes, vec!["first", "second", "third", "fourth"]);

        let mut queries = evidence.queries();
        queries.sort();
        assert_eq!(
            queries,
            vec![
                "Crude Oil bearish outlook",
                "Crude Oil risks",
                "Crude Oil will move bullish",
                "OPEC cuts",
            ]
        );
    }

    #[tokio::test]
    async fn test_classification_runs_in_batches() {
        let reasoner = oil_reasoner();
        let snippets = (0..10)
            .map(|i| EvidenceSnippet::new(format!("OPEC cuts again, day {}", i), "wire"))
            .collect();
        let evidence = Arc::new(FixedEvidenceProvider::new(snippets));
        let config = PipelineConfig {
            classify_batch_size: 3,
            ..Default::default()
        };
        let store = Arc::new(InMemoryHypothesisStore::new());
        let result = orchestrator_with(reasoner.clone(), evidence, store, config)
            .run(HypothesisRequest::analyze(OIL))
            .await;

        // Five snippets per query after the per-query limit, deduplicated.
        assert_eq!(result.research.notes.len(), 5);
        assert_eq!(reasoner.requests_for(ReasoningTask::ClassifyEvidence).len(), 2);
        assert_eq!(result.confirmations_count, 5);
    }
}

mod degradation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_evidence_outage_still_finalizes() {
        let evidence = Arc::new(FixedEvidenceProvider::failing());
        let result = orchestrator(oil_reasoner(), evidence)
            .run(HypothesisRequest::analyze(OIL))
            .await;

        assert_eq!(result.status, RunStatus::Partial);
        assert!(result.confirmations.is_empty());
        assert!(result.contradictions.is_empty());
        assert_eq!(result.confidence, 50);
        assert_eq!(stages(&result), StageName::ALL.to_vec());

        let research = &result.trace[1];
        assert_eq!(research.status, StageStatus::Failed);
        assert_eq!(research.failures.len(), 4);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["contradictions"], json!([]));
        assert_eq!(json["confirmations"], json!([]));
    }

    #[tokio::test]
    async fn test_context_failure_uses_raw_text() {
        let reasoner = Arc::new(ScriptedReasoner::new(|request| match request.task {
            ReasoningTask::Context => Ok(json!({"unexpected": true})),
            ReasoningTask::ClassifyEvidence => Ok(classify_by_keywords(
                &request.prompt,
                &["cuts".to_string()],
                &[],
            )),
            ReasoningTask::Synthesis => Ok(synthesis_json()),
        }));
        let evidence = Arc::new(FixedEvidenceProvider::new(oil_snippets()));
        let result = orchestrator(reasoner.clone(), evidence.clone())
            .run(HypothesisRequest::analyze(OIL))
            .await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.processed_hypothesis, OIL);
        assert_eq!(result.trace[0].status, StageStatus::Degraded);
        // Malformed context output is retried before falling back.
        assert_eq!(reasoner.requests_for(ReasoningTask::Context).len(), 3);
        assert_eq!(evidence.queries(), vec![OIL.to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_classification_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let reasoner = Arc::new(ScriptedReasoner::new(move |request| match request.task {
            ReasoningTask::Context => Ok(context_json("Crude Oil", "bullish", &["OPEC cuts"])),
            ReasoningTask::ClassifyEvidence => {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(json!({"items": "not a list"}))
                } else {
                    Ok(classify_by_keywords(
                        &request.prompt,
                        &["cuts".to_string()],
                        &["glut".to_string()],
                    ))
                }
            }
            ReasoningTask::Synthesis => Ok(synthesis_json()),
        }));
        let evidence = Arc::new(FixedEvidenceProvider::new(oil_snippets()));
        let result = orchestrator(reasoner.clone(), evidence)
            .run(HypothesisRequest::analyze(OIL))
            .await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(result.confirmations_count, 1);
        assert_eq!(result.contradictions_count, 1);
    }

    #[tokio::test]
    async fn test_classification_outage_marks_stage_failed() {
        let reasoner = Arc::new(ScriptedReasoner::new(|request| match request.task {
            ReasoningTask::Context => Ok(context_json("Crude Oil", "bullish", &[])),
            ReasoningTask::ClassifyEvidence => {
                Err(mcp_hypothesis_analysis::error::CallError::ProviderError {
                    message: "overloaded".into(),
                })
            }
            ReasoningTask::Synthesis => Ok(synthesis_json()),
        }));
        let evidence = Arc::new(FixedEvidenceProvider::new(oil_snippets()));
        let result = orchestrator(reasoner, evidence)
            .run(HypothesisRequest::analyze(OIL))
            .await;

        assert_eq!(result.status, RunStatus::Partial);
        assert_eq!(result.trace[2].status, StageStatus::Failed);
        assert!(result.confirmations.is_empty());
        assert_eq!(result.synthesis, INSUFFICIENT_EVIDENCE);
    }

    #[tokio::test]
    async fn test_one_failed_query_degrades_research() {
        let evidence = Arc::new(
            FixedEvidenceProvider::new(Vec::new())
                .with_query(
                    "Crude Oil will move bullish",
                    vec![EvidenceSnippet::new("OPEC+ cuts output sharply", "reuters")],
                )
                .with_query(
                    "OPEC cuts",
                    vec![EvidenceSnippet::new("Saudi cuts extended", "ft")],
                )
                .with_query(
                    "Crude Oil bearish outlook",
                    vec![EvidenceSnippet::new("Inventories build into a glut", "eia")],
                )
                .with_failing_query("Crude Oil risks"),
        );
        let result = orchestrator(oil_reasoner(), evidence.clone())
            .run(HypothesisRequest::analyze(OIL))
            .await;

        assert_eq!(result.status, RunStatus::Success);
        let research = &result.trace[1];
        assert_eq!(research.stage, StageName::Research);
        assert_eq!(research.status, StageStatus::Degraded);
        assert_eq!(research.failures.len(), 1);
        assert!(research.failures[0].contains("Crude Oil risks"));

        let sources: Vec<&str> = result.research.notes.iter().map(|n| n.source.as_str()).collect();
        assert_eq!(sources, vec!["reuters", "ft", "eia"]);
        // The failing query is retried before it is given up.
        let risk_attempts = evidence
            .queries()
            .iter()
            .filter(|q| q.as_str() == "Crude Oil risks")
            .count();
        assert_eq!(risk_attempts, 3);
        assert_eq!(result.confirmations_count, 2);
        assert_eq!(result.contradictions_count, 1);
    }

    #[tokio::test]
    async fn test_one_failed_batch_degrades_classification() {
        let reasoner = Arc::new(ScriptedReasoner::new(|request| match request.task {
            ReasoningTask::Context => Ok(context_json("Crude Oil", "bullish", &["OPEC cuts"])),
            ReasoningTask::ClassifyEvidence if request.prompt.contains("glut") => {
                Err(mcp_hypothesis_analysis::error::CallError::ProviderError {
                    message: "overloaded".into(),
                })
            }
            ReasoningTask::ClassifyEvidence => Ok(classify_by_keywords(
                &request.prompt,
                &["cuts".to_string()],
                &["glut".to_string()],
            )),
            ReasoningTask::Synthesis => Ok(synthesis_json()),
        }));
        let evidence = Arc::new(FixedEvidenceProvider::new(oil_snippets()));
        let config = PipelineConfig {
            classify_batch_size: 1,
            ..Default::default()
        };
        let store = Arc::new(InMemoryHypothesisStore::new());
        let result = orchestrator_with(reasoner.clone(), evidence, store, config)
            .run(HypothesisRequest::analyze(OIL))
            .await;

        assert_eq!(result.status, RunStatus::Success);
        let classify = &result.trace[2];
        assert_eq!(classify.stage, StageName::ContradictionConfirmation);
        assert_eq!(classify.status, StageStatus::Degraded);
        assert_eq!(classify.failures.len(), 1);
        assert!(classify.failures[0].starts_with("batch 1"));
        assert!(classify.failures[0].contains("overloaded"));

        assert_eq!(result.confirmations_count, 1);
        assert_eq!(result.confirmations[0].source, "reuters");
        assert!(result.contradictions.is_empty());
        // First batch once, second batch with its two retries.
        assert_eq!(reasoner.requests_for(ReasoningTask::ClassifyEvidence).len(), 4);
    }
}

mod interruption_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_run_timeout_finalizes_partial_within_budget() {
        let evidence = Arc::new(
            FixedEvidenceProvider::new(oil_snippets()).with_delay(Duration::from_secs(30)),
        );
        let config = PipelineConfig {
            run_timeout_ms: 200,
            cancel_grace_ms: 100,
            ..Default::default()
        };
        let store = Arc::new(InMemoryHypothesisStore::new());
        let orchestrator = orchestrator_with(oil_reasoner(), evidence, store, config);

        let started = Instant::now();
        let result = orchestrator.run(HypothesisRequest::analyze(OIL)).await;
        let elapsed = started.elapsed();

        assert_eq!(result.status, RunStatus::Partial);
        assert!(elapsed < Duration::from_secs(1), "took {:?}", elapsed);
        assert_eq!(stages(&result), StageName::ALL.to_vec());
        assert_eq!(result.trace[0].status, StageStatus::Ok);
        assert_eq!(result.trace[1].status, StageStatus::Failed);
        assert!(result.trace[2..]
            .iter()
            .all(|t| t.status == StageStatus::Skipped
                && t.error.as_deref() == Some("RunTimeout")));
        // Context output survives the timeout.
        assert_eq!(result.processed_hypothesis, "Crude Oil will move bullish");
    }

    #[tokio::test]
    async fn test_cancellation_finalizes_partial() {
        let evidence = Arc::new(
            FixedEvidenceProvider::new(oil_snippets()).with_delay(Duration::from_secs(30)),
        );
        let config = PipelineConfig {
            cancel_grace_ms: 100,
            ..Default::default()
        };
        let store = Arc::new(InMemoryHypothesisStore::new());
        let orchestrator = orchestrator_with(oil_reasoner(), evidence, store, config);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = orchestrator
            .run_with_cancel(HypothesisRequest::analyze(OIL), cancel)
            .await;

        assert_eq!(result.status, RunStatus::Partial);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(stages(&result), StageName::ALL.to_vec());
        assert!(result.trace[2..]
            .iter()
            .all(|t| t.error.as_deref() == Some("RunCancelled")));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everything() {
        let reasoner = oil_reasoner();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let evidence = Arc::new(FixedEvidenceProvider::new(oil_snippets()));
        let result = orchestrator(reasoner.clone(), evidence)
            .run_with_cancel(HypothesisRequest::analyze(OIL), cancel)
            .await;

        assert_eq!(result.status, RunStatus::Partial);
        assert_eq!(reasoner.calls(), 0);
        assert!(statuses(&result).iter().all(|s| *s == StageStatus::Skipped));
        assert_eq!(result.processed_hypothesis, OIL);
    }
}

mod abort_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_empty_hypothesis_is_rejected() {
        let reasoner = oil_reasoner();
        let result = orchestrator(reasoner.clone(), Arc::new(FixedEvidenceProvider::default()))
            .run(HypothesisRequest::analyze("   "))
            .await;

        assert_eq!(result.status, RunStatus::Error);
        assert!(result.error.as_deref().unwrap_or_default().contains("hypothesis is required"));
        assert_eq!(reasoner.calls(), 0);
        assert!(statuses(&result).iter().all(|s| *s == StageStatus::Skipped));
        assert!(result.confirmations.is_empty());
        assert_eq!(result.synthesis, INSUFFICIENT_EVIDENCE);
    }

    #[tokio::test]
    async fn test_generate_without_output_aborts() {
        let evidence = Arc::new(FixedEvidenceProvider::new(oil_snippets()));
        let result = orchestrator(Arc::new(ScriptedReasoner::failing()), evidence.clone())
            .run(HypothesisRequest {
                mode: Mode::Generate,
                ..Default::default()
            })
            .await;

        assert_eq!(result.status, RunStatus::Error);
        assert_eq!(
            statuses(&result),
            vec![
                StageStatus::Failed,
                StageStatus::Skipped,
                StageStatus::Skipped,
                StageStatus::Skipped,
                StageStatus::Skipped,
            ]
        );
        assert!(evidence.queries().is_empty());
        assert!(result.research.notes.is_empty());
    }

    #[tokio::test]
    async fn test_non_object_context_is_rejected() {
        let result = orchestrator(oil_reasoner(), Arc::new(FixedEvidenceProvider::default()))
            .run(HypothesisRequest {
                mode: Mode::Analyze,
                hypothesis: Some(OIL.into()),
                context: Some(json!(["energy"])),
                ..Default::default()
            })
            .await;

        assert_eq!(result.status, RunStatus::Error);
        assert_eq!(result.hypothesis_id, derive_hypothesis_id(OIL));
    }
}

mod alert_tests {
    use super::*;

    #[tokio::test]
    async fn test_trend_against_prior_result() {
        let store = Arc::new(InMemoryHypothesisStore::new());
        store
            .save_result(&sample_result(&derive_hypothesis_id(OIL), RunStatus::Success, 80))
            .await
            .unwrap();

        let evidence = Arc::new(FixedEvidenceProvider::new(oil_snippets()));
        let result = orchestrator_with(oil_reasoner(), evidence, store, PipelineConfig::default())
            .run(HypothesisRequest::analyze(OIL))
            .await;

        let messages: Vec<&str> = result.alerts.iter().map(|a| a.message.as_str()).collect();
        assert!(messages
            .iter()
            .any(|m| m.contains("fell 30 points") && m.contains("80% -> 50%")));
        assert!(messages
            .iter()
            .any(|m| m.starts_with("New strong contradiction found")));
    }
}
