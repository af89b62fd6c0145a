//! Integration tests for MCP protocol handling
//!
//! Drives a live serve loop over in-memory pipes, one JSON-RPC line at a
//! time, the way an MCP client talks to the binary over stdio.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::task::JoinHandle;

use mcp_hypothesis_analysis::analysis::{CallPolicy, Orchestrator};
use mcp_hypothesis_analysis::config::PipelineConfig;
use mcp_hypothesis_analysis::evidence::EvidenceSnippet;
use mcp_hypothesis_analysis::store::{HypothesisStore, InMemoryHypothesisStore};
use mcp_hypothesis_analysis::testing::{FixedEvidenceProvider, ScriptedReasoner};
use mcp_hypothesis_analysis::{AppState, McpServer};

/// Client end of a running server.
struct Session {
    input: DuplexStream,
    output: Lines<BufReader<DuplexStream>>,
    server: JoinHandle<std::io::Result<()>>,
}

impl Session {
    fn start(evidence: FixedEvidenceProvider) -> Self {
        let store: Arc<dyn HypothesisStore> = Arc::new(InMemoryHypothesisStore::new());
        let orchestrator = Orchestrator::new(
            Arc::new(ScriptedReasoner::keyword(&["cuts"], &["slows"])),
            Arc::new(evidence),
            Arc::clone(&store),
            PipelineConfig {
                cancel_grace_ms: 100,
                ..Default::default()
            },
            CallPolicy {
                call_timeout: Duration::from_secs(60),
                max_retries: 0,
                retry_delay: Duration::from_millis(1),
            },
            5,
        );
        let server = McpServer::new(Arc::new(AppState::new(orchestrator, store)));

        let (input, server_in) = duplex(1 << 20);
        let (server_out, output) = duplex(1 << 20);
        let server = tokio::spawn(async move {
            server.serve(BufReader::new(server_in), server_out).await
        });

        Self {
            input,
            output: BufReader::new(output).lines(),
            server,
        }
    }

    async fn send(&mut self, message: Value) {
        let mut line = message.to_string();
        line.push('\n');
        self.input.write_all(line.as_bytes()).await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(10), self.output.next_line())
            .await
            .expect("server did not answer in time")
            .unwrap()
            .expect("server closed its output");
        serde_json::from_str(&line).unwrap()
    }

    async fn close(mut self) {
        self.input.shutdown().await.unwrap();
        self.server.await.unwrap().unwrap();
    }
}

fn analyze_call(id: u64, hypothesis: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {
            "name": "hypothesis_analyze",
            "arguments": {"mode": "analyze", "hypothesis": hypothesis}
        }
    })
}

/// Parse the JSON document carried in a tool result's text content.
fn tool_payload(response: &Value) -> Value {
    assert_eq!(response["jsonrpc"], "2.0");
    assert!(response["result"]["isError"].is_null(), "tool failed: {}", response);
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

fn oil_evidence() -> FixedEvidenceProvider {
    FixedEvidenceProvider::new(vec![
        EvidenceSnippet::new("OPEC+ extends output cuts", "reuters"),
        EvidenceSnippet::new("China demand slows", "bloomberg"),
    ])
}

#[tokio::test]
async fn test_initialize_then_list_tools() {
    let mut session = Session::start(oil_evidence());

    session
        .send(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            }
        }))
        .await;
    let init = session.recv().await;
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["serverInfo"]["name"], "mcp-hypothesis-analysis");

    session
        .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    session
        .send(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .await;
    let list = session.recv().await;
    assert_eq!(list["id"], 2);
    let names: Vec<&str> = list["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, vec!["hypothesis_analyze", "hypothesis_prior_result"]);

    session.close().await;
}

#[tokio::test]
async fn test_analysis_is_stored_for_prior_lookup() {
    let mut session = Session::start(oil_evidence());
    let hypothesis = "Oil will exceed $85 by March";

    session.send(analyze_call(1, hypothesis)).await;
    let result = tool_payload(&session.recv().await);
    assert_eq!(result["status"], "success");
    assert_eq!(result["confirmations_count"], 1);
    assert_eq!(result["contradictions_count"], 1);

    session
        .send(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {
                "name": "hypothesis_prior_result",
                "arguments": {"hypothesis": hypothesis}
            }
        }))
        .await;
    let prior = tool_payload(&session.recv().await);
    assert_eq!(prior["found"], true);
    assert_eq!(prior["result"]["run_id"], result["run_id"]);

    session.close().await;
}

#[tokio::test]
async fn test_cancel_notification_finishes_call_as_partial() {
    let mut session = Session::start(oil_evidence().with_delay(Duration::from_secs(30)));

    let started = Instant::now();
    session
        .send(analyze_call(7, "Oil will exceed $85 by March"))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    session
        .send(json!({
            "jsonrpc": "2.0",
            "method": "notifications/cancelled",
            "params": {"requestId": 7, "reason": "user pressed stop"}
        }))
        .await;

    let response = session.recv().await;
    assert_eq!(response["id"], 7);
    let result = tool_payload(&response);
    assert_eq!(result["status"], "partial");
    assert!(started.elapsed() < Duration::from_secs(5));

    let trace = result["trace"].as_array().unwrap();
    assert_eq!(trace.len(), 5);
    assert_eq!(trace[4]["status"], "skipped");
    assert_eq!(trace[4]["error"], "RunCancelled");

    session.close().await;
}

#[tokio::test]
async fn test_reused_id_is_rejected_and_original_stays_cancellable() {
    let mut session = Session::start(oil_evidence().with_delay(Duration::from_secs(30)));

    session
        .send(analyze_call(7, "Oil will exceed $85 by March"))
        .await;
    session.send(analyze_call(7, "Gold will fall")).await;

    let rejected = session.recv().await;
    assert_eq!(rejected["id"], 7);
    assert_eq!(rejected["error"]["code"], -32600);

    let started = Instant::now();
    session
        .send(json!({
            "jsonrpc": "2.0",
            "method": "notifications/cancelled",
            "params": {"requestId": 7}
        }))
        .await;

    let response = session.recv().await;
    assert_eq!(response["id"], 7);
    let result = tool_payload(&response);
    assert_eq!(result["status"], "partial");
    assert!(started.elapsed() < Duration::from_secs(5));

    session.close().await;
}

#[tokio::test]
async fn test_cancel_for_unknown_request_is_ignored() {
    let mut session = Session::start(oil_evidence());

    session
        .send(json!({
            "jsonrpc": "2.0",
            "method": "notifications/cancelled",
            "params": {"requestId": 99}
        }))
        .await;
    session
        .send(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
        .await;

    let pong = session.recv().await;
    assert_eq!(pong["id"], 1);
    assert!(pong["error"].is_null());

    session.close().await;
}

#[tokio::test]
async fn test_invalid_tool_params_are_rejected() {
    let mut session = Session::start(oil_evidence());

    session
        .send(json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"arguments": {}}}))
        .await;
    let response = session.recv().await;
    assert_eq!(response["id"], 3);
    assert_eq!(response["error"]["code"], -32602);

    session.close().await;
}
