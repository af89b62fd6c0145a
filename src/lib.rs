//! # MCP Hypothesis Analysis Server
//!
//! A Model Context Protocol (MCP) server that runs trading hypotheses through
//! a staged reasoning pipeline and returns a structured verdict.
//!
//! ## Pipeline
//!
//! - **Context**: normalizes the raw hypothesis (or refines/generates one)
//!   into a structured statement
//! - **Research**: issues evidence queries in parallel and merges the snippets
//! - **Contradiction/Confirmation**: classifies every snippet against the
//!   hypothesis in concurrent batches
//! - **Synthesis**: writes the narrative and recommendation
//! - **Alert**: emits rule-based alerts, including the trend against the
//!   previous stored result
//!
//! Every external call is bounded by a timeout and retry budget, every run by
//! a wall-clock budget and caller cancellation. A run always ends in a
//! well-formed [`analysis::AnalysisResult`] whose status is `success`,
//! `partial` or `error`.
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server (Rust) → Orchestrator → Langbase Pipes (HTTP)
//!                    ↓                   ↓
//!              SQLite (results)   Evidence search (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mcp_hypothesis_analysis::analysis::{HypothesisRequest, Orchestrator};
//! use mcp_hypothesis_analysis::evidence::HttpEvidenceProvider;
//! use mcp_hypothesis_analysis::langbase::LangbaseClient;
//! use mcp_hypothesis_analysis::reasoning::LangbaseReasoner;
//! use mcp_hypothesis_analysis::store::SqliteHypothesisStore;
//! use mcp_hypothesis_analysis::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let langbase = LangbaseClient::new(&config.langbase, &config.request)?;
//!     let orchestrator = Orchestrator::from_config(
//!         &config,
//!         Arc::new(LangbaseReasoner::new(langbase, config.pipes.clone())),
//!         Arc::new(HttpEvidenceProvider::new(&config.evidence, &config.request)?),
//!         Arc::new(SqliteHypothesisStore::new(&config.database).await?),
//!     );
//!     let result = orchestrator.run(HypothesisRequest::analyze("Oil will rise")).await;
//!     println!("{} ({}%)", result.verdict, result.confidence);
//!     Ok(())
//! }
//! ```

/// Hypothesis analysis pipeline: stages, orchestrator and aggregation.
pub mod analysis;
/// Configuration management for the MCP server.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Evidence provider interface and HTTP search client.
pub mod evidence;
/// Langbase API client and types for pipe communication.
pub mod langbase;
/// System prompts for Langbase pipes.
pub mod prompts;
/// Reasoning capability interface and output schemas.
pub mod reasoning;
/// MCP server implementation and request handling.
pub mod server;
/// Hypothesis store for prior results.
pub mod store;
/// Deterministic providers for the unit and integration tests. Not part of
/// the supported API.
#[doc(hidden)]
pub mod testing;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
