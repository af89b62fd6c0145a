//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::analysis::Orchestrator;
use crate::store::HypothesisStore;

/// Application state shared across handlers.
pub struct AppState {
    /// Runs analysis requests.
    pub orchestrator: Orchestrator,
    /// Where finished results are saved and prior results are read from.
    pub store: Arc<dyn HypothesisStore>,
}

impl AppState {
    /// Create new application state
    pub fn new(orchestrator: Orchestrator, store: Arc<dyn HypothesisStore>) -> Self {
        tracing::info!(
            run_timeout_ms = orchestrator.config().run_timeout_ms,
            max_concurrency = orchestrator.config().max_concurrency,
            "AppState initialized"
        );
        Self {
            orchestrator,
            store,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
