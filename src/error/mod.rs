use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Langbase error: {0}")]
    Langbase(#[from] LangbaseError),

    #[error("Evidence provider error: {0}")]
    Evidence(#[from] EvidenceError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Hypothesis store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Stored result could not be decoded: {message}")]
    Corrupt { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Langbase API errors
#[derive(Debug, Error)]
pub enum LangbaseError {
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Evidence endpoint errors
#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of a single external call (evidence query or reasoning inference).
///
/// These are retried by the call policy and, once the budget is spent,
/// recorded as a degraded contribution. They never cross a stage boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("ProviderTimeout: no response after {timeout_ms}ms")]
    ProviderTimeout { timeout_ms: u64 },

    #[error("ProviderError: {message}")]
    ProviderError { message: String },

    #[error("MalformedOutput: {message}")]
    MalformedOutput { message: String },
}

impl CallError {
    /// Short taxonomy name, used in trace entries and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::ProviderTimeout { .. } => "ProviderTimeout",
            CallError::ProviderError { .. } => "ProviderError",
            CallError::MalformedOutput { .. } => "MalformedOutput",
        }
    }
}

impl From<LangbaseError> for CallError {
    fn from(err: LangbaseError) -> Self {
        match err {
            LangbaseError::Timeout { timeout_ms } => CallError::ProviderTimeout { timeout_ms },
            LangbaseError::InvalidResponse { message } => CallError::MalformedOutput { message },
            other => CallError::ProviderError {
                message: other.to_string(),
            },
        }
    }
}

impl From<EvidenceError> for CallError {
    fn from(err: EvidenceError) -> Self {
        match err {
            EvidenceError::Timeout { timeout_ms } => CallError::ProviderTimeout { timeout_ms },
            EvidenceError::InvalidResponse { message } => CallError::MalformedOutput { message },
            other => CallError::ProviderError {
                message: other.to_string(),
            },
        }
    }
}

/// Run-level conditions that end a pipeline run early.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// Hypothesis text is missing, empty or cannot be normalized. Aborts the run.
    #[error("UnrecoverableInput: {reason}")]
    UnrecoverableInput { reason: String },

    /// The per-run wall-clock budget was exhausted. Finalizes as partial.
    #[error("RunTimeout: run exceeded {budget_ms}ms")]
    RunTimeout { budget_ms: u64 },

    /// The caller cancelled the run. Finalizes as partial.
    #[error("RunCancelled: {reason}")]
    RunCancelled { reason: String },
}

impl AnalysisError {
    /// Short taxonomy name, used in skipped trace entries.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::UnrecoverableInput { .. } => "UnrecoverableInput",
            AnalysisError::RunTimeout { .. } => "RunTimeout",
            AnalysisError::RunCancelled { .. } => "RunCancelled",
        }
    }
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for Langbase operations
pub type LangbaseResult<T> = Result<T, LangbaseError>;

/// Result type alias for evidence endpoint operations
pub type EvidenceResult<T> = Result<T, EvidenceError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Result type alias for a single external call
pub type CallResult<T> = Result<T, CallError>;
