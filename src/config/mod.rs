use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: LangbaseConfig,
    pub evidence: EvidenceConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub pipeline: PipelineConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Evidence search endpoint configuration
#[derive(Debug, Clone)]
pub struct EvidenceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Upper bound on snippets requested per query.
    pub max_snippets: usize,
}

/// Database configuration for the hypothesis store
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Per-call timeout and retry budget for external providers
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Langbase pipe name configuration
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub context: String,
    pub classify: String,
    pub synthesis: String,
}

/// Orchestration limits, stage budgets and scoring policy.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Wall-clock budget for a whole run.
    pub run_timeout_ms: u64,
    /// How long in-flight work may continue after cancellation or run timeout.
    pub cancel_grace_ms: u64,
    /// Maximum concurrent external calls within one fan-out stage.
    pub max_concurrency: usize,
    /// Number of evidence queries the research stage issues.
    pub max_queries: usize,
    /// Number of research notes per classification call.
    pub classify_batch_size: usize,
    /// Longest hypothesis/idea text accepted.
    pub max_input_chars: usize,
    pub stage_timeouts: StageTimeouts,
    pub scoring: ScoringWeights,
    pub alerts: AlertThresholds,
}

/// Aggregate timeout for each stage's own work, fan-out included.
#[derive(Debug, Clone)]
pub struct StageTimeouts {
    pub context_ms: u64,
    pub research_ms: u64,
    pub classify_ms: u64,
    pub synthesis_ms: u64,
    pub alert_ms: u64,
}

/// Confidence score policy: `baseline + Σ confirmations − Σ contradictions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringWeights {
    pub baseline: i32,
    pub strong: i32,
    pub moderate: i32,
    pub weak: i32,
}

/// Thresholds used by the alert stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertThresholds {
    pub low_confidence: u8,
    pub high_confidence: u8,
    pub trend_delta: u8,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").map_err(|_| AppError::Config {
                message: "LANGBASE_API_KEY is required".to_string(),
            })?,
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
        };

        let evidence = EvidenceConfig {
            base_url: env::var("EVIDENCE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8600".to_string()),
            api_key: env::var("EVIDENCE_API_KEY").ok().filter(|k| !k.is_empty()),
            max_snippets: env_parse("EVIDENCE_MAX_SNIPPETS", 5),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/hypotheses.db".to_string()),
            ),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 30000),
            max_retries: env_parse("MAX_RETRIES", 2),
            retry_delay_ms: env_parse("RETRY_DELAY_MS", 500),
        };

        let pipes = PipeConfig {
            context: env::var("PIPE_CONTEXT").unwrap_or_else(|_| "hypothesis-context-v1".to_string()),
            classify: env::var("PIPE_CLASSIFY")
                .unwrap_or_else(|_| "evidence-classifier-v1".to_string()),
            synthesis: env::var("PIPE_SYNTHESIS")
                .unwrap_or_else(|_| "hypothesis-synthesis-v1".to_string()),
        };

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            run_timeout_ms: env_parse("RUN_TIMEOUT_MS", defaults.run_timeout_ms),
            cancel_grace_ms: env_parse("CANCEL_GRACE_MS", defaults.cancel_grace_ms),
            max_concurrency: env_parse("MAX_CONCURRENT_CALLS", defaults.max_concurrency),
            max_queries: env_parse("RESEARCH_MAX_QUERIES", defaults.max_queries),
            classify_batch_size: env_parse("CLASSIFY_BATCH_SIZE", defaults.classify_batch_size),
            max_input_chars: env_parse("MAX_INPUT_CHARS", defaults.max_input_chars),
            stage_timeouts: StageTimeouts {
                context_ms: env_parse("CONTEXT_STAGE_TIMEOUT_MS", defaults.stage_timeouts.context_ms),
                research_ms: env_parse(
                    "RESEARCH_STAGE_TIMEOUT_MS",
                    defaults.stage_timeouts.research_ms,
                ),
                classify_ms: env_parse(
                    "CLASSIFY_STAGE_TIMEOUT_MS",
                    defaults.stage_timeouts.classify_ms,
                ),
                synthesis_ms: env_parse(
                    "SYNTHESIS_STAGE_TIMEOUT_MS",
                    defaults.stage_timeouts.synthesis_ms,
                ),
                alert_ms: env_parse("ALERT_STAGE_TIMEOUT_MS", defaults.stage_timeouts.alert_ms),
            },
            scoring: ScoringWeights {
                baseline: env_parse("SCORE_BASELINE", defaults.scoring.baseline),
                strong: env_parse("SCORE_WEIGHT_STRONG", defaults.scoring.strong),
                moderate: env_parse("SCORE_WEIGHT_MODERATE", defaults.scoring.moderate),
                weak: env_parse("SCORE_WEIGHT_WEAK", defaults.scoring.weak),
            },
            alerts: AlertThresholds {
                low_confidence: env_parse("ALERT_LOW_CONFIDENCE", defaults.alerts.low_confidence),
                high_confidence: env_parse(
                    "ALERT_HIGH_CONFIDENCE",
                    defaults.alerts.high_confidence,
                ),
                trend_delta: env_parse("ALERT_TREND_DELTA", defaults.alerts.trend_delta),
            },
        };
        pipeline.validate()?;

        Ok(Config {
            langbase,
            evidence,
            database,
            logging,
            request,
            pipes,
            pipeline,
        })
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl PipelineConfig {
    /// Reject settings that would stall or invert the pipeline.
    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |message: &str| {
            Err(AppError::Config {
                message: message.to_string(),
            })
        };

        if self.max_concurrency == 0 {
            return invalid("MAX_CONCURRENT_CALLS must be at least 1");
        }
        if self.classify_batch_size == 0 {
            return invalid("CLASSIFY_BATCH_SIZE must be at least 1");
        }
        if self.max_queries == 0 {
            return invalid("RESEARCH_MAX_QUERIES must be at least 1");
        }
        if self.run_timeout_ms == 0 {
            return invalid("RUN_TIMEOUT_MS must be greater than 0");
        }
        if !(0..=100).contains(&self.scoring.baseline) {
            return invalid("SCORE_BASELINE must be between 0 and 100");
        }
        if self.scoring.strong < 0 || self.scoring.moderate < 0 || self.scoring.weak < 0 {
            return invalid("score weights must not be negative");
        }
        if self.alerts.low_confidence > 100 || self.alerts.high_confidence > 100 {
            return invalid("alert thresholds must be between 0 and 100");
        }
        if self.alerts.low_confidence >= self.alerts.high_confidence {
            return invalid("ALERT_LOW_CONFIDENCE must be below ALERT_HIGH_CONFIDENCE");
        }
        if self.alerts.trend_delta == 0 {
            return invalid("ALERT_TREND_DELTA must be at least 1");
        }
        Ok(())
    }

    /// Wall-clock budget for a whole run.
    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    /// Grace window for in-flight work after cancellation or run timeout.
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_timeout_ms: 120_000,
            cancel_grace_ms: 2_000,
            max_concurrency: 5,
            max_queries: 4,
            classify_batch_size: 4,
            max_input_chars: 4_000,
            stage_timeouts: StageTimeouts::default(),
            scoring: ScoringWeights::default(),
            alerts: AlertThresholds::default(),
        }
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            context_ms: 30_000,
            research_ms: 45_000,
            classify_ms: 45_000,
            synthesis_ms: 30_000,
            alert_ms: 5_000,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            baseline: 50,
            strong: 5,
            moderate: 2,
            weak: 0,
        }
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            low_confidence: 40,
            high_confidence: 70,
            trend_delta: 10,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 2,
            retry_delay_ms: 500,
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            context: "hypothesis-context-v1".to_string(),
            classify: "evidence-classifier-v1".to_string(),
            synthesis: "hypothesis-synthesis-v1".to_string(),
        }
    }
}
