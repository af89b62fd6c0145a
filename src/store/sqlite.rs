use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::HypothesisStore;
use crate::analysis::types::AnalysisResult;
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed hypothesis store. Each result is one JSON row keyed by run id.
#[derive(Clone)]
pub struct SqliteHypothesisStore {
    pool: SqlitePool,
}

impl SqliteHypothesisStore {
    /// Open (or create) the database and run migrations
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Number of stored results for a hypothesis, error results included.
    pub async fn count(&self, hypothesis_id: &str) -> StorageResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM analysis_results WHERE hypothesis_id = ?")
                .bind(hypothesis_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    run_id: String,
    result_json: String,
}

impl TryFrom<ResultRow> for AnalysisResult {
    type Error = StorageError;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        serde_json::from_str(&row.result_json).map_err(|e| StorageError::Corrupt {
            message: format!("run {}: {}", row.run_id, e),
        })
    }
}

#[async_trait]
impl HypothesisStore for SqliteHypothesisStore {
    async fn get_prior_result(&self, hypothesis_id: &str) -> StorageResult<Option<AnalysisResult>> {
        let row: Option<ResultRow> = sqlx::query_as(
            r#"
            SELECT run_id, result_json
            FROM analysis_results
            WHERE hypothesis_id = ? AND status != 'error'
            ORDER BY completed_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(hypothesis_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AnalysisResult::try_from).transpose()
    }

    async fn save_result(&self, result: &AnalysisResult) -> StorageResult<()> {
        let result_json = serde_json::to_string(result).map_err(|e| StorageError::Query {
            message: format!("Failed to serialize result: {}", e),
        })?;

        sqlx::query(
            r#"
            INSERT INTO analysis_results
                (run_id, hypothesis_id, mode, status, confidence, result_json, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.run_id.to_string())
        .bind(&result.hypothesis_id)
        .bind(result.mode.as_str())
        .bind(result.status.as_str())
        .bind(i64::from(result.confidence))
        .bind(&result_json)
        .bind(
            result
                .completed_at
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        )
        .execute(&self.pool)
        .await?;

        debug!(
            run_id = %result.run_id,
            hypothesis_id = %result.hypothesis_id,
            status = result.status.as_str(),
            "Analysis result saved"
        );

        Ok(())
    }
}
