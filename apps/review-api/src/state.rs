//! Application state for the review API

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::gateway::{GeminiAnalyzer, GeminiConfig, TextAnalyzer};

/// Service configuration, read once at startup.
#[derive(Clone)]
pub struct Config {
    /// Bearer secret expected on the review routes.
    pub api_key: String,
    /// Longest accepted submission, in characters.
    pub max_text_length: usize,
    /// Bound on the upstream analysis round trip.
    pub upstream_timeout: Duration,
}

// Manual impl: the bearer secret must never reach a log line.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("max_text_length", &self.max_text_length)
            .field("upstream_timeout", &self.upstream_timeout)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("REVIEW_API_KEY")
            .context("No REVIEW_API_KEY found in environment variables")?;

        let max_text_length = std::env::var("MAX_TEXT_LENGTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50_000);

        let timeout_ms: u64 = std::env::var("UPSTREAM_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30_000);

        Ok(Self {
            api_key,
            max_text_length,
            upstream_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// Shared application state
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub analyzer: Arc<dyn TextAnalyzer>,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        let config = Config::from_env()?;

        let gemini = GeminiConfig {
            api_key: std::env::var("GOOGLE_API_KEY")
                .context("No GOOGLE_API_KEY found in environment variables")?,
            model_id: std::env::var("GEMINI_MODEL_ID")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            timeout: config.upstream_timeout,
        };
        let analyzer: Arc<dyn TextAnalyzer> = Arc::new(GeminiAnalyzer::new(gemini));

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:review.db?mode=rwc".to_string());
        tracing::info!("Connecting to database: {}", database_url);

        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;

        Self::run_migrations(&db).await?;

        Ok(Self {
            db,
            config,
            analyzer,
        })
    }

    /// Test state: in-memory database, caller-supplied analyzer, fixed key.
    /// The pool is pinned to one connection so the in-memory database
    /// outlives individual acquires.
    #[cfg(test)]
    pub async fn for_tests(analyzer: Arc<dyn TextAnalyzer>, api_key: &str) -> Result<Self> {
        let db = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::run_migrations(&db).await?;

        Ok(Self {
            db,
            config: Config {
                api_key: api_key.to_string(),
                max_text_length: 500,
                upstream_timeout: Duration::from_secs(5),
            },
            analyzer,
        })
    }

    /// Create tables if this is a fresh database
    async fn run_migrations(db: &SqlitePool) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS assessments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text_submitted TEXT NOT NULL,
                summary TEXT NOT NULL,
                processing_time REAL NOT NULL,
                tokens_used INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS assessment_errors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                assessment_id INTEGER NOT NULL REFERENCES assessments(id),
                text_original TEXT NOT NULL,
                text_corrected TEXT NOT NULL,
                category TEXT NOT NULL,
                description TEXT NOT NULL,
                position INTEGER NOT NULL,
                context TEXT NOT NULL
            )
            "#,
        )
        .execute(db)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_assessment_errors_assessment_id
            ON assessment_errors(assessment_id)
            "#,
        )
        .execute(db)
        .await?;

        tracing::info!("Migrations complete");
        Ok(())
    }
}
