//! Centralized configuration management for repolens
//!
//! This crate provides a unified configuration system with type-safe,
//! validated settings for every subsystem of the ingestion service.
//!
//! Configuration follows a simple hierarchy:
//! 1. Safe defaults (defined as constants)
//! 2. Environment variable overrides (`REPOLENS_*`)
//! 3. Runtime validation

pub mod error;

pub use error::{ConfigError, ConfigResult};

use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::time::Duration;

// =============================================================================
// SAFE DEFAULTS - Work for any environment (dev, staging, prod, test)
// =============================================================================

// Database Configuration (safe local defaults)
const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_NAME: &str = "repolens";
const DEFAULT_DB_USER: &str = "repolens";
const DEFAULT_DB_PASSWORD: &str = "localdev123";
const DEFAULT_DB_SSL_MODE: &str = "disable";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_CONNECT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_DB_IDLE_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_AUTO_CREATE_SCHEMA: bool = true;

// Vector Storage Configuration
const DEFAULT_VECTOR_ENABLED: bool = true;
const DEFAULT_VECTOR_URL: &str = "http://localhost:6334";
const DEFAULT_VECTOR_COLLECTION: &str = "repolens";
const DEFAULT_VECTOR_DIMENSION: usize = 768;

// Embedding Client Configuration
const DEFAULT_EMBEDDING_URL: &str = "http://localhost:8090";
const DEFAULT_EMBEDDING_MODEL: &str = "jinaai/jina-embeddings-v2-base-code";
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;
const DEFAULT_EMBEDDING_MAX_RETRIES: u32 = 3;
const DEFAULT_EMBEDDING_INITIAL_BACKOFF_MS: u64 = 250;
const DEFAULT_EMBEDDING_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_BREAKER_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_BREAKER_OPEN_SECONDS: u64 = 30;

// Scheduler Configuration
const DEFAULT_SCHEDULER_CONCURRENCY: usize = 4;
const DEFAULT_SCHEDULER_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_SCHEDULER_WAIT_POLL_INTERVAL_MS: u64 = 200;
const DEFAULT_JOB_MAX_ATTEMPTS: i32 = 3;
const DEFAULT_RETRY_BACKOFF_SECS: u64 = 30;

// Ingestion Configuration
const DEFAULT_MAX_FILE_BYTES: u64 = 512 * 1024;
const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "svg", "pdf", "zip", "gz", "tar", "jar", "class", "exe",
    "dll", "so", "dylib", "bin", "lock", "woff", "woff2", "ttf", "eot", "mp3", "mp4", "webm",
];

// Dedup Configuration
const DEFAULT_DEDUP_WINDOW_SECS: u64 = 600;

// Telemetry Configuration
const DEFAULT_TRACING_LEVEL: &str = "info";

/// Core configuration for the entire repolens service
///
/// All settings have safe defaults and can be overridden via environment
/// variables. No profile/environment selection needed - same defaults work
/// everywhere.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApplicationConfig {
    /// Primary relational store configuration
    pub database: DatabaseConfig,

    /// Vector-search engine configuration
    pub vector_storage: VectorStorageConfig,

    /// Embedding-generation collaborator configuration
    pub embedding: EmbeddingClientConfig,

    /// Job scheduler configuration
    pub scheduler: SchedulerSettings,

    /// Ingestion pipeline configuration
    pub ingestion: IngestionSettings,

    /// Webhook deduplication configuration
    pub dedup: DedupSettings,

    /// Telemetry configuration
    pub telemetry: TelemetryConfig,
}

/// Primary store (`PostgreSQL`) configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub ssl_mode: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    /// Run idempotent schema creation on startup
    pub auto_create_schema: bool,
}

impl DatabaseConfig {
    /// Build sqlx connect options from this configuration
    pub fn connect_options(&self) -> PgConnectOptions {
        let ssl_mode = match self.ssl_mode.as_str() {
            "require" => PgSslMode::Require,
            "prefer" => PgSslMode::Prefer,
            _ => PgSslMode::Disable,
        };

        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.user)
            .password(&self.password)
            .ssl_mode(ssl_mode)
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }
}

/// Vector-search engine (Qdrant) configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VectorStorageConfig {
    /// When false the coordinator runs primary-only regardless of mode
    pub enabled: bool,
    pub url: String,
    pub collection_name: String,
    /// Must match the embedding model's output dimension
    pub dimension: usize,
}

/// Embedding-generation collaborator (HTTP service) configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EmbeddingClientConfig {
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    /// Files per embedding request
    pub batch_size: usize,
    /// Retries per batch before the failure is fatal for the job attempt
    pub max_retries: u32,
    /// First retry delay; doubles on each subsequent retry
    pub initial_backoff_ms: u64,
    pub request_timeout_seconds: u64,
    /// Consecutive failures before the circuit breaker opens
    pub breaker_failure_threshold: u32,
    /// How long the breaker stays open before probing again
    pub breaker_open_seconds: u64,
}

impl EmbeddingClientConfig {
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub const fn breaker_open_timeout(&self) -> Duration {
        Duration::from_secs(self.breaker_open_seconds)
    }
}

/// Scheduler and retry policy configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SchedulerSettings {
    /// Maximum jobs executing concurrently in one process
    pub concurrency: usize,
    /// Idle sleep between polls when no eligible jobs exist
    pub poll_interval_ms: u64,
    /// Poll interval used by `wait_for_completion`
    pub wait_poll_interval_ms: u64,
    /// Attempts ceiling stamped on newly enqueued jobs
    pub max_attempts: i32,
    /// Linear backoff unit: a retrying job becomes eligible after
    /// `attempts * retry_backoff_secs`
    pub retry_backoff_secs: u64,
}

impl SchedulerSettings {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms)
    }

    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

/// Ingestion pipeline file filtering configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IngestionSettings {
    /// Files larger than this are skipped as content errors
    pub max_file_bytes: u64,
    /// Extensions treated as binary and skipped without reading
    pub excluded_extensions: Vec<String>,
}

/// Webhook deduplication policy (tunable, not a contract)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DedupSettings {
    /// Window during which a completed event suppresses redelivery, and the
    /// in-flight ticket timeout
    pub window_secs: u64,
}

impl DedupSettings {
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetryConfig {
    pub tracing_level: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            name: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: DEFAULT_DB_PASSWORD.to_string(),
            ssl_mode: DEFAULT_DB_SSL_MODE.to_string(),
            max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            connect_timeout_seconds: DEFAULT_DB_CONNECT_TIMEOUT_SECONDS,
            idle_timeout_seconds: DEFAULT_DB_IDLE_TIMEOUT_SECONDS,
            auto_create_schema: DEFAULT_AUTO_CREATE_SCHEMA,
        }
    }
}

impl Default for VectorStorageConfig {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_VECTOR_ENABLED,
            url: DEFAULT_VECTOR_URL.to_string(),
            collection_name: DEFAULT_VECTOR_COLLECTION.to_string(),
            dimension: DEFAULT_VECTOR_DIMENSION,
        }
    }
}

impl Default for EmbeddingClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EMBEDDING_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_VECTOR_DIMENSION,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            max_retries: DEFAULT_EMBEDDING_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_EMBEDDING_INITIAL_BACKOFF_MS,
            request_timeout_seconds: DEFAULT_EMBEDDING_TIMEOUT_SECONDS,
            breaker_failure_threshold: DEFAULT_BREAKER_FAILURE_THRESHOLD,
            breaker_open_seconds: DEFAULT_BREAKER_OPEN_SECONDS,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_SCHEDULER_CONCURRENCY,
            poll_interval_ms: DEFAULT_SCHEDULER_POLL_INTERVAL_MS,
            wait_poll_interval_ms: DEFAULT_SCHEDULER_WAIT_POLL_INTERVAL_MS,
            max_attempts: DEFAULT_JOB_MAX_ATTEMPTS,
            retry_backoff_secs: DEFAULT_RETRY_BACKOFF_SECS,
        }
    }
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            excluded_extensions: DEFAULT_EXCLUDED_EXTENSIONS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_DEDUP_WINDOW_SECS,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            tracing_level: DEFAULT_TRACING_LEVEL.to_string(),
        }
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            vector_storage: VectorStorageConfig::default(),
            embedding: EmbeddingClientConfig::default(),
            scheduler: SchedulerSettings::default(),
            ingestion: IngestionSettings::default(),
            dedup: DedupSettings::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl ApplicationConfig {
    /// Load configuration from defaults with environment overrides applied
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if an override cannot be parsed,
    /// or `ConfigError::Validation` if the resulting config is inconsistent.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();

        override_string("REPOLENS_DB_HOST", &mut config.database.host);
        override_parsed("REPOLENS_DB_PORT", &mut config.database.port)?;
        override_string("REPOLENS_DB_NAME", &mut config.database.name);
        override_string("REPOLENS_DB_USER", &mut config.database.user);
        override_string("REPOLENS_DB_PASSWORD", &mut config.database.password);
        override_string("REPOLENS_DB_SSL_MODE", &mut config.database.ssl_mode);
        override_parsed(
            "REPOLENS_DB_MAX_CONNECTIONS",
            &mut config.database.max_connections,
        )?;
        override_parsed(
            "REPOLENS_AUTO_CREATE_SCHEMA",
            &mut config.database.auto_create_schema,
        )?;

        override_parsed("REPOLENS_VECTOR_ENABLED", &mut config.vector_storage.enabled)?;
        override_string("REPOLENS_VECTOR_URL", &mut config.vector_storage.url);
        override_string(
            "REPOLENS_VECTOR_COLLECTION",
            &mut config.vector_storage.collection_name,
        );
        override_parsed(
            "REPOLENS_VECTOR_DIMENSION",
            &mut config.vector_storage.dimension,
        )?;

        override_string("REPOLENS_EMBEDDING_URL", &mut config.embedding.base_url);
        override_string("REPOLENS_EMBEDDING_MODEL", &mut config.embedding.model);
        override_parsed(
            "REPOLENS_EMBEDDING_DIMENSION",
            &mut config.embedding.dimension,
        )?;
        override_parsed(
            "REPOLENS_EMBEDDING_BATCH_SIZE",
            &mut config.embedding.batch_size,
        )?;
        override_parsed(
            "REPOLENS_EMBEDDING_MAX_RETRIES",
            &mut config.embedding.max_retries,
        )?;
        override_parsed(
            "REPOLENS_EMBEDDING_INITIAL_BACKOFF_MS",
            &mut config.embedding.initial_backoff_ms,
        )?;
        override_parsed(
            "REPOLENS_EMBEDDING_TIMEOUT_SECONDS",
            &mut config.embedding.request_timeout_seconds,
        )?;
        override_parsed(
            "REPOLENS_BREAKER_FAILURE_THRESHOLD",
            &mut config.embedding.breaker_failure_threshold,
        )?;
        override_parsed(
            "REPOLENS_BREAKER_OPEN_SECONDS",
            &mut config.embedding.breaker_open_seconds,
        )?;

        override_parsed(
            "REPOLENS_SCHEDULER_CONCURRENCY",
            &mut config.scheduler.concurrency,
        )?;
        override_parsed(
            "REPOLENS_SCHEDULER_POLL_INTERVAL_MS",
            &mut config.scheduler.poll_interval_ms,
        )?;
        override_parsed(
            "REPOLENS_SCHEDULER_WAIT_POLL_INTERVAL_MS",
            &mut config.scheduler.wait_poll_interval_ms,
        )?;
        override_parsed(
            "REPOLENS_JOB_MAX_ATTEMPTS",
            &mut config.scheduler.max_attempts,
        )?;
        override_parsed(
            "REPOLENS_RETRY_BACKOFF_SECS",
            &mut config.scheduler.retry_backoff_secs,
        )?;

        override_parsed(
            "REPOLENS_MAX_FILE_BYTES",
            &mut config.ingestion.max_file_bytes,
        )?;

        override_parsed("REPOLENS_DEDUP_WINDOW_SECS", &mut config.dedup.window_secs)?;

        override_string(
            "REPOLENS_TRACING_LEVEL",
            &mut config.telemetry.tracing_level,
        );

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field consistency
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` describing the first failed rule.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scheduler.concurrency == 0 {
            return Err(ConfigError::Validation(
                "scheduler concurrency must be at least 1".to_string(),
            ));
        }
        if self.scheduler.max_attempts < 1 {
            return Err(ConfigError::Validation(
                "job max_attempts must be at least 1".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Validation(
                "embedding batch_size must be at least 1".to_string(),
            ));
        }
        if self.embedding.dimension == 0 || self.vector_storage.dimension == 0 {
            return Err(ConfigError::Validation(
                "embedding dimensions must be non-zero".to_string(),
            ));
        }
        if self.vector_storage.enabled && self.vector_storage.dimension != self.embedding.dimension
        {
            return Err(ConfigError::Validation(format!(
                "vector dimension {} does not match embedding dimension {}",
                self.vector_storage.dimension, self.embedding.dimension
            )));
        }
        Ok(())
    }
}

fn override_string(variable: &str, target: &mut String) {
    if let Ok(value) = std::env::var(variable) {
        *target = value;
    }
}

fn override_parsed<T>(variable: &str, target: &mut T) -> ConfigResult<()>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(value) = std::env::var(variable) {
        *target = value
            .parse()
            .map_err(|e| ConfigError::invalid(variable, format!("{e}")))?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = ApplicationConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = ApplicationConfig::default();
        config.scheduler.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn dimension_mismatch_rejected_when_vector_enabled() {
        let mut config = ApplicationConfig::default();
        config.vector_storage.dimension = 384;
        config.embedding.dimension = 768;
        assert!(config.validate().is_err());

        config.vector_storage.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn embedding_and_scheduler_knobs_honor_env_overrides() {
        // set_var is unsafe with concurrent env readers; these names are
        // touched by no other test.
        unsafe {
            std::env::set_var("REPOLENS_BREAKER_FAILURE_THRESHOLD", "9");
            std::env::set_var("REPOLENS_EMBEDDING_INITIAL_BACKOFF_MS", "50");
            std::env::set_var("REPOLENS_SCHEDULER_WAIT_POLL_INTERVAL_MS", "75");
        }
        let config = ApplicationConfig::from_env().unwrap();
        unsafe {
            std::env::remove_var("REPOLENS_BREAKER_FAILURE_THRESHOLD");
            std::env::remove_var("REPOLENS_EMBEDDING_INITIAL_BACKOFF_MS");
            std::env::remove_var("REPOLENS_SCHEDULER_WAIT_POLL_INTERVAL_MS");
        }

        assert_eq!(config.embedding.breaker_failure_threshold, 9);
        assert_eq!(config.embedding.initial_backoff(), Duration::from_millis(50));
        assert_eq!(
            config.scheduler.wait_poll_interval(),
            Duration::from_millis(75)
        );
    }

    #[test]
    fn linear_backoff_helper() {
        let settings = SchedulerSettings::default();
        assert_eq!(
            settings.retry_backoff(),
            Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS)
        );
    }
}
