//! Centralized configuration management for mnemo
//!
//! Provides a unified configuration system with type-safe, validated
//! settings for the ingestion pipeline. Configuration follows a simple
//! hierarchy:
//! 1. Safe defaults (defined as constants)
//! 2. Environment variable overrides
//! 3. Runtime validation

pub mod error;

pub use error::{ConfigError, ConfigResult};

use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// SAFE DEFAULTS - Work for any environment (dev, prod, test)
// =============================================================================

// Ingestion queue configuration
const DEFAULT_QUEUE_CONCURRENCY: usize = 4; // Parallel processors
const DEFAULT_QUEUE_POLL_INTERVAL_MS: u64 = 5_000; // Idle poll cadence
const DEFAULT_QUEUE_MAX_RETRIES: u32 = 3; // Retries after the first failure
const DEFAULT_QUEUE_RETRY_DELAY_MS: u64 = 60_000; // Base backoff delay

// Embedding worker configuration
const DEFAULT_EMBEDDER_INTERVAL_MS: u64 = 30_000; // Tick cadence
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

// Source intake limits
const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024; // 50 MiB
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

// Database configuration
const DEFAULT_DB_FILE_NAME: &str = "mnemo.sqlite3";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5; // Conservative
const DEFAULT_DB_BUSY_TIMEOUT_SECS: u64 = 5; // SQLite writer contention
const DEFAULT_AUTO_MIGRATE: bool = true; // Auto-migrate by default

/// Core configuration for the ingestion pipeline
///
/// All settings have safe defaults and can be overridden via environment
/// variables. No profile/environment selection needed - same defaults work
/// everywhere.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApplicationConfig {
    /// Relational store configuration
    pub database: DatabaseConfig,

    /// Ingestion queue (scheduler) configuration
    pub queue: QueueConfig,

    /// Embedding worker configuration
    pub embedder: EmbedderConfig,

    /// Source intake configuration (file sizes, fetch timeouts, storage)
    pub intake: IntakeConfig,
}

/// Relational store (SQLite) configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file
    pub path: PathBuf,
    /// Maximum pool connections
    pub max_connections: u32,
    /// How long a connection waits on the single writer lock
    pub busy_timeout: Duration,
    /// Run pending migrations on startup
    pub auto_migrate: bool,
}

/// Ingestion queue configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueConfig {
    /// Maximum jobs executing in parallel
    pub concurrency: usize,
    /// Time between polls when idle
    pub poll_interval: Duration,
    /// Attempts after the first failure before terminal failure
    pub max_retries: u32,
    /// Base retry delay; the nth retry waits `retry_delay * 2^(attempts-1)`
    pub retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_QUEUE_CONCURRENCY,
            poll_interval: Duration::from_millis(DEFAULT_QUEUE_POLL_INTERVAL_MS),
            max_retries: DEFAULT_QUEUE_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_QUEUE_RETRY_DELAY_MS),
        }
    }
}

/// Embedding worker configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EmbedderConfig {
    /// Time between embedding ticks
    pub interval: Duration,
    /// Embedding model identifier recorded on every link row
    pub model: String,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_EMBEDDER_INTERVAL_MS),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

/// Source intake configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IntakeConfig {
    /// Files above this size fail immediately as input-fatal
    pub max_file_size_bytes: u64,
    /// Per-request timeout for source fetches
    pub fetch_timeout: Duration,
    /// Root of the content-addressed file store (`<data_dir>/pdfs/...`)
    pub data_dir: PathBuf,
}

impl ApplicationConfig {
    /// Build configuration from defaults plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an override variable holds an unparseable value
    /// or no platform data directory can be resolved.
    pub fn from_env() -> ConfigResult<Self> {
        let data_dir = match std::env::var("MNEMO_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::data_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join("mnemo"),
        };

        let config = Self {
            database: DatabaseConfig {
                path: match std::env::var("MNEMO_DB_PATH") {
                    Ok(path) => PathBuf::from(path),
                    Err(_) => data_dir.join(DEFAULT_DB_FILE_NAME),
                },
                max_connections: env_parse("MNEMO_DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
                busy_timeout: Duration::from_secs(env_parse(
                    "MNEMO_DB_BUSY_TIMEOUT_SECS",
                    DEFAULT_DB_BUSY_TIMEOUT_SECS,
                )?),
                auto_migrate: env_parse("MNEMO_AUTO_MIGRATE", DEFAULT_AUTO_MIGRATE)?,
            },
            queue: QueueConfig {
                concurrency: env_parse("MNEMO_QUEUE_CONCURRENCY", DEFAULT_QUEUE_CONCURRENCY)?,
                poll_interval: Duration::from_millis(env_parse(
                    "MNEMO_QUEUE_POLL_INTERVAL_MS",
                    DEFAULT_QUEUE_POLL_INTERVAL_MS,
                )?),
                max_retries: env_parse("MNEMO_QUEUE_MAX_RETRIES", DEFAULT_QUEUE_MAX_RETRIES)?,
                retry_delay: Duration::from_millis(env_parse(
                    "MNEMO_QUEUE_RETRY_DELAY_MS",
                    DEFAULT_QUEUE_RETRY_DELAY_MS,
                )?),
            },
            embedder: EmbedderConfig {
                interval: Duration::from_millis(env_parse(
                    "MNEMO_EMBEDDER_INTERVAL_MS",
                    DEFAULT_EMBEDDER_INTERVAL_MS,
                )?),
                model: std::env::var("MNEMO_EMBEDDING_MODEL")
                    .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string()),
            },
            intake: IntakeConfig {
                max_file_size_bytes: env_parse(
                    "MNEMO_MAX_FILE_SIZE_BYTES",
                    DEFAULT_MAX_FILE_SIZE_BYTES,
                )?,
                fetch_timeout: Duration::from_secs(env_parse(
                    "MNEMO_FETCH_TIMEOUT_SECS",
                    DEFAULT_FETCH_TIMEOUT_SECS,
                )?),
                data_dir,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated constraint.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.queue.concurrency == 0 {
            return Err(ConfigError::Validation(
                "queue.concurrency must be at least 1".into(),
            ));
        }
        if self.queue.poll_interval.is_zero() {
            return Err(ConfigError::Validation(
                "queue.poll_interval must be non-zero".into(),
            ));
        }
        if self.embedder.interval.is_zero() {
            return Err(ConfigError::Validation(
                "embedder.interval must be non-zero".into(),
            ));
        }
        if self.embedder.model.is_empty() {
            return Err(ConfigError::Validation(
                "embedder.model must not be empty".into(),
            ));
        }
        if self.intake.max_file_size_bytes == 0 {
            return Err(ConfigError::Validation(
                "intake.max_file_size_bytes must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Parse an environment variable with a typed default.
fn env_parse<T>(variable: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(variable) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            variable: variable.to_string(),
            message: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ApplicationConfig {
        ApplicationConfig {
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/mnemo-test.sqlite3"),
                max_connections: DEFAULT_DB_MAX_CONNECTIONS,
                busy_timeout: Duration::from_secs(DEFAULT_DB_BUSY_TIMEOUT_SECS),
                auto_migrate: true,
            },
            queue: QueueConfig::default(),
            embedder: EmbedderConfig::default(),
            intake: IntakeConfig {
                max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
                fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
                data_dir: PathBuf::from("/tmp/mnemo-test"),
            },
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = test_config();
        config.queue.concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn empty_model_rejected() {
        let mut config = test_config();
        config.embedder.model.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_queue_matches_documented_values() {
        let queue = QueueConfig::default();
        assert_eq!(queue.concurrency, 4);
        assert_eq!(queue.poll_interval, Duration::from_secs(5));
        assert_eq!(queue.max_retries, 3);
        assert_eq!(queue.retry_delay, Duration::from_secs(60));
    }
}
