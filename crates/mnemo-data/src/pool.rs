//! Database connection pool management

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::migrations::run_migrations;
use mnemo_config::DatabaseConfig;

/// Create the SQLite connection pool
///
/// Opens the database in WAL mode with foreign keys enforced. Writes
/// serialize on SQLite's single-writer lock; `busy_timeout` bounds how long
/// a contended connection waits before erroring.
///
/// # Errors
///
/// Returns an error if:
/// - The database directory cannot be created
/// - The database file cannot be opened or created
/// - Pool configuration parameters are invalid
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    if let Some(parent) = config.path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(config.busy_timeout)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .context("Failed to create database pool")?;

    Ok(pool)
}

/// Initialize database (create pool and run migrations)
///
/// # Errors
///
/// Returns an error if:
/// - Pool creation fails (see `create_pool` errors)
/// - Database migrations fail to run
pub async fn initialize_database(config: &DatabaseConfig) -> Result<SqlitePool> {
    let pool = create_pool(config).await?;

    if config.auto_migrate {
        run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;
    }

    Ok(pool)
}
