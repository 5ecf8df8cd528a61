//! Database migration runner

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

/// Run all pending migrations
///
/// # Errors
///
/// Returns an error if a migration statement fails or the bookkeeping
/// table cannot be read or written.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create migrations table if it doesn't exist
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create migrations table")?;

    // Get list of applied migrations
    let applied: Vec<i64> = sqlx::query("SELECT version FROM schema_migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to fetch applied migrations")?
        .iter()
        .map(|row| row.get(0))
        .collect();

    // Migration definitions
    let migrations = vec![
        (
            1_i64,
            "initial_schema",
            include_str!("../migrations/001_initial_schema.sql"),
        ),
        (2, "indexes", include_str!("../migrations/002_indexes.sql")),
    ];

    // Apply pending migrations
    for (version, name, sql) in migrations {
        if applied.contains(&version) {
            tracing::debug!("Migration {} ({}) already applied", version, name);
            continue;
        }

        tracing::info!("Applying migration {} ({})", version, name);

        // Execute migration in a transaction
        let mut tx = pool.begin().await.context("Failed to start transaction")?;

        // SQLite executes one statement per query
        for statement in sql.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement.trim())
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to execute migration {version} ({name})"))?;
        }

        // Record the migration
        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)")
            .bind(version)
            .bind(name)
            .execute(&mut *tx)
            .await
            .context("Failed to record migration")?;

        tx.commit().await.context("Failed to commit migration")?;

        tracing::info!("Migration {} ({}) completed", version, name);
    }

    Ok(())
}
