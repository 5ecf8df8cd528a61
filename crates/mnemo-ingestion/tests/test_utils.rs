//! Shared helpers for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use mnemo_config::QueueConfig;
use mnemo_data::{JobRepository, ObjectRepository, SqliteJobRepository, SqliteObjectRepository};

/// A fresh on-disk database with both repositories
pub struct TestStores {
    pub dir: tempfile::TempDir,
    pub pool: SqlitePool,
    pub jobs: Arc<dyn JobRepository>,
    pub objects: Arc<dyn ObjectRepository>,
}

pub async fn stores() -> TestStores {
    let dir = tempfile::tempdir().expect("tempdir");
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("integration.sqlite3"))
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .expect("pool");
    mnemo_data::run_migrations(&pool).await.expect("migrations");

    let jobs: Arc<dyn JobRepository> = Arc::new(SqliteJobRepository::new(pool.clone()));
    let objects: Arc<dyn ObjectRepository> = Arc::new(SqliteObjectRepository::new(pool.clone()));

    TestStores {
        dir,
        pool,
        jobs,
        objects,
    }
}

/// Queue configuration tuned for fast tests
pub fn fast_queue_config(concurrency: usize, max_retries: u32, retry_delay_ms: u64) -> QueueConfig {
    QueueConfig {
        concurrency,
        poll_interval: Duration::from_millis(20),
        max_retries,
        retry_delay: Duration::from_millis(retry_delay_ms),
    }
}

/// Poll `check` until it returns true or the timeout elapses
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
