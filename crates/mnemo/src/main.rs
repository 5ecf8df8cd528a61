//! mnemo ingestion service - composition root
//!
//! Explicitly constructs and owns every service: configuration, SQLite
//! pool, repositories, the ingestion queue with its per-type processors,
//! and the embedding worker. No module-level singletons. The language
//! model, vector store, and source fetcher are external collaborators;
//! the in-process development defaults are wired here and swapped for
//! real clients at deployment time.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use mnemo_config::ApplicationConfig;
use mnemo_data::{
    JobRepository, JobType, ObjectRepository, SqliteJobRepository, SqliteObjectRepository,
    initialize_database,
};
use mnemo_ingestion::{
    BookmarkBatchProcessor, EmbeddingWorker, IngestionQueue, JobProcessor, MockSourceFetcher,
    MockTextExtractor, PdfProcessor, SourceFetcher, TextExtractor, UrlProcessor,
};
use mnemo_llm::{ChunkingClient, MockChunkingClient};
use mnemo_vector_data::{MockVectorStore, VectorStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mnemo_common::initialize_environment();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ApplicationConfig::from_env().context("loading configuration")?;
    tracing::info!(
        database = %config.database.path.display(),
        data_dir = %config.intake.data_dir.display(),
        "starting mnemo ingestion service"
    );

    let pool = initialize_database(&config.database)
        .await
        .context("initializing database")?;
    let jobs: Arc<dyn JobRepository> = Arc::new(SqliteJobRepository::new(pool.clone()));
    let objects: Arc<dyn ObjectRepository> = Arc::new(SqliteObjectRepository::new(pool));

    // External collaborators (development defaults)
    let llm: Arc<dyn ChunkingClient> = Arc::new(MockChunkingClient::new());
    let vectors: Arc<dyn VectorStore> = Arc::new(MockVectorStore::new());
    let fetcher: Arc<dyn SourceFetcher> = Arc::new(MockSourceFetcher::new());
    let extractor: Arc<dyn TextExtractor> = Arc::new(MockTextExtractor::new());

    let queue = IngestionQueue::new(Arc::clone(&jobs), config.queue.clone());
    queue.register_processor(
        JobType::Url,
        Arc::new(UrlProcessor::new(
            Arc::clone(&jobs),
            Arc::clone(&objects),
            Arc::clone(&llm),
            fetcher,
            Arc::clone(&extractor),
        )) as Arc<dyn JobProcessor>,
    );
    queue.register_processor(
        JobType::Pdf,
        Arc::new(PdfProcessor::new(
            Arc::clone(&jobs),
            Arc::clone(&objects),
            Arc::clone(&llm),
            extractor,
            config.intake.clone(),
        )) as Arc<dyn JobProcessor>,
    );
    queue.register_processor(
        JobType::BookmarkBatch,
        Arc::new(BookmarkBatchProcessor::new(
            Arc::clone(&jobs),
            Arc::clone(&objects),
        )) as Arc<dyn JobProcessor>,
    );

    let worker = Arc::new(EmbeddingWorker::new(
        objects,
        jobs,
        llm,
        vectors,
        config.embedder.clone(),
    ));
    let worker_handle = tokio::spawn({
        let worker = Arc::clone(&worker);
        async move { worker.run().await }
    });

    queue.start();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");

    queue.stop().await;
    worker.stop();
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "embedding worker task panicked");
    }

    tracing::info!("mnemo ingestion service stopped");
    Ok(())
}
