//! Full pipeline: enqueue -> fetch/parse -> embed -> linked corpus

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use mnemo_data::{JobOptions, JobStatus, JobType, ObjectStatus};
use mnemo_ingestion::{
    EmbeddingWorker, IngestionQueue, JobProcessor, MockSourceFetcher, MockTextExtractor,
    UrlProcessor,
};
use mnemo_config::EmbedderConfig;
use mnemo_llm::MockChunkingClient;
use mnemo_vector_data::MockVectorStore;
use test_utils::{fast_queue_config, stores, wait_until};

#[tokio::test]
async fn url_ingest_end_to_end() {
    let stores = stores().await;

    let fetcher = MockSourceFetcher::new();
    fetcher.stub("https://example.com/a", "Hello world. Goodbye world.");

    let queue = IngestionQueue::new(Arc::clone(&stores.jobs), fast_queue_config(2, 3, 10));
    let processor = UrlProcessor::new(
        Arc::clone(&stores.jobs),
        Arc::clone(&stores.objects),
        Arc::new(MockChunkingClient::new()),
        Arc::new(fetcher),
        Arc::new(MockTextExtractor::new()),
    );
    queue.register_processor(JobType::Url, Arc::new(processor) as Arc<dyn JobProcessor>);

    let vector_store = MockVectorStore::new();
    let worker = EmbeddingWorker::new(
        Arc::clone(&stores.objects),
        Arc::clone(&stores.jobs),
        Arc::new(MockChunkingClient::new()),
        Arc::new(vector_store.clone()),
        EmbedderConfig::default(),
    );

    // Stage one: the queue runs the processor to `vectorizing`
    queue.start();
    let job = queue
        .add_job(JobType::Url, "https://example.com/a", JobOptions::default())
        .await
        .expect("add_job");

    let jobs = Arc::clone(&stores.jobs);
    let parsed = wait_until(Duration::from_secs(5), || {
        let jobs = Arc::clone(&jobs);
        async move {
            jobs.get_by_id(job.id)
                .await
                .expect("get job")
                .is_some_and(|j| j.status == JobStatus::Vectorizing)
        }
    })
    .await;
    queue.stop().await;
    assert!(parsed, "processor should leave the job in vectorizing");

    let job_row = stores.jobs.get_by_id(job.id).await.unwrap().unwrap();
    let object_id = job_row.related_object_id.expect("related object attached");

    // Stage two: one embedding tick finishes the object and the job
    let processed = worker.tick().await.expect("tick");
    assert_eq!(processed, Some(object_id));

    let object = stores.objects.get_by_id(object_id).await.unwrap().unwrap();
    assert_eq!(object.status, ObjectStatus::Embedded);

    let chunks = stores.objects.get_chunks(object_id).await.unwrap();
    let contents: Vec<(i64, &str)> = chunks
        .iter()
        .map(|c| (c.chunk_idx, c.content.as_str()))
        .collect();
    assert_eq!(
        contents,
        vec![(0, "Hello world."), (1, "Goodbye world.")]
    );

    let links = stores.objects.get_links_for_object(object_id).await.unwrap();
    assert_eq!(links.len(), 2);
    assert_ne!(links[0].vector_id, links[1].vector_id);
    assert_eq!(links[0].chunk_id, chunks[0].id);
    assert_eq!(links[1].chunk_id, chunks[1].id);

    // The vector store saw both chunks with full relational context
    let stored = vector_store.stored_documents();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|(_, doc)| doc.metadata.object_id == object_id));
    assert!(
        stored
            .iter()
            .all(|(_, doc)| doc.metadata.source_uri.as_deref() == Some("https://example.com/a"))
    );

    // Terminal transition belongs to the embedding worker
    let job_row = stores.jobs.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(job_row.status, JobStatus::Completed);
    assert!(job_row.completed_at.is_some());
    assert_eq!(job_row.related_object_id, Some(object_id));
}

#[tokio::test]
async fn embedding_failure_fails_object_and_job() {
    let stores = stores().await;

    let fetcher = MockSourceFetcher::new();
    fetcher.stub("https://example.com/b", "Unlucky page text.");

    let queue = IngestionQueue::new(Arc::clone(&stores.jobs), fast_queue_config(2, 3, 10));
    let processor = UrlProcessor::new(
        Arc::clone(&stores.jobs),
        Arc::clone(&stores.objects),
        Arc::new(MockChunkingClient::new()),
        Arc::new(fetcher),
        Arc::new(MockTextExtractor::new()),
    );
    queue.register_processor(JobType::Url, Arc::new(processor) as Arc<dyn JobProcessor>);

    // A vector store that loses one write per batch
    let worker = EmbeddingWorker::new(
        Arc::clone(&stores.objects),
        Arc::clone(&stores.jobs),
        Arc::new(MockChunkingClient::new()),
        Arc::new(MockVectorStore::new().with_short_ids(1)),
        EmbedderConfig::default(),
    );

    queue.start();
    let job = queue
        .add_job(JobType::Url, "https://example.com/b", JobOptions::default())
        .await
        .expect("add_job");

    let jobs = Arc::clone(&stores.jobs);
    assert!(
        wait_until(Duration::from_secs(5), || {
            let jobs = Arc::clone(&jobs);
            async move {
                jobs.get_by_id(job.id)
                    .await
                    .expect("get job")
                    .is_some_and(|j| j.status == JobStatus::Vectorizing)
            }
        })
        .await
    );
    queue.stop().await;

    let object_id = stores
        .jobs
        .get_by_id(job.id)
        .await
        .unwrap()
        .unwrap()
        .related_object_id
        .unwrap();

    worker.tick().await.expect("tick");

    let object = stores.objects.get_by_id(object_id).await.unwrap().unwrap();
    assert_eq!(object.status, ObjectStatus::EmbeddingFailed);
    assert!(object.error_info.is_some());
    assert!(stores
        .objects
        .get_links_for_object(object_id)
        .await
        .unwrap()
        .is_empty());

    let job_row = stores.jobs.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(job_row.status, JobStatus::Failed);
    assert_eq!(job_row.failed_stage.as_deref(), Some("vectorizing"));
    assert!(job_row.completed_at.is_some());
}

#[tokio::test]
async fn worker_run_loop_stops_cooperatively() {
    let stores = stores().await;

    let worker = Arc::new(EmbeddingWorker::new(
        Arc::clone(&stores.objects),
        Arc::clone(&stores.jobs),
        Arc::new(MockChunkingClient::new()),
        Arc::new(MockVectorStore::new()),
        EmbedderConfig {
            interval: Duration::from_millis(20),
            model: "test-model".to_string(),
        },
    ));

    let handle = tokio::spawn({
        let worker = Arc::clone(&worker);
        async move { worker.run().await }
    });

    tokio::time::sleep(Duration::from_millis(60)).await;
    worker.stop();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker should stop promptly")
        .expect("worker task should not panic");
}
