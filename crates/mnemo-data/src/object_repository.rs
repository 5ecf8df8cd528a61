//! SQLite-backed repository for content objects, chunks, and embedding links
//!
//! Object status transitions are single conditional UPDATE statements; the
//! `parsed -> embedding` claim is a compare-and-set so the ingestion side
//! and the embedding worker can never both own an object.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{DatabaseError, DatabaseErrorExt, DatabaseOperation, DatabaseResult};
use crate::models::{
    ChunkInsert, EmbeddingLink, KnowledgeObject, NewObject, ObjectChunk, ObjectStatus, ObjectType,
};
use crate::traits::ObjectRepository;
use mnemo_common::truncate_error;

const OBJECT_COLUMNS: &str = "id, object_type, source_uri, file_hash, original_file_name, title, \
     status, cleaned_text, summary, parsed_content_json, ai_generated_metadata, tags_json, \
     propositions_json, error_info, internal_file_path, parsed_at, summary_generated_at, \
     last_accessed_at, created_at, updated_at";

const FAILED_STATUSES: &str = "'fetch_failed', 'parse_failed', 'embedding_failed', 'error'";

/// Repository for the content object lifecycle
pub struct SqliteObjectRepository {
    pool: SqlitePool,
}

impl SqliteObjectRepository {
    /// Create a new repository over an initialized pool
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn object_from_row(row: &SqliteRow) -> DatabaseResult<KnowledgeObject> {
    let operation = DatabaseOperation::Query {
        description: "decode_object_row".to_string(),
    };

    let id: String = row.get("id");
    let object_type: String = row.get("object_type");
    let status: String = row.get("status");

    Ok(KnowledgeObject {
        id: Uuid::parse_str(&id).map_err(|e| {
            DatabaseError::integrity(operation.clone(), format!("bad uuid '{id}': {e}"))
        })?,
        object_type: object_type
            .parse()
            .map_err(|e: String| DatabaseError::integrity(operation.clone(), e))?,
        source_uri: row.get("source_uri"),
        file_hash: row.get("file_hash"),
        original_file_name: row.get("original_file_name"),
        title: row.get("title"),
        status: status
            .parse()
            .map_err(|e: String| DatabaseError::integrity(operation.clone(), e))?,
        cleaned_text: row.get("cleaned_text"),
        summary: row.get("summary"),
        parsed_content_json: row.get("parsed_content_json"),
        ai_generated_metadata: row.get("ai_generated_metadata"),
        tags_json: row.get("tags_json"),
        propositions_json: row.get("propositions_json"),
        error_info: row.get("error_info"),
        internal_file_path: row.get("internal_file_path"),
        parsed_at: row.get("parsed_at"),
        summary_generated_at: row.get("summary_generated_at"),
        last_accessed_at: row.get("last_accessed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn chunk_from_row(row: &SqliteRow) -> DatabaseResult<ObjectChunk> {
    let operation = DatabaseOperation::Query {
        description: "decode_chunk_row".to_string(),
    };

    let object_id: String = row.get("object_id");

    Ok(ObjectChunk {
        id: row.get("id"),
        object_id: Uuid::parse_str(&object_id).map_err(|e| {
            DatabaseError::integrity(operation.clone(), format!("bad uuid '{object_id}': {e}"))
        })?,
        chunk_idx: row.get("chunk_idx"),
        content: row.get("content"),
        summary: row.get("summary"),
        tags_json: row.get("tags_json"),
        propositions_json: row.get("propositions_json"),
        token_count: row.get("token_count"),
        created_at: row.get("created_at"),
    })
}

fn link_from_row(row: &SqliteRow) -> EmbeddingLink {
    EmbeddingLink {
        id: row.get("id"),
        chunk_id: row.get("chunk_id"),
        model: row.get("model"),
        vector_id: row.get("vector_id"),
        created_at: row.get("created_at"),
    }
}

/// Bind a `NewObject` into the shared INSERT statement
fn insert_object_query(
    id: Uuid,
    object_type: ObjectType,
    status: ObjectStatus,
    now: DateTime<Utc>,
    object: &NewObject,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(
        r"
        INSERT INTO objects
            (id, object_type, source_uri, file_hash, original_file_name, title, status,
             cleaned_text, summary, parsed_content_json, ai_generated_metadata, tags_json,
             propositions_json, internal_file_path, parsed_at, summary_generated_at,
             created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)
        ",
    )
    .bind(id.to_string())
    .bind(object_type.to_string())
    .bind(&object.source_uri)
    .bind(&object.file_hash)
    .bind(&object.original_file_name)
    .bind(&object.title)
    .bind(status.to_string())
    .bind(&object.cleaned_text)
    .bind(&object.summary)
    .bind(&object.parsed_content_json)
    .bind(&object.ai_generated_metadata)
    .bind(&object.tags_json)
    .bind(&object.propositions_json)
    .bind(&object.internal_file_path)
    .bind(object.parsed_at)
    .bind(object.summary_generated_at)
    .bind(now)
}

fn materialize(
    id: Uuid,
    object_type: ObjectType,
    status: ObjectStatus,
    now: DateTime<Utc>,
    object: NewObject,
) -> KnowledgeObject {
    KnowledgeObject {
        id,
        object_type,
        source_uri: object.source_uri,
        file_hash: object.file_hash,
        original_file_name: object.original_file_name,
        title: object.title,
        status,
        cleaned_text: object.cleaned_text,
        summary: object.summary,
        parsed_content_json: object.parsed_content_json,
        ai_generated_metadata: object.ai_generated_metadata,
        tags_json: object.tags_json,
        propositions_json: object.propositions_json,
        error_info: None,
        internal_file_path: object.internal_file_path,
        parsed_at: object.parsed_at,
        summary_generated_at: object.summary_generated_at,
        last_accessed_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl ObjectRepository for SqliteObjectRepository {
    async fn create(&self, object: NewObject) -> DatabaseResult<KnowledgeObject> {
        let object_type = object.object_type.unwrap_or(ObjectType::Webpage);
        let status = object.status.unwrap_or(ObjectStatus::New);
        let operation = DatabaseOperation::CreateObject {
            object_type: object_type.to_string(),
        };

        let id = Uuid::new_v4();
        let now = Utc::now();

        insert_object_query(id, object_type, status, now, &object)
            .execute(&self.pool)
            .await
            .map_db_err(operation)?;

        Ok(materialize(id, object_type, status, now, object))
    }

    #[tracing::instrument(skip(self, object, seed))]
    async fn create_with_seed_chunk(
        &self,
        object: NewObject,
        seed: ChunkInsert,
    ) -> DatabaseResult<KnowledgeObject> {
        let object_type = object.object_type.unwrap_or(ObjectType::Webpage);
        let status = object.status.unwrap_or(ObjectStatus::Parsed);
        let operation = DatabaseOperation::Transaction {
            description: "create_object_with_seed_chunk".to_string(),
        };

        let id = Uuid::new_v4();
        let now = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_db_err(operation.clone())?;

        insert_object_query(id, object_type, status, now, &object)
            .execute(&mut *tx)
            .await
            .map_db_err(operation.clone())?;

        sqlx::query(
            r"
            INSERT INTO chunks
                (object_id, chunk_idx, content, summary, tags_json, propositions_json,
                 token_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(id.to_string())
        .bind(seed.chunk_idx)
        .bind(&seed.content)
        .bind(&seed.summary)
        .bind(&seed.tags_json)
        .bind(&seed.propositions_json)
        .bind(seed.token_count)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_db_err(operation.clone())?;

        tx.commit().await.map_err(|e| DatabaseError::TransactionRollback {
            operation: Box::new(operation),
            reason: "commit failed".to_string(),
            source: Some(e),
        })?;

        Ok(materialize(id, object_type, status, now, object))
    }

    async fn get_by_id(&self, id: Uuid) -> DatabaseResult<Option<KnowledgeObject>> {
        let operation = DatabaseOperation::GetObject { object_id: id };

        let row = sqlx::query(&format!("SELECT {OBJECT_COLUMNS} FROM objects WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_db_err(operation)?;

        row.as_ref().map(object_from_row).transpose()
    }

    async fn find_by_file_hash(
        &self,
        file_hash: &str,
    ) -> DatabaseResult<Option<KnowledgeObject>> {
        let operation = DatabaseOperation::FindObjectByHash;

        let row = sqlx::query(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects
             WHERE file_hash = ?1 AND status NOT IN ({FAILED_STATUSES})
             LIMIT 1"
        ))
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await
        .map_db_err(operation)?;

        row.as_ref().map(object_from_row).transpose()
    }

    async fn delete_failed_by_file_hash(&self, file_hash: &str) -> DatabaseResult<u64> {
        let operation = DatabaseOperation::FindObjectByHash;

        let result = sqlx::query(&format!(
            "DELETE FROM objects WHERE file_hash = ?1 AND status IN ({FAILED_STATUSES})"
        ))
        .bind(file_hash)
        .execute(&self.pool)
        .await
        .map_db_err(operation)?;

        Ok(result.rows_affected())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ObjectStatus,
        parsed_at: Option<DateTime<Utc>>,
        error_info: Option<&str>,
    ) -> DatabaseResult<()> {
        let operation = DatabaseOperation::UpdateObjectStatus { object_id: id };

        sqlx::query(
            r"
            UPDATE objects
            SET status = ?2,
                parsed_at = COALESCE(?3, parsed_at),
                error_info = ?4,
                updated_at = ?5
            WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .bind(status.to_string())
        .bind(parsed_at)
        .bind(error_info.map(truncate_error))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_db_err(operation)?;

        Ok(())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: ObjectStatus,
        to: ObjectStatus,
    ) -> DatabaseResult<bool> {
        let operation = DatabaseOperation::TransitionObjectStatus { object_id: id };

        let result = sqlx::query(
            r"
            UPDATE objects
            SET status = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?2
            ",
        )
        .bind(id.to_string())
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_db_err(operation)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_next_by_status(
        &self,
        status: ObjectStatus,
        limit: usize,
    ) -> DatabaseResult<Vec<KnowledgeObject>> {
        let operation = DatabaseOperation::NextObjectsByStatus {
            status: status.to_string(),
        };

        let rows = sqlx::query(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects
             WHERE status = ?1
             ORDER BY created_at ASC
             LIMIT ?2"
        ))
        .bind(status.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_db_err(operation)?;

        rows.iter().map(object_from_row).collect()
    }

    async fn delete_object(&self, id: Uuid) -> DatabaseResult<bool> {
        let operation = DatabaseOperation::DeleteObject { object_id: id };

        let result = sqlx::query("DELETE FROM objects WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_db_err(operation)?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self, chunks), fields(chunk_count = chunks.len()))]
    async fn insert_chunks(
        &self,
        object_id: Uuid,
        chunks: Vec<ChunkInsert>,
    ) -> DatabaseResult<u64> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let operation = DatabaseOperation::InsertChunks {
            object_id,
            chunk_count: chunks.len(),
        };

        let now = Utc::now();
        let count = chunks.len() as u64;

        // One transaction for the whole batch: chunks for an object land
        // together or not at all
        let mut tx = self.pool.begin().await.map_db_err(operation.clone())?;

        for chunk in chunks {
            sqlx::query(
                r"
                INSERT INTO chunks
                    (object_id, chunk_idx, content, summary, tags_json, propositions_json,
                     token_count, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
            )
            .bind(object_id.to_string())
            .bind(chunk.chunk_idx)
            .bind(&chunk.content)
            .bind(&chunk.summary)
            .bind(&chunk.tags_json)
            .bind(&chunk.propositions_json)
            .bind(chunk.token_count)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_db_err(operation.clone())?;
        }

        tx.commit().await.map_err(|e| DatabaseError::TransactionRollback {
            operation: Box::new(operation),
            reason: "commit failed".to_string(),
            source: Some(e),
        })?;

        Ok(count)
    }

    async fn get_chunks(&self, object_id: Uuid) -> DatabaseResult<Vec<ObjectChunk>> {
        let operation = DatabaseOperation::GetChunks { object_id };

        let rows = sqlx::query(
            r"
            SELECT id, object_id, chunk_idx, content, summary, tags_json, propositions_json,
                   token_count, created_at
            FROM chunks
            WHERE object_id = ?1
            ORDER BY chunk_idx
            ",
        )
        .bind(object_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_db_err(operation)?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn insert_embedding_link(
        &self,
        chunk_id: i64,
        model: &str,
        vector_id: &str,
    ) -> DatabaseResult<EmbeddingLink> {
        let operation = DatabaseOperation::InsertEmbeddingLink { chunk_id };

        // ON CONFLICT DO NOTHING covers both unique keys; a conflicting
        // insert resolves to the existing row below
        sqlx::query(
            r"
            INSERT INTO embeddings (chunk_id, model, vector_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(chunk_id)
        .bind(model)
        .bind(vector_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_db_err(operation.clone())?;

        let row = sqlx::query(
            r"
            SELECT id, chunk_id, model, vector_id, created_at
            FROM embeddings
            WHERE vector_id = ?1 OR (chunk_id = ?2 AND model = ?3)
            LIMIT 1
            ",
        )
        .bind(vector_id)
        .bind(chunk_id)
        .bind(model)
        .fetch_optional(&self.pool)
        .await
        .map_db_err(operation.clone())?;

        row.map(|r| link_from_row(&r)).ok_or_else(|| {
            DatabaseError::integrity(operation, "link row missing after idempotent insert")
        })
    }

    async fn get_links_for_object(&self, object_id: Uuid) -> DatabaseResult<Vec<EmbeddingLink>> {
        let operation = DatabaseOperation::GetEmbeddingLinks { object_id };

        let rows = sqlx::query(
            r"
            SELECT e.id, e.chunk_id, e.model, e.vector_id, e.created_at
            FROM embeddings e
            JOIN chunks c ON c.id = e.chunk_id
            WHERE c.object_id = ?1
            ORDER BY c.chunk_idx
            ",
        )
        .bind(object_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_db_err(operation)?;

        Ok(rows.iter().map(link_from_row).collect())
    }

    async fn count_by_status(&self) -> DatabaseResult<HashMap<ObjectStatus, i64>> {
        let operation = DatabaseOperation::ObjectStats;

        let rows = sqlx::query("SELECT status, COUNT(*) as count FROM objects GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_db_err(operation.clone())?;

        let mut stats = HashMap::new();
        for row in rows {
            let status: String = row.get("status");
            let status = status
                .parse()
                .map_err(|e: String| DatabaseError::integrity(operation.clone(), e))?;
            stats.insert(status, row.get("count"));
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    async fn test_repo() -> (tempfile::TempDir, SqliteObjectRepository) {
        let dir = tempfile::tempdir().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("objects-test.sqlite3"))
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        (dir, SqliteObjectRepository::new(pool))
    }

    fn parsed_object(text: &str) -> NewObject {
        NewObject {
            object_type: Some(ObjectType::Webpage),
            source_uri: Some("https://example.com/a".to_string()),
            status: Some(ObjectStatus::Parsed),
            cleaned_text: Some(text.to_string()),
            parsed_at: Some(Utc::now()),
            ..NewObject::default()
        }
    }

    #[tokio::test]
    async fn seed_chunk_lands_with_object() {
        let (_dir, repo) = test_repo().await;

        let object = repo
            .create_with_seed_chunk(
                parsed_object("Hello world."),
                ChunkInsert {
                    chunk_idx: 0,
                    content: "Hello world.".to_string(),
                    summary: None,
                    tags_json: None,
                    propositions_json: None,
                    token_count: Some(3),
                },
            )
            .await
            .unwrap();

        assert_eq!(object.status, ObjectStatus::Parsed);

        let chunks = repo.get_chunks(object.id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_idx, 0);
        assert_eq!(chunks[0].content, "Hello world.");
        assert!(chunks[0].summary.is_none());
    }

    #[tokio::test]
    async fn transition_status_is_compare_and_set() {
        let (_dir, repo) = test_repo().await;
        let object = repo.create(parsed_object("text")).await.unwrap();

        assert!(
            repo.transition_status(object.id, ObjectStatus::Parsed, ObjectStatus::Embedding)
                .await
                .unwrap()
        );
        // Second claim loses the race
        assert!(
            !repo
                .transition_status(object.id, ObjectStatus::Parsed, ObjectStatus::Embedding)
                .await
                .unwrap()
        );

        let claimed = repo.get_by_id(object.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, ObjectStatus::Embedding);
    }

    #[tokio::test]
    async fn file_hash_identity_excludes_failed_rows() {
        let (_dir, repo) = test_repo().await;

        let mut object = parsed_object("pdf text");
        object.object_type = Some(ObjectType::PdfDocument);
        object.file_hash = Some("abc123".to_string());
        let created = repo.create(object).await.unwrap();

        assert!(repo.find_by_file_hash("abc123").await.unwrap().is_some());

        repo.update_status(created.id, ObjectStatus::EmbeddingFailed, None, Some("boom"))
            .await
            .unwrap();
        assert!(repo.find_by_file_hash("abc123").await.unwrap().is_none());

        assert_eq!(repo.delete_failed_by_file_hash("abc123").await.unwrap(), 1);
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunks_are_ordered_and_contiguous() {
        let (_dir, repo) = test_repo().await;
        let object = repo.create(parsed_object("text")).await.unwrap();

        let inserted = repo
            .insert_chunks(
                object.id,
                (0..3)
                    .map(|idx| ChunkInsert {
                        chunk_idx: idx,
                        content: format!("chunk {idx}"),
                        summary: None,
                        tags_json: None,
                        propositions_json: None,
                        token_count: None,
                    })
                    .collect(),
            )
            .await
            .unwrap();
        assert_eq!(inserted, 3);

        let chunks = repo.get_chunks(object.id).await.unwrap();
        let indices: Vec<i64> = chunks.iter().map(|c| c.chunk_idx).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn embedding_link_insert_is_idempotent() {
        let (_dir, repo) = test_repo().await;
        let object = repo.create(parsed_object("text")).await.unwrap();
        repo.insert_chunks(
            object.id,
            vec![ChunkInsert {
                chunk_idx: 0,
                content: "chunk".to_string(),
                summary: None,
                tags_json: None,
                propositions_json: None,
                token_count: None,
            }],
        )
        .await
        .unwrap();
        let chunks = repo.get_chunks(object.id).await.unwrap();
        let chunk_id = chunks[0].id;

        let first = repo
            .insert_embedding_link(chunk_id, "test-model", "v1")
            .await
            .unwrap();
        let second = repo
            .insert_embedding_link(chunk_id, "test-model", "v1")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.vector_id, "v1");

        let links = repo.get_links_for_object(object.id).await.unwrap();
        assert_eq!(links.len(), 1);
    }

    #[tokio::test]
    async fn delete_object_cascades_chunks_and_links() {
        let (_dir, repo) = test_repo().await;
        let object = repo.create(parsed_object("text")).await.unwrap();
        repo.insert_chunks(
            object.id,
            vec![ChunkInsert {
                chunk_idx: 0,
                content: "chunk".to_string(),
                summary: None,
                tags_json: None,
                propositions_json: None,
                token_count: None,
            }],
        )
        .await
        .unwrap();
        let chunk_id = repo.get_chunks(object.id).await.unwrap()[0].id;
        repo.insert_embedding_link(chunk_id, "test-model", "v1")
            .await
            .unwrap();

        assert!(repo.delete_object(object.id).await.unwrap());
        assert!(repo.get_chunks(object.id).await.unwrap().is_empty());
        assert!(repo.get_links_for_object(object.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn next_by_status_returns_oldest_first() {
        let (_dir, repo) = test_repo().await;
        let first = repo.create(parsed_object("one")).await.unwrap();
        let _second = repo.create(parsed_object("two")).await.unwrap();

        let next = repo
            .get_next_by_status(ObjectStatus::Parsed, 1)
            .await
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].id, first.id);
    }

    #[tokio::test]
    async fn status_counts() {
        let (_dir, repo) = test_repo().await;
        repo.create(parsed_object("a")).await.unwrap();
        let failed = repo.create(parsed_object("b")).await.unwrap();
        repo.update_status(failed.id, ObjectStatus::EmbeddingFailed, None, Some("x"))
            .await
            .unwrap();

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.get(&ObjectStatus::Parsed), Some(&1));
        assert_eq!(counts.get(&ObjectStatus::EmbeddingFailed), Some(&1));
    }
}
