//! SQLite-backed repository for the persisted job queue
//!
//! All status transitions are single conditional UPDATE statements so
//! concurrent repositories sharing the store cannot double-claim a job.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{DatabaseError, DatabaseErrorExt, DatabaseOperation, DatabaseResult};
use crate::models::{IngestionJob, JobOptions, JobStatus, JobType, JobUpdate};
use crate::traits::JobRepository;
use mnemo_common::truncate_error;

const JOB_COLUMNS: &str = "id, job_type, source_identifier, original_file_name, priority, status, \
     attempts, last_attempt_at, next_attempt_at, completed_at, error_info, failed_stage, \
     job_specific_data, related_object_id, created_at, updated_at";

/// Repository for ingestion job persistence
pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    /// Create a new repository over an initialized pool
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_uuid(operation: &DatabaseOperation, raw: &str) -> DatabaseResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| DatabaseError::integrity(operation.clone(), format!("bad uuid '{raw}': {e}")))
}

fn job_from_row(row: &SqliteRow) -> DatabaseResult<IngestionJob> {
    let operation = DatabaseOperation::Query {
        description: "decode_job_row".to_string(),
    };

    let id: String = row.get("id");
    let job_type: String = row.get("job_type");
    let status: String = row.get("status");
    let job_specific_data: Option<String> = row.get("job_specific_data");
    let related_object_id: Option<String> = row.get("related_object_id");

    Ok(IngestionJob {
        id: parse_uuid(&operation, &id)?,
        job_type: job_type
            .parse()
            .map_err(|e: String| DatabaseError::integrity(operation.clone(), e))?,
        source_identifier: row.get("source_identifier"),
        original_file_name: row.get("original_file_name"),
        priority: row.get("priority"),
        status: status
            .parse()
            .map_err(|e: String| DatabaseError::integrity(operation.clone(), e))?,
        attempts: row.get("attempts"),
        last_attempt_at: row.get("last_attempt_at"),
        next_attempt_at: row.get("next_attempt_at"),
        completed_at: row.get("completed_at"),
        error_info: row.get("error_info"),
        failed_stage: row.get("failed_stage"),
        job_specific_data: job_specific_data
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|e| {
                    DatabaseError::integrity(operation.clone(), format!("bad job payload: {e}"))
                })
            })
            .transpose()?,
        related_object_id: related_object_id
            .map(|raw| parse_uuid(&operation, &raw))
            .transpose()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn create(
        &self,
        job_type: JobType,
        source_identifier: &str,
        options: JobOptions,
    ) -> DatabaseResult<IngestionJob> {
        let operation = DatabaseOperation::CreateJob {
            job_type: job_type.to_string(),
        };

        let id = Uuid::new_v4();
        let now = Utc::now();
        let payload = options
            .job_specific_data
            .as_ref()
            .map(serde_json::Value::to_string);

        sqlx::query(
            r"
            INSERT INTO ingestion_jobs
                (id, job_type, source_identifier, original_file_name, priority, status,
                 attempts, job_specific_data, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 'queued', 0, ?6, ?7, ?7)
            ",
        )
        .bind(id.to_string())
        .bind(job_type.to_string())
        .bind(source_identifier)
        .bind(&options.original_file_name)
        .bind(options.priority.unwrap_or(0))
        .bind(&payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_db_err(operation)?;

        Ok(IngestionJob {
            id,
            job_type,
            source_identifier: source_identifier.to_string(),
            original_file_name: options.original_file_name,
            priority: options.priority.unwrap_or(0),
            status: JobStatus::Queued,
            attempts: 0,
            last_attempt_at: None,
            next_attempt_at: None,
            completed_at: None,
            error_info: None,
            failed_stage: None,
            job_specific_data: options.job_specific_data,
            related_object_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DatabaseResult<Option<IngestionJob>> {
        let operation = DatabaseOperation::GetJob { job_id: id };

        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM ingestion_jobs WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_db_err(operation)?;

        row.as_ref().map(job_from_row).transpose()
    }

    #[tracing::instrument(skip(self, allowed_types))]
    async fn get_next_jobs(
        &self,
        limit: usize,
        allowed_types: &[JobType],
    ) -> DatabaseResult<Vec<IngestionJob>> {
        if limit == 0 || allowed_types.is_empty() {
            return Ok(Vec::new());
        }

        let operation = DatabaseOperation::GetNextJobs { limit };

        // Build parameterized type list - the set of registered processors
        // varies per deployment
        let mut query_builder = sqlx::QueryBuilder::new(format!(
            "SELECT {JOB_COLUMNS} FROM ingestion_jobs
             WHERE (status = 'queued'
                    OR (status = 'retry_pending' AND next_attempt_at <= "
        ));
        query_builder.push_bind(Utc::now());
        query_builder.push(")) AND job_type IN (");

        for (idx, job_type) in allowed_types.iter().enumerate() {
            if idx > 0 {
                query_builder.push(", ");
            }
            query_builder.push_bind(job_type.to_string());
        }
        query_builder.push(") ORDER BY priority DESC, created_at ASC LIMIT ");
        query_builder.push_bind(limit as i64);

        let rows = query_builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_db_err(operation)?;

        rows.iter().map(job_from_row).collect()
    }

    async fn update(&self, id: Uuid, update: JobUpdate) -> DatabaseResult<bool> {
        let operation = DatabaseOperation::UpdateJob { job_id: id };

        let mut query_builder = sqlx::QueryBuilder::new("UPDATE ingestion_jobs SET updated_at = ");
        query_builder.push_bind(Utc::now());

        if let Some(status) = update.status {
            query_builder.push(", status = ");
            query_builder.push_bind(status.to_string());
        }
        if let Some(priority) = update.priority {
            query_builder.push(", priority = ");
            query_builder.push_bind(priority);
        }
        if let Some(payload) = &update.job_specific_data {
            query_builder.push(", job_specific_data = ");
            query_builder.push_bind(payload.to_string());
        }
        if let Some(object_id) = update.related_object_id {
            query_builder.push(", related_object_id = ");
            query_builder.push_bind(object_id.to_string());
        }

        query_builder.push(" WHERE id = ");
        query_builder.push_bind(id.to_string());

        let result = query_builder
            .build()
            .execute(&self.pool)
            .await
            .map_db_err(operation)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_as_started(&self, id: Uuid) -> DatabaseResult<bool> {
        let operation = DatabaseOperation::ClaimJob { job_id: id };

        // Conditional claim: a second scheduler instance observes zero rows
        // changed and must abandon the job
        let result = sqlx::query(
            r"
            UPDATE ingestion_jobs
            SET status = 'processing_source',
                attempts = attempts + 1,
                last_attempt_at = ?2,
                updated_at = ?2
            WHERE id = ?1 AND status IN ('queued', 'retry_pending')
            ",
        )
        .bind(id.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_db_err(operation)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_as_completed(
        &self,
        id: Uuid,
        related_object_id: Option<Uuid>,
    ) -> DatabaseResult<()> {
        let operation = DatabaseOperation::CompleteJob { job_id: id };

        sqlx::query(
            r"
            UPDATE ingestion_jobs
            SET status = 'completed',
                completed_at = ?2,
                updated_at = ?2,
                related_object_id = COALESCE(?3, related_object_id)
            WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .bind(Utc::now())
        .bind(related_object_id.map(|o| o.to_string()))
        .execute(&self.pool)
        .await
        .map_db_err(operation)?;

        Ok(())
    }

    async fn mark_as_failed(
        &self,
        id: Uuid,
        error_info: &str,
        failed_stage: Option<&str>,
    ) -> DatabaseResult<()> {
        let operation = DatabaseOperation::FailJob { job_id: id };

        sqlx::query(
            r"
            UPDATE ingestion_jobs
            SET status = 'failed',
                error_info = ?2,
                failed_stage = ?3,
                completed_at = ?4,
                updated_at = ?4
            WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .bind(truncate_error(error_info))
        .bind(failed_stage)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_db_err(operation)?;

        Ok(())
    }

    async fn mark_as_retryable(
        &self,
        id: Uuid,
        error_info: &str,
        failed_stage: Option<&str>,
        delay: Duration,
    ) -> DatabaseResult<()> {
        let operation = DatabaseOperation::ScheduleRetry { job_id: id };

        let now = Utc::now();
        let next_attempt_at = now
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));

        sqlx::query(
            r"
            UPDATE ingestion_jobs
            SET status = 'retry_pending',
                error_info = ?2,
                failed_stage = ?3,
                next_attempt_at = ?4,
                updated_at = ?5
            WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .bind(truncate_error(error_info))
        .bind(failed_stage)
        .bind(next_attempt_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_db_err(operation)?;

        Ok(())
    }

    async fn requeue(&self, id: Uuid) -> DatabaseResult<bool> {
        let operation = DatabaseOperation::UpdateJob { job_id: id };

        let result = sqlx::query(
            r"
            UPDATE ingestion_jobs
            SET status = 'queued',
                error_info = NULL,
                failed_stage = NULL,
                next_attempt_at = ?2,
                completed_at = NULL,
                updated_at = ?2
            WHERE id = ?1 AND status IN ('failed', 'retry_pending')
            ",
        )
        .bind(id.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_db_err(operation)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_as_cancelled(&self, id: Uuid) -> DatabaseResult<bool> {
        let operation = DatabaseOperation::UpdateJob { job_id: id };

        let result = sqlx::query(
            r"
            UPDATE ingestion_jobs
            SET status = 'cancelled',
                completed_at = ?2,
                updated_at = ?2
            WHERE id = ?1 AND status NOT IN ('completed', 'failed', 'cancelled')
            ",
        )
        .bind(id.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_db_err(operation)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_stats(&self) -> DatabaseResult<HashMap<JobStatus, i64>> {
        let operation = DatabaseOperation::JobStats;

        let rows = sqlx::query(
            "SELECT status, COUNT(*) as count FROM ingestion_jobs GROUP BY status",
        )
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

    async fn cleanup_old_jobs(&self, days: u32) -> DatabaseResult<u64> {
        let operation = DatabaseOperation::CleanupJobs { days };

        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));

        let result = sqlx::query(
            r"
            DELETE FROM ingestion_jobs
            WHERE status IN ('completed', 'failed', 'cancelled')
              AND completed_at IS NOT NULL
              AND completed_at < ?1
            ",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_db_err(operation)?;

        Ok(result.rows_affected())
    }

    async fn find_active_by_object(
        &self,
        object_id: Uuid,
    ) -> DatabaseResult<Option<IngestionJob>> {
        let operation = DatabaseOperation::FindJobByObject { object_id };

        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM ingestion_jobs
             WHERE related_object_id = ?1
               AND status NOT IN ('completed', 'failed', 'cancelled')
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(object_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_db_err(operation)?;

        row.as_ref().map(job_from_row).transpose()
    }
}
