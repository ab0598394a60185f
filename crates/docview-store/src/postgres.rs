//! Postgres store backed by sqlx.
//!
//! Queries are runtime-prepared; the schema is applied at startup. The
//! composite primary key on `processing_results (document_id, view)` and
//! the primary key on `intermediate_results (document_id)` are the
//! load-bearing uniqueness guarantees behind view independence.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

use docview_core::{
    AiCallMetric, AiResultQuality, DetectionMethod, Document, DocumentId, DocumentStatus,
    DocumentViewProfile, FileType, IntermediateResult, ProcessingResult, ProcessingTask, TaskId,
    TaskStage, TaskStatus, View,
};

use crate::store::{HistoryFilter, HistoryPage, Store};
use crate::{Result, StoreError};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS documents (
        id UUID PRIMARY KEY,
        filename TEXT NOT NULL,
        blob_path TEXT NOT NULL,
        file_size BIGINT NOT NULL,
        file_type TEXT NOT NULL,
        status TEXT NOT NULL,
        uploaded_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS processing_tasks (
        id UUID PRIMARY KEY,
        document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        stage TEXT NOT NULL,
        status TEXT NOT NULL,
        progress SMALLINT NOT NULL,
        current_stage TEXT NOT NULL,
        error_message TEXT,
        started_at TIMESTAMPTZ NOT NULL,
        finished_at TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_document
        ON processing_tasks (document_id, started_at DESC)",
    "CREATE TABLE IF NOT EXISTS intermediate_results (
        document_id UUID PRIMARY KEY REFERENCES documents(id) ON DELETE CASCADE,
        raw_text TEXT NOT NULL,
        preprocessed_text TEXT NOT NULL,
        segments JSONB NOT NULL,
        metadata JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS view_profiles (
        document_id UUID PRIMARY KEY REFERENCES documents(id) ON DELETE CASCADE,
        primary_view TEXT NOT NULL,
        enabled_views JSONB NOT NULL,
        detection_scores JSONB NOT NULL,
        detection_method TEXT NOT NULL,
        confidence DOUBLE PRECISION NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS processing_results (
        document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        view TEXT NOT NULL,
        result_data JSONB NOT NULL,
        is_primary BOOLEAN NOT NULL,
        processing_time_seconds DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (document_id, view)
    )",
    "CREATE TABLE IF NOT EXISTS ai_call_metrics (
        id BIGSERIAL PRIMARY KEY,
        call_type TEXT NOT NULL,
        status TEXT NOT NULL,
        response_time_ms BIGINT NOT NULL,
        error_type TEXT,
        retry_count INTEGER NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_metrics_created ON ai_call_metrics (created_at)",
    "CREATE TABLE IF NOT EXISTS ai_result_quality (
        id BIGSERIAL PRIMARY KEY,
        document_id UUID NOT NULL,
        view TEXT NOT NULL,
        field_completeness DOUBLE PRECISION NOT NULL,
        confidence_avg DOUBLE PRECISION NOT NULL,
        confidence_min DOUBLE PRECISION NOT NULL,
        confidence_max DOUBLE PRECISION NOT NULL,
        sources_count INTEGER NOT NULL,
        sources_completeness DOUBLE PRECISION NOT NULL,
        quality_score DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
];

/// Postgres-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and apply the schema.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("database schema applied");
        Ok(())
    }
}

fn parse<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse().map_err(StoreError::CorruptRow)
}

fn document_from_row(row: &PgRow) -> Result<Document> {
    Ok(Document {
        id: DocumentId::from_uuid(row.try_get("id")?),
        filename: row.try_get("filename")?,
        blob_path: row.try_get("blob_path")?,
        file_size: row.try_get::<i64, _>("file_size")? as u64,
        file_type: parse_file_type(&row.try_get::<String, _>("file_type")?)?,
        status: parse(&row.try_get::<String, _>("status")?)?,
        uploaded_at: row.try_get("uploaded_at")?,
    })
}

fn parse_file_type(raw: &str) -> Result<FileType> {
    FileType::from_filename(&format!("x.{}", raw))
        .ok_or_else(|| StoreError::CorruptRow(format!("unknown file type: {}", raw)))
}

fn task_from_row(row: &PgRow) -> Result<ProcessingTask> {
    Ok(ProcessingTask {
        id: TaskId::from_uuid(row.try_get("id")?),
        document_id: DocumentId::from_uuid(row.try_get("document_id")?),
        stage: parse(&row.try_get::<String, _>("stage")?)?,
        status: parse(&row.try_get::<String, _>("status")?)?,
        progress: row.try_get::<i16, _>("progress")?.clamp(0, 100) as u8,
        current_stage: row.try_get("current_stage")?,
        error_message: row.try_get("error_message")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

fn intermediate_from_row(row: &PgRow) -> Result<IntermediateResult> {
    Ok(IntermediateResult {
        document_id: DocumentId::from_uuid(row.try_get("document_id")?),
        raw_text: row.try_get("raw_text")?,
        preprocessed_text: row.try_get("preprocessed_text")?,
        segments: serde_json::from_value(row.try_get("segments")?)?,
        metadata: serde_json::from_value(row.try_get("metadata")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<DocumentViewProfile> {
    let method: String = row.try_get("detection_method")?;
    Ok(DocumentViewProfile {
        document_id: DocumentId::from_uuid(row.try_get("document_id")?),
        primary_view: parse(&row.try_get::<String, _>("primary_view")?)?,
        enabled_views: serde_json::from_value(row.try_get("enabled_views")?)?,
        detection_scores: serde_json::from_value(row.try_get("detection_scores")?)?,
        detection_method: parse::<DetectionMethod>(&method)?,
        confidence: row.try_get("confidence")?,
    })
}

fn result_from_row(row: &PgRow) -> Result<ProcessingResult> {
    Ok(ProcessingResult {
        document_id: DocumentId::from_uuid(row.try_get("document_id")?),
        view: parse(&row.try_get::<String, _>("view")?)?,
        result_data: row.try_get("result_data")?,
        is_primary: row.try_get("is_primary")?,
        processing_time_seconds: row.try_get("processing_time_seconds")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn create_document(&self, document: &Document) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (id, filename, blob_path, file_size, file_type, status, uploaded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(*document.id.as_uuid())
        .bind(&document.filename)
        .bind(&document.blob_path)
        .bind(document.file_size as i64)
        .bind(document.file_type.as_str())
        .bind(document.status.as_str())
        .bind(document.uploaded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn set_document_status(&self, id: DocumentId, status: DocumentStatus) -> Result<()> {
        sqlx::query("UPDATE documents SET status = $2 WHERE id = $1")
            .bind(*id.as_uuid())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        // Children go with the document via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM ai_result_quality WHERE document_id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_documents(&self, filter: &HistoryFilter) -> Result<HistoryPage> {
        let file_type = filter.file_type.map(|t| t.as_str().to_string());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents
             WHERE ($1::TEXT IS NULL OR file_type = $1)
               AND ($2::TIMESTAMPTZ IS NULL OR uploaded_at >= $2)
               AND ($3::TIMESTAMPTZ IS NULL OR uploaded_at <= $3)",
        )
        .bind(&file_type)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            "SELECT * FROM documents
             WHERE ($1::TEXT IS NULL OR file_type = $1)
               AND ($2::TIMESTAMPTZ IS NULL OR uploaded_at >= $2)
               AND ($3::TIMESTAMPTZ IS NULL OR uploaded_at <= $3)
             ORDER BY uploaded_at DESC
             LIMIT $4 OFFSET $5",
        )
        .bind(&file_type)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.page_size as i64)
        .bind(filter.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(document_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(HistoryPage {
            items,
            total: total as u64,
            page: filter.page.max(1),
            page_size: filter.page_size,
        })
    }

    async fn create_task(&self, task: &ProcessingTask) -> Result<()> {
        sqlx::query(
            "INSERT INTO processing_tasks
                 (id, document_id, stage, status, progress, current_stage, error_message, started_at, finished_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(*task.id.as_uuid())
        .bind(*task.document_id.as_uuid())
        .bind(task.stage.as_str())
        .bind(task.status.as_str())
        .bind(task.progress as i16)
        .bind(&task.current_stage)
        .bind(&task.error_message)
        .bind(task.started_at)
        .bind(task.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<ProcessingTask>> {
        let row = sqlx::query("SELECT * FROM processing_tasks WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn latest_task(&self, document_id: DocumentId) -> Result<Option<ProcessingTask>> {
        let row = sqlx::query(
            "SELECT * FROM processing_tasks WHERE document_id = $1
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(*document_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn set_task_progress(
        &self,
        id: TaskId,
        stage: TaskStage,
        progress: u8,
        current_stage: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE processing_tasks
             SET stage = $2, status = $3, progress = $4, current_stage = $5
             WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .bind(stage.as_str())
        .bind(TaskStatus::Running.as_str())
        .bind(progress.min(100) as i16)
        .bind(current_stage)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn terminalize_task(
        &self,
        id: TaskId,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE processing_tasks
             SET status = $2, error_message = $3, finished_at = $4,
                 progress = CASE WHEN $2 = 'completed' THEN 100 ELSE progress END
             WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .bind(status.as_str())
        .bind(error_message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_intermediate(&self, intermediate: &IntermediateResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO intermediate_results
                 (document_id, raw_text, preprocessed_text, segments, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (document_id) DO UPDATE SET
                 raw_text = EXCLUDED.raw_text,
                 preprocessed_text = EXCLUDED.preprocessed_text,
                 segments = EXCLUDED.segments,
                 metadata = EXCLUDED.metadata",
        )
        .bind(*intermediate.document_id.as_uuid())
        .bind(&intermediate.raw_text)
        .bind(&intermediate.preprocessed_text)
        .bind(serde_json::to_value(&intermediate.segments)?)
        .bind(serde_json::to_value(&intermediate.metadata)?)
        .bind(intermediate.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_intermediate(
        &self,
        document_id: DocumentId,
    ) -> Result<Option<IntermediateResult>> {
        let row = sqlx::query("SELECT * FROM intermediate_results WHERE document_id = $1")
            .bind(*document_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(intermediate_from_row).transpose()
    }

    async fn upsert_profile(&self, profile: &DocumentViewProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO view_profiles
                 (document_id, primary_view, enabled_views, detection_scores, detection_method, confidence)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (document_id) DO UPDATE SET
                 primary_view = EXCLUDED.primary_view,
                 enabled_views = EXCLUDED.enabled_views,
                 detection_scores = EXCLUDED.detection_scores,
                 detection_method = EXCLUDED.detection_method,
                 confidence = EXCLUDED.confidence",
        )
        .bind(*profile.document_id.as_uuid())
        .bind(profile.primary_view.as_str())
        .bind(serde_json::to_value(&profile.enabled_views)?)
        .bind(serde_json::to_value(&profile.detection_scores)?)
        .bind(profile.detection_method.as_str())
        .bind(profile.confidence)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_profile(&self, document_id: DocumentId) -> Result<Option<DocumentViewProfile>> {
        let row = sqlx::query("SELECT * FROM view_profiles WHERE document_id = $1")
            .bind(*document_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn upsert_result(&self, result: &ProcessingResult) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if result.is_primary {
            // At most one primary per document.
            sqlx::query(
                "UPDATE processing_results SET is_primary = FALSE
                 WHERE document_id = $1 AND view <> $2",
            )
            .bind(*result.document_id.as_uuid())
            .bind(result.view.as_str())
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            "INSERT INTO processing_results
                 (document_id, view, result_data, is_primary, processing_time_seconds, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (document_id, view) DO UPDATE SET
                 result_data = EXCLUDED.result_data,
                 is_primary = EXCLUDED.is_primary,
                 processing_time_seconds = EXCLUDED.processing_time_seconds,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(*result.document_id.as_uuid())
        .bind(result.view.as_str())
        .bind(&result.result_data)
        .bind(result.is_primary)
        .bind(result.processing_time_seconds)
        .bind(result.created_at)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_result(
        &self,
        document_id: DocumentId,
        view: View,
    ) -> Result<Option<ProcessingResult>> {
        let row = sqlx::query(
            "SELECT * FROM processing_results WHERE document_id = $1 AND view = $2",
        )
        .bind(*document_id.as_uuid())
        .bind(view.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(result_from_row).transpose()
    }

    async fn list_results(&self, document_id: DocumentId) -> Result<Vec<ProcessingResult>> {
        let rows = sqlx::query(
            "SELECT * FROM processing_results WHERE document_id = $1 ORDER BY view",
        )
        .bind(*document_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(result_from_row).collect()
    }

    async fn record_metric(&self, metric: &AiCallMetric) -> Result<()> {
        sqlx::query(
            "INSERT INTO ai_call_metrics
                 (call_type, status, response_time_ms, error_type, retry_count, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&metric.call_type)
        .bind(&metric.status)
        .bind(metric.response_time_ms as i64)
        .bind(&metric.error_type)
        .bind(metric.retry_count as i32)
        .bind(metric.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_quality(&self, quality: &AiResultQuality) -> Result<()> {
        sqlx::query(
            "INSERT INTO ai_result_quality
                 (document_id, view, field_completeness, confidence_avg, confidence_min,
                  confidence_max, sources_count, sources_completeness, quality_score, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(*quality.document_id.as_uuid())
        .bind(quality.view.as_str())
        .bind(quality.field_completeness)
        .bind(quality.confidence_avg)
        .bind(quality.confidence_min)
        .bind(quality.confidence_max)
        .bind(quality.sources_count as i32)
        .bind(quality.sources_completeness)
        .bind(quality.quality_score)
        .bind(quality.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sweep_metrics(&self, older_than_days: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(older_than_days as i64);
        let result = sqlx::query("DELETE FROM ai_call_metrics WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
