//! In-memory store for tests and the `memory://` database URL.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use docview_core::{
    AiCallMetric, AiResultQuality, Document, DocumentId, DocumentStatus, DocumentViewProfile,
    IntermediateResult, ProcessingResult, ProcessingTask, TaskId, TaskStage, TaskStatus, View,
};

use crate::store::{HistoryFilter, HistoryPage, Store};
use crate::Result;

#[derive(Default)]
struct Inner {
    documents: HashMap<DocumentId, Document>,
    tasks: Vec<ProcessingTask>,
    intermediates: HashMap<DocumentId, IntermediateResult>,
    profiles: HashMap<DocumentId, DocumentViewProfile>,
    results: HashMap<(DocumentId, View), ProcessingResult>,
    metrics: Vec<AiCallMetric>,
    qualities: Vec<AiResultQuality>,
}

/// Store kept entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded call metrics (test helper).
    pub fn metric_count(&self) -> usize {
        self.inner.read().metrics.len()
    }

    /// Number of recorded quality rows (test helper).
    pub fn quality_count(&self) -> usize {
        self.inner.read().qualities.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_document(&self, document: &Document) -> Result<()> {
        self.inner
            .write()
            .documents
            .insert(document.id, document.clone());
        Ok(())
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        Ok(self.inner.read().documents.get(&id).cloned())
    }

    async fn set_document_status(&self, id: DocumentId, status: DocumentStatus) -> Result<()> {
        if let Some(document) = self.inner.write().documents.get_mut(&id) {
            document.status = status;
        }
        Ok(())
    }

    async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let mut inner = self.inner.write();
        let existed = inner.documents.remove(&id).is_some();
        if existed {
            inner.tasks.retain(|t| t.document_id != id);
            inner.intermediates.remove(&id);
            inner.profiles.remove(&id);
            inner.results.retain(|(doc, _), _| *doc != id);
            inner.qualities.retain(|q| q.document_id != id);
        }
        Ok(existed)
    }

    async fn list_documents(&self, filter: &HistoryFilter) -> Result<HistoryPage> {
        let inner = self.inner.read();
        let mut matching: Vec<Document> = inner
            .documents
            .values()
            .filter(|d| filter.file_type.map_or(true, |t| d.file_type == t))
            .filter(|d| filter.start_date.map_or(true, |s| d.uploaded_at >= s))
            .filter(|d| filter.end_date.map_or(true, |e| d.uploaded_at <= e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.page_size as usize)
            .collect();

        Ok(HistoryPage {
            items,
            total,
            page: filter.page.max(1),
            page_size: filter.page_size,
        })
    }

    async fn create_task(&self, task: &ProcessingTask) -> Result<()> {
        self.inner.write().tasks.push(task.clone());
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<ProcessingTask>> {
        Ok(self.inner.read().tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn latest_task(&self, document_id: DocumentId) -> Result<Option<ProcessingTask>> {
        Ok(self
            .inner
            .read()
            .tasks
            .iter()
            .filter(|t| t.document_id == document_id)
            .max_by_key(|t| t.started_at)
            .cloned())
    }

    async fn set_task_progress(
        &self,
        id: TaskId,
        stage: TaskStage,
        progress: u8,
        current_stage: &str,
    ) -> Result<()> {
        if let Some(task) = self.inner.write().tasks.iter_mut().find(|t| t.id == id) {
            task.stage = stage;
            task.status = TaskStatus::Running;
            task.progress = progress.min(100);
            task.current_stage = current_stage.to_string();
        }
        Ok(())
    }

    async fn terminalize_task(
        &self,
        id: TaskId,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        if let Some(task) = self.inner.write().tasks.iter_mut().find(|t| t.id == id) {
            task.status = status;
            task.error_message = error_message.map(String::from);
            task.finished_at = Some(Utc::now());
            if status == TaskStatus::Completed {
                task.progress = 100;
            }
        }
        Ok(())
    }

    async fn upsert_intermediate(&self, intermediate: &IntermediateResult) -> Result<()> {
        self.inner
            .write()
            .intermediates
            .insert(intermediate.document_id, intermediate.clone());
        Ok(())
    }

    async fn get_intermediate(
        &self,
        document_id: DocumentId,
    ) -> Result<Option<IntermediateResult>> {
        Ok(self.inner.read().intermediates.get(&document_id).cloned())
    }

    async fn upsert_profile(&self, profile: &DocumentViewProfile) -> Result<()> {
        self.inner
            .write()
            .profiles
            .insert(profile.document_id, profile.clone());
        Ok(())
    }

    async fn get_profile(&self, document_id: DocumentId) -> Result<Option<DocumentViewProfile>> {
        Ok(self.inner.read().profiles.get(&document_id).cloned())
    }

    async fn upsert_result(&self, result: &ProcessingResult) -> Result<()> {
        let mut inner = self.inner.write();
        if result.is_primary {
            // At most one primary per document.
            for ((doc, view), existing) in inner.results.iter_mut() {
                if *doc == result.document_id && *view != result.view {
                    existing.is_primary = false;
                }
            }
        }
        let key = (result.document_id, result.view);
        match inner.results.get_mut(&key) {
            Some(existing) => {
                existing.result_data = result.result_data.clone();
                existing.is_primary = result.is_primary;
                existing.processing_time_seconds = result.processing_time_seconds;
                existing.updated_at = Utc::now();
            }
            None => {
                inner.results.insert(key, result.clone());
            }
        }
        Ok(())
    }

    async fn get_result(
        &self,
        document_id: DocumentId,
        view: View,
    ) -> Result<Option<ProcessingResult>> {
        Ok(self.inner.read().results.get(&(document_id, view)).cloned())
    }

    async fn list_results(&self, document_id: DocumentId) -> Result<Vec<ProcessingResult>> {
        let mut results: Vec<ProcessingResult> = self
            .inner
            .read()
            .results
            .values()
            .filter(|r| r.document_id == document_id)
            .cloned()
            .collect();
        results.sort_by_key(|r| r.view);
        Ok(results)
    }

    async fn record_metric(&self, metric: &AiCallMetric) -> Result<()> {
        self.inner.write().metrics.push(metric.clone());
        Ok(())
    }

    async fn record_quality(&self, quality: &AiResultQuality) -> Result<()> {
        self.inner.write().qualities.push(quality.clone());
        Ok(())
    }

    async fn sweep_metrics(&self, older_than_days: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(older_than_days as i64);
        let mut inner = self.inner.write();
        let before = inner.metrics.len();
        inner.metrics.retain(|m| m.created_at >= cutoff);
        Ok((before - inner.metrics.len()) as u64)
    }
}
