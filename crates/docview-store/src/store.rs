use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docview_core::{
    AiCallMetric, AiResultQuality, Document, DocumentId, DocumentStatus, DocumentViewProfile,
    FileType, IntermediateResult, ProcessingResult, ProcessingTask, TaskId, TaskStage, TaskStatus,
    View,
};

use crate::Result;

/// Filter for the document history listing.
#[derive(Debug, Clone)]
pub struct HistoryFilter {
    pub page: u32,
    pub page_size: u32,
    pub file_type: Option<FileType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            file_type: None,
            start_date: None,
            end_date: None,
        }
    }
}

impl HistoryFilter {
    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1) * self.page_size as u64
    }
}

/// One page of the document history.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub items: Vec<Document>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Transactional persistence primitives used by every other component.
///
/// Contracts:
/// - `upsert_intermediate` keeps at most one row per document.
/// - `upsert_result` keeps at most one row per `(document_id, view)`.
/// - `delete_document` cascades to tasks, intermediates, profiles, results,
///   and quality rows.
/// - Metric recording is append-only and tolerant of retries.
#[async_trait]
pub trait Store: Send + Sync {
    // Documents
    async fn create_document(&self, document: &Document) -> Result<()>;
    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>>;
    async fn set_document_status(&self, id: DocumentId, status: DocumentStatus) -> Result<()>;
    async fn delete_document(&self, id: DocumentId) -> Result<bool>;
    async fn list_documents(&self, filter: &HistoryFilter) -> Result<HistoryPage>;

    // Tasks
    async fn create_task(&self, task: &ProcessingTask) -> Result<()>;
    async fn get_task(&self, id: TaskId) -> Result<Option<ProcessingTask>>;
    async fn latest_task(&self, document_id: DocumentId) -> Result<Option<ProcessingTask>>;
    async fn set_task_progress(
        &self,
        id: TaskId,
        stage: TaskStage,
        progress: u8,
        current_stage: &str,
    ) -> Result<()>;
    async fn terminalize_task(
        &self,
        id: TaskId,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    // Intermediates
    async fn upsert_intermediate(&self, intermediate: &IntermediateResult) -> Result<()>;
    async fn get_intermediate(&self, document_id: DocumentId) -> Result<Option<IntermediateResult>>;

    // View profiles
    async fn upsert_profile(&self, profile: &DocumentViewProfile) -> Result<()>;
    async fn get_profile(&self, document_id: DocumentId) -> Result<Option<DocumentViewProfile>>;

    // Per-view results
    async fn upsert_result(&self, result: &ProcessingResult) -> Result<()>;
    async fn get_result(
        &self,
        document_id: DocumentId,
        view: View,
    ) -> Result<Option<ProcessingResult>>;
    async fn list_results(&self, document_id: DocumentId) -> Result<Vec<ProcessingResult>>;

    // Metrics
    async fn record_metric(&self, metric: &AiCallMetric) -> Result<()>;
    async fn record_quality(&self, quality: &AiResultQuality) -> Result<()>;
    /// Delete metric rows older than the retention window. Returns the
    /// number of rows removed.
    async fn sweep_metrics(&self, older_than_days: u32) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_filter_offset() {
        let filter = HistoryFilter {
            page: 3,
            page_size: 20,
            ..Default::default()
        };
        assert_eq!(filter.offset(), 40);

        let first = HistoryFilter::default();
        assert_eq!(first.offset(), 0);

        let zero_page = HistoryFilter {
            page: 0,
            ..Default::default()
        };
        assert_eq!(zero_page.offset(), 0);
    }
}
