//! Progress events published by workers and streamed to clients.

use serde::{Deserialize, Serialize};

use crate::types::{DocumentId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    Progress,
    Completed,
    Error,
}

/// A single progress update for a processing task.
///
/// Delivery is best-effort; a dropped event never blocks the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: ProgressEventType,
    pub task_id: TaskId,
    pub document_id: DocumentId,
    pub progress: u8,
    pub current_stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ProgressEvent {
    pub fn progress(
        task_id: TaskId,
        document_id: DocumentId,
        progress: u8,
        current_stage: impl Into<String>,
    ) -> Self {
        Self {
            event_type: ProgressEventType::Progress,
            task_id,
            document_id,
            progress: progress.min(100),
            current_stage: current_stage.into(),
            status: None,
        }
    }

    pub fn completed(task_id: TaskId, document_id: DocumentId) -> Self {
        Self {
            event_type: ProgressEventType::Completed,
            task_id,
            document_id,
            progress: 100,
            current_stage: "done".to_string(),
            status: Some("completed".to_string()),
        }
    }

    pub fn error(
        task_id: TaskId,
        document_id: DocumentId,
        progress: u8,
        current_stage: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            event_type: ProgressEventType::Error,
            task_id,
            document_id,
            progress,
            current_stage: current_stage.into(),
            status: Some(status.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_clamped_to_100() {
        let event = ProgressEvent::progress(TaskId::new(), DocumentId::new(), 250, "step");
        assert_eq!(event.progress, 100);
    }

    #[test]
    fn test_completed_event_shape() {
        let event = ProgressEvent::completed(TaskId::new(), DocumentId::new());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "completed");
        assert_eq!(json["progress"], 100);
        assert_eq!(json["status"], "completed");
    }

    #[test]
    fn test_progress_event_omits_absent_status() {
        let event = ProgressEvent::progress(TaskId::new(), DocumentId::new(), 20, "extracted");
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("status").is_none());
    }
}
