//! Job queue
//!
//! Bounded in-process queue of process-document jobs, shared by the worker
//! pool. The producer side lives in the ingestion API; consumers take jobs
//! one at a time.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use docview_core::{DocumentId, TaskId, View};

use crate::{EngineError, Result};

/// A process-document job.
#[derive(Debug, Clone)]
pub struct Job {
    pub document_id: DocumentId,
    pub task_id: TaskId,
    /// Caller-provided view override; `None` lets the classifier decide.
    pub enabled_views_hint: Option<Vec<View>>,
}

impl Job {
    pub fn new(document_id: DocumentId, task_id: TaskId) -> Self {
        Self {
            document_id,
            task_id,
            enabled_views_hint: None,
        }
    }

    pub fn with_views_hint(mut self, views: Vec<View>) -> Self {
        self.enabled_views_hint = Some(views);
        self
    }
}

/// Producer handle.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Enqueue without blocking the caller.
    pub fn enqueue(&self, job: Job) -> Result<()> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EngineError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => EngineError::QueueClosed,
        })
    }
}

/// Consumer handle, cloneable across workers.
#[derive(Clone)]
pub struct JobConsumer {
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
}

impl JobConsumer {
    /// Next job, or `None` once all producers are gone.
    pub async fn next(&self) -> Option<Job> {
        self.rx.lock().await.recv().await
    }
}

/// Create a bounded queue.
pub fn job_queue(capacity: usize) -> (JobQueue, JobConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        JobQueue { tx },
        JobConsumer {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_and_consume() {
        let (queue, consumer) = job_queue(4);
        let job = Job::new(DocumentId::new(), TaskId::new());
        queue.enqueue(job.clone()).unwrap();

        let received = consumer.next().await.unwrap();
        assert_eq!(received.document_id, job.document_id);
        assert!(received.enabled_views_hint.is_none());
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let (queue, _consumer) = job_queue(1);
        queue.enqueue(Job::new(DocumentId::new(), TaskId::new())).unwrap();

        let result = queue.enqueue(Job::new(DocumentId::new(), TaskId::new()));
        assert!(matches!(result, Err(EngineError::QueueFull)));
    }

    #[tokio::test]
    async fn test_closed_queue_returns_none() {
        let (queue, consumer) = job_queue(1);
        drop(queue);
        assert!(consumer.next().await.is_none());
    }

    #[tokio::test]
    async fn test_views_hint_round_trip() {
        let (queue, consumer) = job_queue(1);
        let job = Job::new(DocumentId::new(), TaskId::new())
            .with_views_hint(vec![View::Learning, View::System]);
        queue.enqueue(job).unwrap();

        let received = consumer.next().await.unwrap();
        assert_eq!(
            received.enabled_views_hint,
            Some(vec![View::Learning, View::System])
        );
    }
}
