//! Worker pool
//!
//! N workers consume the job queue. Each job runs under the wall-clock
//! ceiling and a per-document cancellation token; cancel and timeout both
//! abort in-flight model calls at their next suspension point.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use docview_core::{DocumentId, DocumentStatus, ProgressEvent, TaskStatus};
use docview_store::Store;

use crate::broker::ProgressBroker;
use crate::engine::ViewEngine;
use crate::queue::{Job, JobConsumer};

/// Per-document cancellation tokens for in-flight jobs.
#[derive(Default)]
pub struct CancelRegistry {
    tokens: DashMap<DocumentId, CancellationToken>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, document_id: DocumentId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.insert(document_id, token.clone());
        token
    }

    fn remove(&self, document_id: DocumentId) {
        self.tokens.remove(&document_id);
    }

    /// Cancel the active job for a document. Returns whether one was found.
    pub fn cancel(&self, document_id: DocumentId) -> bool {
        match self.tokens.get(&document_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Pool of processing workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers consuming `consumer`.
    pub fn spawn(
        count: usize,
        consumer: JobConsumer,
        engine: Arc<ViewEngine>,
        store: Arc<dyn Store>,
        broker: Arc<ProgressBroker>,
        cancels: Arc<CancelRegistry>,
        job_timeout: Duration,
    ) -> Self {
        let handles = (0..count.max(1))
            .map(|worker_id| {
                let consumer = consumer.clone();
                let engine = engine.clone();
                let store = store.clone();
                let broker = broker.clone();
                let cancels = cancels.clone();
                tokio::spawn(async move {
                    worker_loop(worker_id, consumer, engine, store, broker, cancels, job_timeout)
                        .await;
                })
            })
            .collect();
        Self { handles }
    }

    /// Wait for all workers to drain. Workers exit once every producer
    /// handle of the queue has been dropped.
    pub async fn shutdown(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    consumer: JobConsumer,
    engine: Arc<ViewEngine>,
    store: Arc<dyn Store>,
    broker: Arc<ProgressBroker>,
    cancels: Arc<CancelRegistry>,
    job_timeout: Duration,
) {
    info!(worker_id, "worker started");
    while let Some(job) = consumer.next().await {
        let token = cancels.register(job.document_id);
        debug!(worker_id, document_id = %job.document_id, "job picked up");

        tokio::select! {
            _ = token.cancelled() => {
                warn!(worker_id, document_id = %job.document_id, "job cancelled by user");
                terminalize(&store, &broker, &job, TaskStatus::Failed,
                            DocumentStatus::Failed, "cancelled").await;
            }
            outcome = tokio::time::timeout(job_timeout, engine.clone().run(job.clone())) => {
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        // The engine already terminalized the task.
                        debug!(worker_id, document_id = %job.document_id, error = %e, "job failed");
                    }
                    Err(_) => {
                        warn!(worker_id, document_id = %job.document_id, "job exceeded wall-clock ceiling");
                        terminalize(&store, &broker, &job, TaskStatus::Timeout,
                                    DocumentStatus::Timeout, "timeout").await;
                    }
                }
            }
        }

        cancels.remove(job.document_id);
    }
    info!(worker_id, "worker stopped");
}

async fn terminalize(
    store: &Arc<dyn Store>,
    broker: &Arc<ProgressBroker>,
    job: &Job,
    task_status: TaskStatus,
    document_status: DocumentStatus,
    reason: &str,
) {
    if let Err(e) = store
        .terminalize_task(job.task_id, task_status, Some(reason))
        .await
    {
        warn!(error = %e, "failed to terminalize task");
    }
    if let Err(e) = store
        .set_document_status(job.document_id, document_status)
        .await
    {
        warn!(error = %e, "failed to set document status");
    }
    broker.publish(ProgressEvent::error(
        job.task_id,
        job.document_id,
        0,
        reason,
        document_status.as_str(),
    ));
}
