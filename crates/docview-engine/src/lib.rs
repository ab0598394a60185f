//! Processing engine for docview
//!
//! Consumes document jobs from a queue, drives extraction through the view
//! scripts, and enforces the scheduling discipline: the primary view runs
//! synchronously in the owning worker and commits first; secondary views fan
//! out concurrently, each committing its own single-row result. Progress is
//! pushed through an in-memory broker, best-effort.

pub mod broker;
pub mod engine;
pub mod metrics;
pub mod queue;
pub mod switch;
pub mod worker;

pub use broker::ProgressBroker;
pub use engine::ViewEngine;
pub use metrics::{quality_of, StoreMetricSink};
pub use queue::{job_queue, Job, JobConsumer, JobQueue};
pub use switch::SwitchOutcome;
pub use worker::{CancelRegistry, WorkerPool};

use docview_core::{DocumentId, ErrorKind, View};
use docview_ingestion::IngestionError;
use docview_store::StoreError;
use docview_views::ViewError;

/// Error types for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("intermediate results missing for document {0}")]
    IntermediateMissing(DocumentId),

    #[error("no processor registered for view {0}")]
    UnregisteredView(View),

    #[error("extracted content has {chars} characters, over the {limit} ceiling")]
    ContentTooLarge { chars: usize, limit: usize },

    #[error("job queue is full")]
    QueueFull,

    #[error("job queue is closed")]
    QueueClosed,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("blob read failed: {0}")]
    Blob(#[from] std::io::Error),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error("view {view} failed: {source}")]
    View { view: View, source: ViewError },
}

impl EngineError {
    /// The stable error kind surfaced for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::DocumentNotFound(_) => ErrorKind::BadRequest,
            EngineError::IntermediateMissing(_) => ErrorKind::BadRequest,
            EngineError::UnregisteredView(_) => ErrorKind::BadRequest,
            EngineError::ContentTooLarge { .. } => ErrorKind::FileTooLarge,
            EngineError::QueueFull | EngineError::QueueClosed => ErrorKind::ServerError,
            EngineError::Store(_) => ErrorKind::ServerError,
            EngineError::Blob(_) => ErrorKind::ExtractionFailed,
            EngineError::Ingestion(e) => e.kind(),
            EngineError::View { source, .. } => source.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
