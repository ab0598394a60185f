//! HTTP surface for docview
//!
//! REST endpoints under `/api/v1` plus the `/ws/progress/{task_id}` stream.
//! Handlers validate, translate between wire shapes and domain types, and
//! delegate to the engine, queue, and store; no processing logic lives here.

pub mod error;
pub mod handlers;
pub mod router;
pub mod ws;

pub use error::ApiError;
pub use router::create_router;

use std::sync::Arc;

use docview_core::AppConfig;
use docview_engine::{CancelRegistry, JobQueue, ProgressBroker, ViewEngine};
use docview_store::Store;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub engine: Arc<ViewEngine>,
    pub queue: JobQueue,
    pub broker: Arc<ProgressBroker>,
    pub cancels: Arc<CancelRegistry>,
    pub config: Arc<AppConfig>,
}
