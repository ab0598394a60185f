//! Core domain model for docview
//!
//! Shared types used by every other crate: identifiers, the three processing
//! views, document/task lifecycle rows, configuration, stable error kinds,
//! and progress events.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, UserAction};
pub use events::{ProgressEvent, ProgressEventType};
pub use types::{
    AiCallMetric, AiResultQuality, DetectionMethod, Document, DocumentId, DocumentStatus,
    DocumentViewProfile, FileType, IntermediateResult, ProcessingResult, ProcessingTask, Segment,
    TaskId, TaskStage, TaskStatus, View,
};
