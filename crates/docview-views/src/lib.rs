//! Multi-view processing for docview
//!
//! A document is read through up to three views: learning, qa, and system.
//! This crate scores the views (classifier), runs each enabled view's fixed
//! LLM script (processors), and normalizes every field group with a
//! confidence re-score and resolved source citations.

pub mod classifier;
pub mod confidence;
pub mod learning;
pub mod postprocess;
pub mod processor;
pub mod qa;
pub mod sources;
pub mod system;

pub use classifier::{cache_key, type_mapping, Classification, ViewClassifier};
pub use confidence::{confidence_label, ConfidenceSignals, ConfidenceWeights, PenaltyFlags};
pub use processor::{ProcessContext, StepCallback, ViewProcessor, ViewRegistry};

use docview_core::ErrorKind;
use docview_llm::LlmError;

/// Error types for view processing
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("model call failed: {0}")]
    Gateway(#[from] LlmError),

    #[error("step '{0}' timed out")]
    StepTimeout(String),

    #[error("invalid step payload: {0}")]
    InvalidPayload(String),
}

impl ViewError {
    /// The stable error kind surfaced for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ViewError::Gateway(_) => ErrorKind::AiCallFailed,
            ViewError::StepTimeout(_) => ErrorKind::Timeout,
            ViewError::InvalidPayload(_) => ErrorKind::ParseError,
        }
    }

    /// Last observed gateway classification, for error details.
    pub fn gateway_classification(&self) -> Option<&'static str> {
        match self {
            ViewError::Gateway(e) => Some(e.classification()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ViewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let err = ViewError::Gateway(LlmError::Server("500".into()));
        assert_eq!(err.kind(), ErrorKind::AiCallFailed);
        assert_eq!(err.gateway_classification(), Some("server_error"));

        assert_eq!(ViewError::StepTimeout("x".into()).kind(), ErrorKind::Timeout);
        assert_eq!(
            ViewError::InvalidPayload("x".into()).kind(),
            ErrorKind::ParseError
        );
    }
}
