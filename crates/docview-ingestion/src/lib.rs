//! Document ingestion for docview
//!
//! Turns uploaded blobs into view-agnostic text artifacts in three pure
//! steps: extraction (format-specific), preprocessing (normalization), and
//! segmentation (stable numbered paragraphs used for source citations).
//!
//! Nothing in this crate touches the database or the network.

pub mod estimate;
pub mod extractors;
pub mod preprocess;
pub mod segment;

pub use estimate::estimated_processing_secs;
pub use extractors::{Extractor, ExtractorRegistry};
pub use preprocess::Preprocessor;
pub use segment::Segmenter;

use docview_core::ErrorKind;

/// Error types for ingestion operations
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("Unsupported document type: {0}")]
    UnsupportedType(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("File corrupted: {0}")]
    FileCorrupted(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Document content is empty after preprocessing")]
    LowQuality,
}

impl IngestionError {
    /// The stable error kind surfaced for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestionError::UnsupportedType(_) => ErrorKind::UnsupportedFormat,
            IngestionError::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            IngestionError::FileCorrupted(_) => ErrorKind::FileCorrupted,
            IngestionError::EncodingError(_) => ErrorKind::ExtractionFailed,
            IngestionError::LowQuality => ErrorKind::LowQuality,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            IngestionError::UnsupportedType("doc".into()).kind(),
            ErrorKind::UnsupportedFormat
        );
        assert_eq!(IngestionError::LowQuality.kind(), ErrorKind::LowQuality);
        assert_eq!(
            IngestionError::FileCorrupted("bad zip".into()).kind(),
            ErrorKind::FileCorrupted
        );
    }
}
