use serde::{Deserialize, Serialize};

/// Stable error kinds surfaced across the API, task rows, and metrics.
///
/// The wire strings returned by [`ErrorKind::as_str`] are part of the
/// external contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("unsupported format")]
    UnsupportedFormat,
    #[error("file too large")]
    FileTooLarge,
    #[error("estimated processing time exceeds budget")]
    EstimatedTimeExceedsBudget,
    #[error("extraction failed")]
    ExtractionFailed,
    #[error("document content quality too low")]
    LowQuality,
    #[error("response parse error")]
    ParseError,
    #[error("AI call failed")]
    AiCallFailed,
    #[error("operation timed out")]
    Timeout,
    #[error("rate limited by provider")]
    RateLimited,
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request")]
    BadRequest,
    #[error("server error")]
    ServerError,
    #[error("network error")]
    NetworkError,
    #[error("file corrupted")]
    FileCorrupted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::FileTooLarge => "file_too_large",
            ErrorKind::EstimatedTimeExceedsBudget => "estimated_time_exceeds_budget",
            ErrorKind::ExtractionFailed => "extraction_failed",
            ErrorKind::LowQuality => "low_quality",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::AiCallFailed => "ai_call_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::ServerError => "server_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::FileCorrupted => "file_corrupted",
        }
    }

    /// Remedial actions offered to the user for this kind of failure.
    pub fn user_actions(&self) -> Vec<UserAction> {
        match self {
            ErrorKind::UnsupportedFormat => vec![UserAction::convert_to_docx(), UserAction::re_upload()],
            ErrorKind::FileTooLarge => vec![UserAction::split_document(), UserAction::re_upload()],
            ErrorKind::EstimatedTimeExceedsBudget => vec![UserAction::split_document()],
            ErrorKind::ExtractionFailed | ErrorKind::FileCorrupted => {
                vec![UserAction::re_upload(), UserAction::convert_to_docx()]
            }
            ErrorKind::LowQuality => vec![UserAction::re_upload()],
            ErrorKind::ParseError | ErrorKind::AiCallFailed | ErrorKind::ServerError => {
                vec![UserAction::retry()]
            }
            ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::NetworkError => {
                vec![UserAction::retry()]
            }
            ErrorKind::Unauthorized | ErrorKind::BadRequest => vec![UserAction::check_config()],
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsupported_format" => Ok(ErrorKind::UnsupportedFormat),
            "file_too_large" => Ok(ErrorKind::FileTooLarge),
            "estimated_time_exceeds_budget" => Ok(ErrorKind::EstimatedTimeExceedsBudget),
            "extraction_failed" => Ok(ErrorKind::ExtractionFailed),
            "low_quality" => Ok(ErrorKind::LowQuality),
            "parse_error" => Ok(ErrorKind::ParseError),
            "ai_call_failed" => Ok(ErrorKind::AiCallFailed),
            "timeout" => Ok(ErrorKind::Timeout),
            "rate_limited" => Ok(ErrorKind::RateLimited),
            "unauthorized" => Ok(ErrorKind::Unauthorized),
            "bad_request" => Ok(ErrorKind::BadRequest),
            "server_error" => Ok(ErrorKind::ServerError),
            "network_error" => Ok(ErrorKind::NetworkError),
            "file_corrupted" => Ok(ErrorKind::FileCorrupted),
            other => Err(format!("unknown error kind: {}", other)),
        }
    }
}

/// A remedial action the client can offer for a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAction {
    pub action: String,
    pub label: String,
    pub description: String,
}

impl UserAction {
    fn new(action: &str, label: &str, description: &str) -> Self {
        Self {
            action: action.to_string(),
            label: label.to_string(),
            description: description.to_string(),
        }
    }

    pub fn retry() -> Self {
        Self::new("retry", "Retry", "Run processing again for this document")
    }

    pub fn convert_to_docx() -> Self {
        Self::new(
            "convert_to_docx",
            "Convert to DOCX",
            "Save the file as .docx and upload it again",
        )
    }

    pub fn re_upload() -> Self {
        Self::new("re_upload", "Upload again", "Upload a fresh copy of the file")
    }

    pub fn check_config() -> Self {
        Self::new(
            "check_config",
            "Check configuration",
            "Verify the AI service credentials and endpoint",
        )
    }

    pub fn split_document() -> Self {
        Self::new(
            "split_document",
            "Split the document",
            "Break the document into smaller parts and upload them separately",
        )
    }
}
