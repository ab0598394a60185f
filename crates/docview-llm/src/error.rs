use std::time::Duration;

use docview_core::ErrorKind;

/// Classified failure of a model call.
///
/// The classification decides retryability and maps onto the stable error
/// kinds surfaced to clients.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited")]
    RateLimit { retry_after: Option<Duration> },

    #[error("server error: {0}")]
    Server(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout(_) => true,
            LlmError::Network(_) => true,
            LlmError::RateLimit { .. } => true,
            LlmError::Server(_) => true,
            LlmError::ServiceUnavailable(_) => true,
            LlmError::BadRequest(_) => false,
            LlmError::Unauthorized => false,
            LlmError::InvalidResponse(_) => false,
        }
    }

    /// Internal classification name, recorded in call metrics.
    pub fn classification(&self) -> &'static str {
        match self {
            LlmError::Timeout(_) => "timeout",
            LlmError::Network(_) => "network_error",
            LlmError::RateLimit { .. } => "rate_limit",
            LlmError::Server(_) => "server_error",
            LlmError::ServiceUnavailable(_) => "service_unavailable",
            LlmError::BadRequest(_) => "bad_request",
            LlmError::Unauthorized => "unauthorized",
            LlmError::InvalidResponse(_) => "invalid_response",
        }
    }

    /// The stable error kind surfaced for this failure.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            LlmError::Timeout(_) => ErrorKind::Timeout,
            LlmError::Network(_) => ErrorKind::NetworkError,
            LlmError::RateLimit { .. } => ErrorKind::RateLimited,
            LlmError::Server(_) => ErrorKind::ServerError,
            LlmError::ServiceUnavailable(_) => ErrorKind::ServerError,
            LlmError::BadRequest(_) => ErrorKind::BadRequest,
            LlmError::Unauthorized => ErrorKind::Unauthorized,
            LlmError::InvalidResponse(_) => ErrorKind::ParseError,
        }
    }
}
