//! API error envelope
//!
//! Every failure surfaces as the stable JSON shape: status, error type,
//! message, structured details, and the remedial actions a client can offer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use docview_core::ErrorKind;
use docview_engine::EngineError;

/// An API-level failure carrying its HTTP status and error envelope.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error_type: String,
    pub message: String,
    pub details: Option<Value>,
    pub user_actions: Value,
}

impl ApiError {
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = match kind {
            ErrorKind::FileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::UnsupportedFormat
            | ErrorKind::EstimatedTimeExceedsBudget
            | ErrorKind::BadRequest
            | ErrorKind::LowQuality => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            error_type: kind.as_str().to_string(),
            message: message.into(),
            details: None,
            user_actions: json!(kind.user_actions()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error_type: "not_found".to_string(),
            message: message.into(),
            details: None,
            user_actions: json!([]),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::BadRequest, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let kind = e.kind();
        let mut error = match &e {
            EngineError::DocumentNotFound(id) => {
                ApiError::not_found(format!("document not found: {}", id))
            }
            EngineError::IntermediateMissing(id) => ApiError::bad_request(format!(
                "intermediate results are not ready for document {}",
                id
            )),
            _ => ApiError::from_kind(kind, e.to_string()),
        };
        if let EngineError::View { view, source } = &e {
            error = error.with_details(json!({
                "step": view.as_str(),
                "reason": source.gateway_classification().unwrap_or(kind.as_str()),
            }));
        }
        error
    }
}

impl From<docview_store::StoreError> for ApiError {
    fn from(e: docview_store::StoreError) -> Self {
        ApiError::from_kind(ErrorKind::ServerError, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "status": "failed",
            "error_type": self.error_type,
            "error_message": self.message,
            "error_details": self.details.unwrap_or_else(|| json!({})),
            "user_actions": self.user_actions,
        });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from_kind(ErrorKind::FileTooLarge, "big").status,
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from_kind(ErrorKind::UnsupportedFormat, "doc").status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from_kind(ErrorKind::AiCallFailed, "down").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::not_found("gone").status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_unsupported_format_actions_include_docx_conversion() {
        let error = ApiError::from_kind(ErrorKind::UnsupportedFormat, "legacy .doc");
        let actions = error.user_actions.as_array().unwrap();
        assert!(actions
            .iter()
            .any(|a| a["action"] == "convert_to_docx"));
    }
}
