use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde_json::json;

use crate::catalog::CatalogError;
use crate::http;

pub type ApiResult<T> = Result<T, ApiError>;

/// Endpoint-level failures, each rendered as a JSON body with `error`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid sticker selection: {0}")]
    Validation(String),

    #[error("Request body too large: max {0} bytes")]
    PayloadTooLarge(u64),

    #[error("Failed to read media files")]
    CatalogUnavailable(#[from] CatalogError),

    #[error("Sticker matching failed")]
    ProcessFailed { details: String },

    #[error("Failed to parse match result")]
    Parse(String),

    #[error("Sticker matching timed out")]
    Timeout,

    #[error("Request body not received in time")]
    BodyTimeout,

    #[error("Request processing timed out")]
    Deadline,

    #[error("Not found")]
    NotFound,

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Timeout | Self::BodyTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::Deadline => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::CatalogUnavailable(_)
            | Self::ProcessFailed { .. }
            | Self::Parse(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing body. Internal detail stays in the server log, except
    /// matcher stderr which is echoed as `details`.
    pub fn body(&self) -> serde_json::Value {
        match self {
            Self::ProcessFailed { details } => json!({
                "error": self.to_string(),
                "details": details,
            }),
            _ => json!({ "error": self.to_string() }),
        }
    }

    pub fn into_response(self, enable_cors: bool) -> Response<Full<Bytes>> {
        let status = self.status_code();
        match &self {
            Self::CatalogUnavailable(e) => crate::logger::log_error(&e.to_string()),
            Self::ProcessFailed { details } => {
                crate::logger::log_error(&format!("Matcher failed: {}", details.trim_end()));
            }
            Self::Parse(reason) => crate::logger::log_error(&format!("Parse error: {reason}")),
            Self::Internal(reason) => crate::logger::log_error(reason),
            _ => {}
        }
        http::json_response(status, &self.body(), enable_cors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Timeout.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            ApiError::Parse("empty".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::BodyTimeout.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            ApiError::Deadline.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_process_failure_echoes_details() {
        let body = ApiError::ProcessFailed {
            details: "Traceback: KeyError".into(),
        }
        .body();
        assert_eq!(body["error"], "Sticker matching failed");
        assert_eq!(body["details"], "Traceback: KeyError");
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let body = ApiError::Internal("worker panicked at src/x.rs".into()).body();
        assert_eq!(body, json!({"error": "Internal server error"}));
    }
}
