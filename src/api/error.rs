use crate::services::conversion_service::ConversionError;
use crate::services::rate_limiter::RateLimitExceeded;
use crate::services::staging::StagingError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No file attached")]
    MissingFile,

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Too Many Requests: retry after {0:?}")]
    TooManyRequests(Duration),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable reason sent in the `error` field
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::MissingFile => "no_file",
            AppError::ConversionFailed(_) => "conversion_failed",
            AppError::BadRequest(_) => "bad_request",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::TooManyRequests(_) => "rate_limited",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<ConversionError> for AppError {
    fn from(err: ConversionError) -> Self {
        match err {
            ConversionError::Staging(StagingError::TooLarge { limit }) => AppError::PayloadTooLarge(
                format!("File exceeds the maximum size of {} MB", limit / 1024 / 1024),
            ),
            ConversionError::Staging(StagingError::Io(e)) => {
                AppError::Internal(format!("Staging failed: {}", e))
            }
            ConversionError::Decode(e) => AppError::ConversionFailed(e.to_string()),
            ConversionError::DecoderUnavailable => {
                AppError::Internal("Decoder pool closed".to_string())
            }
        }
    }
}

impl From<RateLimitExceeded> for AppError {
    fn from(err: RateLimitExceeded) -> Self {
        AppError::TooManyRequests(err.retry_after)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let reason = self.reason();
        let (status, message) = match &self {
            AppError::MissingFile => (StatusCode::BAD_REQUEST, "No file attached".to_string()),
            AppError::ConversionFailed(detail) => {
                // The decoder's diagnostics stay in the server log
                tracing::error!("Conversion failed: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "File conversion failed".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            AppError::TooManyRequests(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many conversions, please wait before trying again".to_string(),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": reason,
            "message": message,
        }));

        let mut response = (status, body).into_response();
        if let AppError::TooManyRequests(retry_after) = self {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
