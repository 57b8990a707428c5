use crate::api::error::AppError;
use crate::services::conversion_service::ConvertedAudio;
use axum::{
    body::Body,
    extract::{Multipart, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::Response,
};
use futures::TryStreamExt;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

/// Multipart form accepted by the convert endpoint
#[derive(ToSchema)]
pub struct ConvertUpload {
    /// The encrypted container file
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable reason, e.g. `no_file` or `conversion_failed`
    pub error: String,
    pub message: String,
}

fn map_multipart_error(e: MultipartError) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(err_msg)
    }
}

#[utoipa::path(
    post,
    path = "/api/convert",
    request_body(content = ConvertUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Converted audio stream sent as an attachment"),
        (status = 400, description = "No file attached", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 500, description = "Conversion failed", body = ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn convert_file(
    State(state): State<crate::AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(map_multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        // Browsers send an empty `file` part when nothing was selected
        let original_filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };

        tracing::info!("📥 Converting {}", original_filename);

        let body_with_io_error = field.map_err(std::io::Error::other);
        let reader = StreamReader::new(body_with_io_error);

        let converted = state.conversion.convert(&original_filename, reader).await?;
        return audio_response(converted);
    }

    Err(AppError::MissingFile)
}

fn audio_response(converted: ConvertedAudio) -> Result<Response, AppError> {
    let content_disposition = attachment_disposition(&converted.filename);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, converted.content_type)
        .header(header::CONTENT_LENGTH, converted.content_length)
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from_stream(converted.body))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

/// `attachment` disposition with an ASCII fallback and the exact UTF-8 name.
pub(crate) fn attachment_disposition(filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();
    let fallback_filename = if ascii_filename.trim().is_empty() {
        "audio"
    } else {
        &ascii_filename
    };

    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_ascii_name() {
        assert_eq!(
            attachment_disposition("track.mp3"),
            "attachment; filename=\"track.mp3\"; filename*=UTF-8''track%2Emp3"
        );
    }

    #[test]
    fn test_disposition_unicode_name() {
        let value = attachment_disposition("晴天.mp3");
        assert!(value.starts_with("attachment; filename=\".mp3\""));
        assert!(value.contains("filename*=UTF-8''%E6%99%B4%E5%A4%A9%2Emp3"));
    }

    #[test]
    fn test_disposition_strips_quotes() {
        let value = attachment_disposition("a\"b.mp3");
        assert!(value.contains("filename=\"ab.mp3\""));
    }
}
