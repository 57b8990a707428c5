use crate::client::registry::SourceFile;
use crate::config::ClientConfig;
use crate::utils::formats::FormatPair;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected conversion ({status}): {reason}")]
    Status { status: StatusCode, reason: String },
}

/// Audio returned by the server for one source file.
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    pub filename: String,
    pub bytes: Bytes,
}

/// One conversion request against the server.
#[async_trait]
pub trait ConversionClient: Send + Sync {
    async fn convert(&self, file: &SourceFile) -> Result<ConvertedFile, ClientError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Uploads to `POST {server}/api/convert` as multipart.
#[derive(Debug, Clone)]
pub struct HttpConversionClient {
    http: reqwest::Client,
    endpoint: String,
    formats: FormatPair,
}

impl HttpConversionClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/api/convert", config.server_url.trim_end_matches('/')),
            formats: config.formats.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ConversionClient for HttpConversionClient {
    async fn convert(&self, file: &SourceFile) -> Result<ConvertedFile, ClientError> {
        let part = Part::stream_with_length(file.data.clone(), file.data.len() as u64)
            .file_name(file.name.clone());
        let form = Form::new().part("file", part);

        let response = self.http.post(&self.endpoint).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let reason = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(ClientError::Status { status, reason });
        }

        let bytes = response.bytes().await?;
        Ok(ConvertedFile {
            filename: self.formats.output_name(&file.name),
            bytes,
        })
    }
}
