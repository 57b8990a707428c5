use crate::services::decoder::{DecodeError, Decoder};
use crate::services::staging::{StagedConversion, StagingError, StagingStore};
use crate::utils::formats::FormatPair;
use crate::utils::validation::sanitize_filename;
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tokio::sync::Semaphore;
use tokio_util::io::ReaderStream;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("decoder pool is closed")]
    DecoderUnavailable,
}

/// A finished conversion, ready to be sent to the caller.
pub struct ConvertedAudio {
    /// Download name: the uploaded name with the extension swapped
    pub filename: String,
    pub content_type: &'static str,
    pub content_length: u64,
    pub body: StagedStream,
}

/// Streams the decoded file and owns its staging artifacts. They are purged
/// once the stream is dropped: after the last chunk, or earlier if the
/// transfer is abandoned.
pub struct StagedStream {
    inner: ReaderStream<File>,
    // Declared after `inner` so the file handle closes before the purge
    staged: StagedConversion,
    filename: String,
    sent: u64,
    expected: u64,
    finished: bool,
}

impl StagedStream {
    fn new(file: File, staged: StagedConversion, filename: String, expected: u64) -> Self {
        Self {
            inner: ReaderStream::new(file),
            staged,
            filename,
            sent: 0,
            expected,
            finished: false,
        }
    }

    /// True once every byte has been handed out. The server stops polling
    /// after `Content-Length` bytes, so end-of-stream may never be observed.
    pub fn is_complete(&self) -> bool {
        self.finished || self.sent >= self.expected
    }
}

impl Stream for StagedStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::error!(
                    "Transmission of {} failed reading {}: {}",
                    this.filename,
                    this.staged.output_path().display(),
                    e
                );
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for StagedStream {
    fn drop(&mut self) {
        if self.is_complete() {
            tracing::info!("📤 Sent {} ({} bytes)", self.filename, self.sent);
        } else {
            tracing::error!(
                "Transmission of {} aborted after {} of {} bytes",
                self.filename,
                self.sent,
                self.expected
            );
        }
    }
}

/// Stages one upload, runs the decoder on it and hands back the result.
pub struct ConversionService {
    staging: Arc<StagingStore>,
    decoder: Arc<dyn Decoder>,
    permits: Semaphore,
    formats: FormatPair,
}

impl ConversionService {
    pub fn new(
        staging: Arc<StagingStore>,
        decoder: Arc<dyn Decoder>,
        max_concurrent_decodes: usize,
        formats: FormatPair,
    ) -> Self {
        Self {
            staging,
            decoder,
            permits: Semaphore::new(max_concurrent_decodes.max(1)),
            formats,
        }
    }

    pub fn decoder_name(&self) -> &str {
        self.decoder.name()
    }

    pub fn staging(&self) -> &StagingStore {
        &self.staging
    }

    pub async fn convert<R>(
        &self,
        original_name: &str,
        reader: R,
    ) -> Result<ConvertedAudio, ConversionError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let display_name = sanitize_filename(original_name).unwrap_or_else(|_| "upload".to_string());
        let staged = self.staging.stage(original_name, reader).await?;

        let started = Instant::now();
        {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| ConversionError::DecoderUnavailable)?;

            if let Err(e) = self
                .decoder
                .decode(staged.input_path(), staged.output_path())
                .await
            {
                tracing::warn!("❌ Decoding {} failed: {}", display_name, e);
                return Err(e.into());
            }
        }
        tracing::info!(
            "🎵 Decoded {} in {:?} with {}",
            display_name,
            started.elapsed(),
            self.decoder.name()
        );

        let file = File::open(staged.output_path())
            .await
            .map_err(StagingError::from)?;
        let content_length = file.metadata().await.map_err(StagingError::from)?.len();
        let filename = self.formats.output_name(&display_name);

        Ok(ConvertedAudio {
            body: StagedStream::new(file, staged, filename.clone(), content_length),
            filename,
            content_type: self.formats.target_content_type(),
            content_length,
        })
    }
}
