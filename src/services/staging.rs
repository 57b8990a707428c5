use crate::utils::formats::FormatPair;
use crate::utils::validation::sanitize_filename;
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("staging I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
}

/// The two transient artifacts of one conversion request.
///
/// Both files are removed when this value is dropped, whatever path the
/// request took to get there.
#[derive(Debug)]
pub struct StagedConversion {
    input_path: PathBuf,
    output_path: PathBuf,
}

impl StagedConversion {
    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

impl Drop for StagedConversion {
    fn drop(&mut self) {
        for path in [&self.input_path, &self.output_path] {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!("🧹 Removed staged artifact {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::error!(
                    "Failed to remove staged artifact {}: {}",
                    path.display(),
                    e
                ),
            }
        }
    }
}

/// Local directory holding in-flight conversions.
#[derive(Debug)]
pub struct StagingStore {
    root: PathBuf,
    formats: FormatPair,
    max_file_size: usize,
    sequence: AtomicU64,
}

impl StagingStore {
    pub fn new(root: impl Into<PathBuf>, formats: FormatPair, max_file_size: usize) -> Self {
        Self {
            root: root.into(),
            formats,
            max_file_size,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{unix millis}-{sequence}-{sanitized name}`; the sequence keeps two
    /// uploads of the same name within one millisecond apart.
    fn staged_name(&self, original_name: &str) -> String {
        let name = sanitize_filename(original_name).unwrap_or_else(|_| "upload".to_string());
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", Utc::now().timestamp_millis(), seq, name)
    }

    /// Writes one uploaded file into the staging directory, creating the
    /// directory on first use. On error nothing is left behind.
    pub async fn stage<R>(
        &self,
        original_name: &str,
        mut reader: R,
    ) -> Result<StagedConversion, StagingError>
    where
        R: AsyncRead + Unpin + Send,
    {
        tokio::fs::create_dir_all(&self.root).await?;

        let input_name = self.staged_name(original_name);
        let output_name = self.formats.output_name(&input_name);
        let staged = StagedConversion {
            input_path: self.root.join(&input_name),
            output_path: self.root.join(output_name),
        };

        let mut file = tokio::fs::File::create(&staged.input_path).await?;
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut total = 0usize;

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            total += n;
            if total > self.max_file_size {
                tracing::warn!(
                    "Upload {} exceeded {} bytes, discarding",
                    original_name,
                    self.max_file_size
                );
                return Err(StagingError::TooLarge {
                    limit: self.max_file_size,
                });
            }
            file.write_all(&buffer[..n]).await?;
        }
        file.flush().await?;

        tracing::debug!(
            "📦 Staged {} ({} bytes) at {}",
            original_name,
            total,
            staged.input_path.display()
        );

        Ok(staged)
    }

    /// Removes artifacts older than `max_age` left behind by a crashed
    /// process. Returns how many files were deleted.
    pub async fn sweep_stale(&self, max_age: Duration) -> io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            let age = meta
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    "Failed to sweep stale artifact {}: {}",
                    entry.path().display(),
                    e
                ),
            }
        }

        Ok(removed)
    }
}
