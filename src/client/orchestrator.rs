use crate::client::registry::{
    AddOutcome, ConversionStatus, FileId, FileRegistry, ResultHandle, SourceFile,
};
use crate::client::transport::ConversionClient;
use crate::client::view::{RecordView, project_all};
use crate::utils::validation::sanitize_filename;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Counts for one `convert_all` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    /// Snapshotted records that were no longer pending when their turn came
    pub skipped: usize,
}

/// Drives records through `pending -> converting -> completed | failed`.
///
/// The registry lock is only held for state transitions, never across the
/// request to the server.
#[derive(Clone)]
pub struct ConversionOrchestrator {
    registry: Arc<RwLock<FileRegistry>>,
    client: Arc<dyn ConversionClient>,
}

impl ConversionOrchestrator {
    pub fn new(registry: FileRegistry, client: Arc<dyn ConversionClient>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            client,
        }
    }

    pub async fn add_file(&self, file: SourceFile) -> AddOutcome {
        self.registry.write().await.add_file(file)
    }

    pub async fn add_files(&self, files: impl IntoIterator<Item = SourceFile>) -> usize {
        self.registry.write().await.add_files(files)
    }

    pub async fn status(&self, id: &FileId) -> Option<ConversionStatus> {
        self.registry.read().await.get(id).map(|r| r.status)
    }

    /// Converts (or retries) one record. Returns the status the record
    /// settled in, its current status if it could not be started, or `None`
    /// when the id is unknown.
    pub async fn convert_one(&self, id: &FileId) -> Option<ConversionStatus> {
        self.convert_if(id, |status| {
            matches!(status, ConversionStatus::Pending | ConversionStatus::Failed)
        })
        .await
    }

    /// Converts the records pending at invocation time, one after another.
    pub async fn convert_all(&self) -> BatchSummary {
        let snapshot: Vec<FileId> = {
            let registry = self.registry.read().await;
            registry
                .list()
                .iter()
                .filter(|r| r.status == ConversionStatus::Pending)
                .map(|r| r.id.clone())
                .collect()
        };

        info!("Converting {} pending file(s)", snapshot.len());

        let mut summary = BatchSummary::default();
        for id in &snapshot {
            let settled = self
                .convert_if(id, |status| status == ConversionStatus::Pending)
                .await;

            match settled {
                Some(ConversionStatus::Completed) => {
                    summary.attempted += 1;
                    summary.completed += 1;
                }
                Some(ConversionStatus::Failed) => {
                    summary.attempted += 1;
                    summary.failed += 1;
                }
                _ => summary.skipped += 1,
            }
        }

        summary
    }

    /// Drops every record and its result.
    pub async fn reset(&self) {
        self.registry.write().await.clear();
    }

    /// Writes every completed result into `dir`, in selection order. Names
    /// are reduced to a single path component and made unique ignoring case.
    pub async fn download_all(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let handles: Vec<ResultHandle> = {
            let registry = self.registry.read().await;
            registry
                .completed_results()
                .map(|(_, handle)| handle.clone())
                .collect()
        };

        if handles.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(dir).await?;
        let mut written = Vec::with_capacity(handles.len());
        let mut taken = HashSet::new();
        for handle in handles {
            let name = sanitize_filename(handle.filename())
                .unwrap_or_else(|_| "converted".to_string());
            let path = dir.join(unique_name(&name, &mut taken));
            tokio::fs::write(&path, handle.bytes()).await?;
            written.push(path);
        }
        Ok(written)
    }

    pub async fn views(&self) -> Vec<RecordView> {
        project_all(&*self.registry.read().await)
    }

    async fn convert_if(
        &self,
        id: &FileId,
        can_start: impl Fn(ConversionStatus) -> bool,
    ) -> Option<ConversionStatus> {
        let source = {
            let mut registry = self.registry.write().await;
            let record = registry.get(id)?;
            if !can_start(record.status) {
                return Some(record.status);
            }
            let source = record.source.clone();
            registry.set_status(id, ConversionStatus::Converting, None);
            source
        };

        let outcome = self.client.convert(&source).await;

        let (status, handle) = match outcome {
            Ok(converted) => {
                info!("✅ Converted {} -> {}", source.name, converted.filename);
                (
                    ConversionStatus::Completed,
                    Some(ResultHandle::new(converted.filename, converted.bytes)),
                )
            }
            Err(e) => {
                warn!("❌ Conversion of {} failed: {}", source.name, e);
                (ConversionStatus::Failed, None)
            }
        };

        let mut registry = self.registry.write().await;
        // A reset while the request was in flight removes the record.
        if !registry.set_status(id, status, handle) {
            return None;
        }
        Some(status)
    }
}

/// Appends ` (n)` before the extension until the name is free in `taken`.
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut candidate = name.to_string();
    let mut n = 1;
    while !taken.insert(candidate.to_lowercase()) {
        candidate = format!("{} ({}){}", stem, n, extension);
        n += 1;
    }
    candidate
}
