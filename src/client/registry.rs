use crate::utils::formats::FormatPair;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Identifier of a record, `"{unix millis}-{file name}"`.
///
/// Names are unique within a registry, so two live records never share an id
/// even when they are created in the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileId(String);

impl FileId {
    fn generate(name: &str) -> Self {
        Self(format!("{}-{}", Utc::now().timestamp_millis(), name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user-selected container file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub data: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                )
            })?;
        let data = tokio::fs::read(path).await?;
        Ok(Self::new(name, data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    Pending,
    Converting,
    Completed,
    Failed,
}

/// Converted bytes held for playback or download.
#[derive(Debug, Clone)]
pub struct ResultHandle {
    filename: String,
    bytes: Bytes,
}

impl ResultHandle {
    pub fn new(filename: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: FileId,
    pub source: SourceFile,
    pub status: ConversionStatus,
    /// Only present while `status` is `Completed`
    pub result: Option<ResultHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(FileId),
    /// A record with this file name already exists
    Duplicate,
    /// Not a source container
    Filtered,
}

/// Client-side list of selected files, in selection order.
#[derive(Debug, Default)]
pub struct FileRegistry {
    formats: FormatPair,
    records: Vec<FileRecord>,
}

impl FileRegistry {
    pub fn new(formats: FormatPair) -> Self {
        Self {
            formats,
            records: Vec::new(),
        }
    }

    pub fn formats(&self) -> &FormatPair {
        &self.formats
    }

    pub fn add_file(&mut self, file: SourceFile) -> AddOutcome {
        if !self.formats.is_source(&file.name) {
            tracing::debug!("Skipping {}: not a .{} file", file.name, self.formats.source);
            return AddOutcome::Filtered;
        }
        if self.records.iter().any(|r| r.source.name == file.name) {
            tracing::debug!("Skipping {}: already selected", file.name);
            return AddOutcome::Duplicate;
        }

        let id = FileId::generate(&file.name);
        self.records.push(FileRecord {
            id: id.clone(),
            source: file,
            status: ConversionStatus::Pending,
            result: None,
        });
        AddOutcome::Added(id)
    }

    /// Adds every file of one selection; returns how many became records.
    pub fn add_files(&mut self, files: impl IntoIterator<Item = SourceFile>) -> usize {
        files
            .into_iter()
            .map(|file| self.add_file(file))
            .filter(|outcome| matches!(outcome, AddOutcome::Added(_)))
            .count()
    }

    pub fn list(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn get(&self, id: &FileId) -> Option<&FileRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    /// Overwrites a record's status. Transition rules are the orchestrator's
    /// job; the handle is kept only for `Completed`. Returns false for an
    /// unknown id.
    pub fn set_status(
        &mut self,
        id: &FileId,
        status: ConversionStatus,
        result: Option<ResultHandle>,
    ) -> bool {
        match self.records.iter_mut().find(|r| &r.id == id) {
            Some(record) => {
                record.status = status;
                record.result = match status {
                    ConversionStatus::Completed => result,
                    _ => None,
                };
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Completed records with their results, in selection order.
    pub fn completed_results(&self) -> impl Iterator<Item = (&FileRecord, &ResultHandle)> {
        self.records.iter().filter_map(|r| match (r.status, &r.result) {
            (ConversionStatus::Completed, Some(handle)) => Some((r, handle)),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> SourceFile {
        SourceFile::new(name, Bytes::from_static(b"container"))
    }

    fn registry() -> FileRegistry {
        FileRegistry::new(FormatPair::default())
    }

    #[test]
    fn test_add_creates_pending_record() {
        let mut registry = registry();
        let outcome = registry.add_file(file("track.ncm"));
        let AddOutcome::Added(id) = outcome else {
            panic!("expected a new record");
        };

        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, ConversionStatus::Pending);
        assert!(record.result.is_none());
        assert!(id.as_str().ends_with("-track.ncm"));
    }

    #[test]
    fn test_duplicate_name_is_noop() {
        let mut registry = registry();
        registry.add_file(file("track.ncm"));
        let size_after_first = registry.len();

        assert_eq!(registry.add_file(file("track.ncm")), AddOutcome::Duplicate);
        assert_eq!(registry.len(), size_after_first);
    }

    #[test]
    fn test_non_source_files_are_filtered() {
        let mut registry = registry();
        for name in ["cover.jpg", "track.mp3", "notes", "track.ncm.txt"] {
            assert_eq!(registry.add_file(file(name)), AddOutcome::Filtered);
        }
        assert!(registry.is_empty());

        assert!(matches!(registry.add_file(file("UPPER.NCM")), AddOutcome::Added(_)));
    }

    #[test]
    fn test_add_files_counts_new_records() {
        let mut registry = registry();
        let added = registry.add_files(vec![
            file("a.ncm"),
            file("b.ncm"),
            file("a.ncm"),
            file("c.flac"),
        ]);
        assert_eq!(added, 2);
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let mut registry = registry();
        for name in ["z.ncm", "a.ncm", "m.ncm"] {
            registry.add_file(file(name));
        }
        let names: Vec<_> = registry.list().iter().map(|r| r.source.name.as_str()).collect();
        assert_eq!(names, ["z.ncm", "a.ncm", "m.ncm"]);
    }

    #[test]
    fn test_distinct_names_get_distinct_ids() {
        let mut registry = registry();
        registry.add_files((0..50).map(|i| file(&format!("t{}.ncm", i))));
        let mut ids: Vec<_> = registry.list().iter().map(|r| r.id.clone()).collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_set_status_keeps_handle_only_when_completed() {
        let mut registry = registry();
        let AddOutcome::Added(id) = registry.add_file(file("a.ncm")) else {
            panic!("expected a new record");
        };
        let handle = ResultHandle::new("a.mp3", Bytes::from_static(b"mp3"));

        assert!(registry.set_status(&id, ConversionStatus::Failed, Some(handle.clone())));
        assert!(registry.get(&id).unwrap().result.is_none());

        assert!(registry.set_status(&id, ConversionStatus::Completed, Some(handle)));
        let record = registry.get(&id).unwrap();
        assert_eq!(record.result.as_ref().unwrap().filename(), "a.mp3");

        let results: Vec<_> = registry.completed_results().collect();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_set_status_unknown_id() {
        let mut registry = registry();
        let ghost = FileId::generate("ghost.ncm");
        assert!(!registry.set_status(&ghost, ConversionStatus::Failed, None));
    }

    #[test]
    fn test_clear_allows_re_adding() {
        let mut registry = registry();
        registry.add_file(file("a.ncm"));
        registry.clear();
        assert!(registry.is_empty());
        assert!(matches!(registry.add_file(file("a.ncm")), AddOutcome::Added(_)));
    }
}
