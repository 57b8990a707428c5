//! Presentation projection of the registry. Views are recomputed from the
//! records on every render and never written back.

use crate::client::registry::{ConversionStatus, FileRecord, FileRegistry};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordView {
    pub id: String,
    pub file_name: String,
    pub status: ConversionStatus,
    pub status_label: &'static str,
    /// Whether the convert (or retry) control is enabled
    pub can_convert: bool,
    pub download_name: Option<String>,
}

pub fn status_label(status: ConversionStatus) -> &'static str {
    match status {
        ConversionStatus::Pending => "Waiting",
        ConversionStatus::Converting => "Converting...",
        ConversionStatus::Completed => "Done",
        ConversionStatus::Failed => "Conversion failed",
    }
}

pub fn project(record: &FileRecord) -> RecordView {
    RecordView {
        id: record.id.to_string(),
        file_name: record.source.name.clone(),
        status: record.status,
        status_label: status_label(record.status),
        can_convert: matches!(
            record.status,
            ConversionStatus::Pending | ConversionStatus::Failed
        ),
        download_name: record
            .result
            .as_ref()
            .map(|handle| handle.filename().to_string()),
    }
}

pub fn project_all(registry: &FileRegistry) -> Vec<RecordView> {
    registry.list().iter().map(project).collect()
}

impl fmt::Display for RecordView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<40} {:<18}", self.file_name, self.status_label)?;
        if let Some(download) = &self.download_name {
            write!(f, " -> {}", download)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::registry::{AddOutcome, ResultHandle, SourceFile};
    use crate::utils::formats::FormatPair;
    use bytes::Bytes;

    fn registry_with(name: &str) -> (FileRegistry, crate::client::registry::FileId) {
        let mut registry = FileRegistry::new(FormatPair::default());
        let AddOutcome::Added(id) = registry.add_file(SourceFile::new(name, Bytes::new())) else {
            panic!("expected a new record");
        };
        (registry, id)
    }

    #[test]
    fn test_pending_view() {
        let (registry, _) = registry_with("a.ncm");
        let view = &project_all(&registry)[0];
        assert_eq!(view.status_label, "Waiting");
        assert!(view.can_convert);
        assert_eq!(view.download_name, None);
    }

    #[test]
    fn test_converting_disables_control() {
        let (mut registry, id) = registry_with("a.ncm");
        registry.set_status(&id, ConversionStatus::Converting, None);
        let view = project(registry.get(&id).unwrap());
        assert_eq!(view.status_label, "Converting...");
        assert!(!view.can_convert);
    }

    #[test]
    fn test_failed_reenables_retry() {
        let (mut registry, id) = registry_with("a.ncm");
        registry.set_status(&id, ConversionStatus::Failed, None);
        let view = project(registry.get(&id).unwrap());
        assert_eq!(view.status_label, "Conversion failed");
        assert!(view.can_convert);
    }

    #[test]
    fn test_completed_exposes_download() {
        let (mut registry, id) = registry_with("a.ncm");
        let handle = ResultHandle::new("a.mp3", Bytes::from_static(b"x"));
        registry.set_status(&id, ConversionStatus::Completed, Some(handle));

        let view = project(registry.get(&id).unwrap());
        assert_eq!(view.download_name.as_deref(), Some("a.mp3"));
        assert!(!view.can_convert);
        assert!(view.to_string().ends_with("-> a.mp3"));
    }
}
