use anyhow::{Result, anyhow};
use std::path::Path;

/// Filenames longer than this are truncated (in characters)
pub const MAX_FILENAME_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Reduces a client-supplied filename to a single safe path component.
pub fn sanitize_filename(filename: &str) -> Result<String> {
    // Browsers on Windows may send the full client path
    let last_component = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let name = Path::new(last_component)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if filename.contains("..") {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';')
            {
                '_'
            } else {
                c
            }
        })
        .take(MAX_FILENAME_CHARS)
        .collect();

    let sanitized = sanitized.trim().trim_start_matches('.').to_string();

    if sanitized.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        }));
    }

    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\Music\\song.ncm").unwrap(),
            "song.ncm"
        );
    }

    #[test]
    fn test_sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_filename("a|b?c.ncm").unwrap(), "a_b_c.ncm");
        assert_eq!(sanitize_filename("歌曲 (live).ncm").unwrap(), "歌曲 (live).ncm");
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("dir/").is_err());
    }
}
