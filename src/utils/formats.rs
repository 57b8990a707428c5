//! Source/target format rules shared by the client registry and the staging store.

pub const DEFAULT_SOURCE_EXTENSION: &str = "ncm";
pub const DEFAULT_TARGET_EXTENSION: &str = "mp3";

/// The container extension accepted for conversion and the extension of the
/// audio produced from it. Extensions are stored lowercase, without the dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPair {
    pub source: String,
    pub target: String,
}

impl Default for FormatPair {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_EXTENSION, DEFAULT_TARGET_EXTENSION)
    }
}

impl FormatPair {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: normalize_extension(source),
            target: normalize_extension(target),
        }
    }

    /// True when `filename` ends with the source extension (case-insensitive).
    pub fn is_source(&self, filename: &str) -> bool {
        strip_extension(filename, &self.source).is_some()
    }

    /// Name of the converted file for `filename`.
    pub fn output_name(&self, filename: &str) -> String {
        swap_extension(filename, &self.source, &self.target)
    }

    pub fn target_content_type(&self) -> &'static str {
        content_type_for(&self.target)
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Returns the stem of `filename` when it ends with `.{ext}`.
fn strip_extension<'a>(filename: &'a str, ext: &str) -> Option<&'a str> {
    if ext.is_empty() {
        return None;
    }
    let suffix_len = ext.len() + 1;
    if filename.len() < suffix_len {
        return None;
    }
    let split = filename.len() - suffix_len;
    if !filename.is_char_boundary(split) {
        return None;
    }
    let (stem, suffix) = filename.split_at(split);
    let suffix = suffix.strip_prefix('.')?;
    suffix.eq_ignore_ascii_case(ext).then_some(stem)
}

/// Replaces a trailing `.{from}` with `.{to}`. Names without the `from`
/// suffix get `.{to}` appended. Only the suffix is ever touched, so
/// `ncm.mix.ncm` becomes `ncm.mix.mp3`.
pub fn swap_extension(filename: &str, from: &str, to: &str) -> String {
    let stem = strip_extension(filename, from).unwrap_or(filename);
    format!("{}.{}", stem, to)
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_only_touches_suffix() {
        let formats = FormatPair::default();
        assert_eq!(formats.output_name("track.ncm"), "track.mp3");
        assert_eq!(formats.output_name("ncm.mix.ncm"), "ncm.mix.mp3");
        assert_eq!(formats.output_name("a.ncm.b.ncm"), "a.ncm.b.mp3");
        assert_eq!(formats.output_name("LOUD.NCM"), "LOUD.mp3");
    }

    #[test]
    fn test_swap_appends_when_suffix_missing() {
        assert_eq!(swap_extension("track", "ncm", "mp3"), "track.mp3");
        assert_eq!(swap_extension("track.ncmx", "ncm", "mp3"), "track.ncmx.mp3");
        assert_eq!(swap_extension("trackncm", "ncm", "mp3"), "trackncm.mp3");
    }

    #[test]
    fn test_is_source() {
        let formats = FormatPair::default();
        assert!(formats.is_source("song.ncm"));
        assert!(formats.is_source("Song.NcM"));
        assert!(formats.is_source("歌曲.ncm"));
        assert!(!formats.is_source("song.mp3"));
        assert!(!formats.is_source("ncm"));
        assert!(!formats.is_source("song.ncm.txt"));
    }

    #[test]
    fn test_multibyte_names() {
        let formats = FormatPair::default();
        assert_eq!(formats.output_name("周杰伦 - 晴天.ncm"), "周杰伦 - 晴天.mp3");
        assert_eq!(formats.output_name("晴"), "晴.mp3");
    }

    #[test]
    fn test_custom_pair_is_normalized() {
        let formats = FormatPair::new(".KGM", "FLAC");
        assert_eq!(formats.source, "kgm");
        assert_eq!(formats.output_name("x.kgm"), "x.flac");
        assert_eq!(formats.target_content_type(), "audio/flac");
    }
}
