//! Pure `(path, extension sets, junk rules) -> Kind` classification.
//! Depends only on its inputs, never on filesystem access.

use std::path::Path;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::model::Kind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaExtensions {
    pub video: Vec<String>,
    pub image: Vec<String>,
    pub subtitle: Vec<String>,
    pub xml: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClassifyResult {
    pub kind: Kind,
    pub reason: Option<String>,
}

/// Lowercases an extension the same way across the classifier, hasher-skip checks,
/// and wire model: ASCII-only, no leading dot.
pub fn normalize_ext(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Classifies a file. `junk_patterns` are shell globs matched case-insensitively
/// against the base name; `junk_exclude_extensions` veto a junk match regardless of
/// pattern.
pub fn classify(
    path: &Path,
    ext: &str,
    media: &MediaExtensions,
    junk_patterns: &[String],
    junk_exclude_extensions: &[String],
) -> ClassifyResult {
    let base_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if !junk_exclude_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
        for pattern in junk_patterns {
            if let Ok(glob) = Pattern::new(&pattern.to_ascii_lowercase()) {
                if glob.matches(&base_name) {
                    return ClassifyResult {
                        kind: Kind::Junk,
                        reason: Some(pattern.clone()),
                    };
                }
            }
        }
    }

    let kind = if media.video.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
        Kind::Video
    } else if media.image.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
        Kind::Image
    } else if media.subtitle.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
        Kind::Subtitle
    } else if media.xml.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
        Kind::Xml
    } else {
        Kind::Other
    };

    ClassifyResult { kind, reason: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn media() -> MediaExtensions {
        MediaExtensions {
            video: vec!["mkv".into(), "mp4".into()],
            image: vec!["jpg".into(), "png".into()],
            subtitle: vec!["srt".into()],
            xml: vec!["nfo".into()],
        }
    }

    #[test]
    fn classifies_video_by_extension() {
        let path = PathBuf::from("a.mkv");
        let result = classify(&path, "mkv", &media(), &[], &[]);
        assert_eq!(result.kind, Kind::Video);
        assert!(result.reason.is_none());
    }

    #[test]
    fn classifies_unknown_extension_as_other() {
        let path = PathBuf::from("b.txt");
        let result = classify(&path, "txt", &media(), &[], &[]);
        assert_eq!(result.kind, Kind::Other);
    }

    #[test]
    fn junk_pattern_wins_over_media_extension() {
        let path = PathBuf::from("sample.part");
        let result = classify(&path, "part", &media(), &["*.part".into()], &[]);
        assert_eq!(result.kind, Kind::Junk);
        assert_eq!(result.reason.as_deref(), Some("*.part"));
    }

    #[test]
    fn junk_exclude_extension_vetoes_the_match() {
        let path = PathBuf::from("movie-sample.mkv");
        let result = classify(
            &path,
            "mkv",
            &media(),
            &["*sample*".into()],
            &["mkv".into()],
        );
        assert_eq!(result.kind, Kind::Video);
    }

    #[test]
    fn junk_match_is_case_insensitive() {
        let path = PathBuf::from("SAMPLE.PART");
        let result = classify(&path, "part", &media(), &["*.part".into()], &[]);
        assert_eq!(result.kind, Kind::Junk);
    }

    #[test]
    fn classification_is_deterministic() {
        let path = PathBuf::from("a.mkv");
        let first = classify(&path, "mkv", &media(), &[], &[]);
        let second = classify(&path, "mkv", &media(), &[], &[]);
        assert_eq!(first.kind, second.kind);
    }
}
