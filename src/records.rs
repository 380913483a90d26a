// File metadata as the storage backend hands it to us. Records are created once
// at upload time; after that only their tags change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, ShelfError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum FileKind {
    Code,
    Archive,
    Image,
    Video,
    Audio,
    Document,
    Pdf,
    Other,
}

const ARCHIVE_SUFFIXES: &[&str] = &[".zip", ".rar", ".7z", ".tar", ".gz", ".bz2"];
const DOCUMENT_SUFFIXES: &[&str] = &[
    ".md", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".txt", ".rtf",
];
const CODE_SUFFIXES: &[&str] = &[
    ".js", ".ts", ".tsx", ".jsx", ".py", ".rb", ".go", ".rs", ".java", ".c", ".cpp", ".cs",
    ".php", ".sh", ".yaml", ".yml", ".json", ".toml", ".ini", ".sql",
];

impl FileKind {
    pub(crate) const ALL: [FileKind; 8] = [
        FileKind::Code,
        FileKind::Archive,
        FileKind::Image,
        FileKind::Video,
        FileKind::Audio,
        FileKind::Document,
        FileKind::Pdf,
        FileKind::Other,
    ];

    /// Classify an upload. The MIME family wins for media; everything else is
    /// decided by the file name's suffix.
    pub(crate) fn infer(mime: Option<&str>, name: &str) -> FileKind {
        let mime = mime.unwrap_or("");
        if mime.starts_with("image/") {
            return FileKind::Image;
        }
        if mime.starts_with("video/") {
            return FileKind::Video;
        }
        if mime.starts_with("audio/") {
            return FileKind::Audio;
        }
        let lowered = name.to_lowercase();
        let has_suffix = |suffixes: &[&str]| suffixes.iter().any(|s| lowered.ends_with(s));
        if has_suffix(ARCHIVE_SUFFIXES) {
            FileKind::Archive
        } else if lowered.ends_with(".pdf") || mime.contains("pdf") {
            FileKind::Pdf
        } else if has_suffix(DOCUMENT_SUFFIXES) {
            FileKind::Document
        } else if has_suffix(CODE_SUFFIXES) {
            FileKind::Code
        } else {
            FileKind::Other
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            FileKind::Code => "code",
            FileKind::Archive => "archive",
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Audio => "audio",
            FileKind::Document => "document",
            FileKind::Pdf => "pdf",
            FileKind::Other => "other",
        }
    }

    /// Icon shown next to files of this kind.
    pub(crate) fn icon(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Video => "file-video",
            FileKind::Audio => "file-audio",
            FileKind::Archive => "archive",
            FileKind::Document | FileKind::Pdf => "file-text",
            FileKind::Code => "code",
            FileKind::Other => "file",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = ShelfError;

    fn from_str(s: &str) -> Result<Self> {
        FileKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| ShelfError::invalid(format!("Unknown file kind {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct FileRecord {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub(crate) mime: Option<String>,
    pub(crate) size: u64,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    pub(crate) created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) ext: Option<String>,
    pub(crate) kind: FileKind,
    pub(crate) path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) url: Option<String>,
    pub(crate) user_id: String,
}

impl FileRecord {
    /// Last segment of the virtual path.
    pub(crate) fn display_name(&self) -> &str {
        display_name(&self.name)
    }
}

pub(crate) fn display_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Lowercased text after the final `.` of the display name.
pub(crate) fn extension_of(name: &str) -> Option<String> {
    let display = display_name(name);
    match display.rfind('.') {
        Some(idx) if idx + 1 < display.len() => Some(display[idx + 1..].to_lowercase()),
        _ => None,
    }
}

/// Adds a tag unless it is blank or already present. Returns whether the set changed.
pub(crate) fn insert_tag(tags: &mut Vec<String>, tag: &str) -> bool {
    let clean = tag.trim();
    if clean.is_empty() || tags.iter().any(|t| t == clean) {
        return false;
    }
    tags.push(clean.to_string());
    true
}

pub(crate) fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    for tag in tags {
        insert_tag(&mut out, tag.as_ref());
    }
    out
}

pub(crate) fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
pub(crate) fn record(name: &str) -> FileRecord {
    FileRecord {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        mime: None,
        size: 10,
        tags: Vec::new(),
        created_at: Utc::now(),
        ext: extension_of(name),
        kind: FileKind::infer(None, name),
        path: format!("blobs/{}", name),
        url: None,
        user_id: "tester".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_mime_beats_suffix() {
        assert_eq!(FileKind::infer(Some("image/png"), "notes.txt"), FileKind::Image);
        assert_eq!(FileKind::infer(Some("audio/mpeg"), "a.zip"), FileKind::Audio);
        assert_eq!(FileKind::infer(Some("video/mp4"), "clip"), FileKind::Video);
    }

    #[test]
    fn suffix_classification() {
        assert_eq!(FileKind::infer(None, "Backup.TAR.GZ"), FileKind::Archive);
        assert_eq!(FileKind::infer(None, "paper.pdf"), FileKind::Pdf);
        assert_eq!(FileKind::infer(Some("application/pdf"), "paper"), FileKind::Pdf);
        assert_eq!(FileKind::infer(None, "README.md"), FileKind::Document);
        assert_eq!(FileKind::infer(None, "src/main.rs"), FileKind::Code);
        assert_eq!(FileKind::infer(None, "photo"), FileKind::Other);
    }

    #[test]
    fn kinds_parse_from_labels() {
        for kind in FileKind::ALL {
            assert_eq!(kind.as_str().parse::<FileKind>().unwrap(), kind);
        }
        assert!("spreadsheet".parse::<FileKind>().is_err());
    }

    #[test]
    fn extension_uses_display_name() {
        assert_eq!(extension_of("docs/Report.PDF"), Some("pdf".to_string()));
        assert_eq!(extension_of("v1.2/Makefile"), None);
        assert_eq!(extension_of("trailing."), None);
        assert_eq!(extension_of("a/b.tar.gz"), Some("gz".to_string()));
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let tags = normalize_tags(["exam", " exam ", "", "Exam", "notes"]);
        assert_eq!(tags, vec!["exam", "Exam", "notes"]);
    }

    #[test]
    fn record_serializes_mime_as_type() {
        let mut rec = record("docs/a.txt");
        rec.mime = Some("text/plain".to_string());
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["type"], "text/plain");
        assert_eq!(value["kind"], "document");
        assert_eq!(rec.display_name(), "a.txt");
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512.0 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(30 * 1024 * 1024), "30.0 MB");
    }
}
