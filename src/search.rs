// Keyword filter over the flat record list. A query matches a record when the
// whole query is a substring of the record's searchable text, or when any of
// its meaningful words is.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;

use crate::records::{FileKind, FileRecord};

/// How many results the interactive search shows inline.
pub(crate) const PREVIEW_LIMIT: usize = 5;

static STOP_WORDS: Lazy<HashSet<String>> = Lazy::new(|| {
    [
        "i", "have", "an", "exam", "tomorrow", "on", "the", "a", "for", "me", "all", "files",
        "retrieve", "get", "find", "show",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
});

#[derive(Debug, Clone, Default)]
pub(crate) struct SearchQuery {
    pub(crate) text: String,
    pub(crate) kind: Option<FileKind>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SearchResults {
    pub(crate) total: usize,
    pub(crate) files: Vec<FileRecord>,
    pub(crate) preview: Vec<FileRecord>,
}

impl SearchQuery {
    pub(crate) fn new(text: &str, kind: Option<FileKind>) -> SearchQuery {
        SearchQuery {
            text: text.to_string(),
            kind,
        }
    }

    fn normalized(&self) -> String {
        self.text.trim().to_lowercase()
    }
}

/// Words of the query worth matching on their own.
pub(crate) fn extract_keywords(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|word| word.chars().count() > 2)
        .filter(|word| !STOP_WORDS.contains(*word))
        .map(str::to_string)
        .collect()
}

pub(crate) fn searchable_text(record: &FileRecord) -> String {
    format!(
        "{} {} {} {}",
        record.display_name(),
        record.ext.as_deref().unwrap_or(""),
        record.tags.join(" "),
        record.mime.as_deref().unwrap_or("")
    )
    .to_lowercase()
}

pub(crate) fn matches(query: &SearchQuery, record: &FileRecord) -> bool {
    if query.kind.map_or(false, |kind| record.kind != kind) {
        return false;
    }
    let normalized = query.normalized();
    if normalized.is_empty() {
        return true;
    }
    let text = searchable_text(record);
    text.contains(&normalized)
        || extract_keywords(&normalized)
            .iter()
            .any(|k| text.contains(k.as_str()))
}

/// Records matching `query`, in their original order.
pub(crate) fn filter<'a>(query: &SearchQuery, records: &'a [FileRecord]) -> Vec<&'a FileRecord> {
    records.iter().filter(|r| matches(query, r)).collect()
}

pub(crate) fn search(query: &SearchQuery, records: &[FileRecord]) -> SearchResults {
    let files: Vec<FileRecord> = filter(query, records).into_iter().cloned().collect();
    let preview = files.iter().take(PREVIEW_LIMIT).cloned().collect();
    SearchResults {
        total: files.len(),
        files,
        preview,
    }
}
