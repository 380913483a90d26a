// Smart folders: named groupings a user defines by tags and file extensions.
// They do not own files; membership is computed against the current records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{Result, ShelfError};
use crate::records::{normalize_tags, FileRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SmartFolder {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    #[serde(default)]
    pub(crate) auto_extensions: Vec<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) user_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct NewSmartFolder {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    #[serde(default)]
    pub(crate) auto_extensions: Vec<String>,
}

fn clean_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

impl SmartFolder {
    pub(crate) fn create(user_id: &str, request: NewSmartFolder) -> Result<SmartFolder> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ShelfError::invalid("Folder name cannot be empty".to_string()));
        }
        let extensions = request
            .auto_extensions
            .iter()
            .map(|e| clean_extension(e))
            .filter(|e| !e.is_empty());
        Ok(SmartFolder {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            tags: normalize_tags(&request.tags),
            auto_extensions: normalize_tags(extensions),
            created_at: Utc::now(),
            user_id: user_id.to_string(),
        })
    }

    pub(crate) fn set_tags(&mut self, tags: &[String]) {
        self.tags = normalize_tags(tags);
    }

    /// A record belongs here when its extension is listed or it shares a tag.
    pub(crate) fn matches(&self, record: &FileRecord) -> bool {
        let by_extension = record
            .ext
            .as_deref()
            .map_or(false, |ext| self.auto_extensions.iter().any(|e| e == ext));
        by_extension || record.tags.iter().any(|t| self.tags.contains(t))
    }
}
