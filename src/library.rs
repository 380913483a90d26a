// Request orchestration for one shelf: every mutation goes through here so the
// quota rules and blob/record pairing hold regardless of the caller.

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;
use uuid::Uuid;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::{Result, ShelfError, ShelfErrorType};
use crate::folders::{NewSmartFolder, SmartFolder};
use crate::ftree::folder_prefix;
use crate::quota::{usage, QuotaPolicy, QuotaStatus, Usage};
use crate::records::{display_name, extension_of, normalize_tags, FileKind, FileRecord};
use crate::storage::{BlobStore, RecordStore};

#[derive(Debug, Clone)]
pub(crate) struct UploadRequest {
    pub(crate) name: String,
    pub(crate) mime: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) content: Bytes,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ManifestEntry {
    pub(crate) relative_path: String,
    pub(crate) id: String,
    pub(crate) size: u64,
    pub(crate) url: Option<String>,
}

/// What a folder download contains, resolved against the store at request time.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct FolderManifest {
    pub(crate) folder: String,
    pub(crate) path: String,
    pub(crate) total_size: u64,
    pub(crate) entries: Vec<ManifestEntry>,
}

/// A folder packed as a zip file, entries named relative to the folder.
pub(crate) struct FolderArchive {
    pub(crate) file_name: String,
    pub(crate) content: Vec<u8>,
}

pub(crate) struct Library {
    store: Arc<dyn RecordStore>,
    blobs: BlobStore,
    quota: QuotaPolicy,
    // Serializes quota check and insert across concurrent uploads.
    upload_lock: Mutex<()>,
}

pub(crate) fn validate_user(user_id: &str) -> Result<()> {
    if user_id.is_empty() || user_id.contains('/') {
        return Err(ShelfError::invalid(format!("Invalid user id {:?}", user_id)));
    }
    Ok(())
}

fn content_url(user_id: &str, id: &str) -> String {
    format!("/users/{}/files/{}/content", user_id, id)
}

impl Library {
    pub(crate) fn new(
        store: Arc<dyn RecordStore>,
        blobs: BlobStore,
        quota: QuotaPolicy,
    ) -> Library {
        Library {
            store,
            blobs,
            quota,
            upload_lock: Mutex::new(()),
        }
    }

    pub(crate) fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    pub(crate) fn quota(&self) -> QuotaPolicy {
        self.quota
    }

    pub(crate) fn list_files(&self, user_id: &str) -> Result<Vec<FileRecord>> {
        validate_user(user_id)?;
        self.store.list_files(user_id)
    }

    pub(crate) fn get_file(&self, user_id: &str, id: &str) -> Result<FileRecord> {
        validate_user(user_id)?;
        self.store.get_file(user_id, id)
    }

    fn lock_uploads(&self) -> Result<MutexGuard<'_, ()>> {
        self.upload_lock.lock().map_err(|_| {
            ShelfError::new(ShelfErrorType::InternalError, "Upload lock poisoned".to_string())
        })
    }

    #[instrument(
        skip(self, request),
        fields(name = %request.name, size = request.content.len())
    )]
    pub(crate) fn upload(&self, user_id: &str, request: UploadRequest) -> Result<FileRecord> {
        validate_user(user_id)?;
        let _guard = self.lock_uploads()?;
        self.store_upload(user_id, request)
    }

    /// Callers hold `upload_lock`, so the usage read here is still current at insert.
    fn store_upload(&self, user_id: &str, request: UploadRequest) -> Result<FileRecord> {
        if request.name.is_empty() {
            return Err(ShelfError::invalid("File name cannot be empty".to_string()));
        }
        let size = request.content.len() as u64;
        self.quota.check_file_size(size)?;
        let current = usage(&self.store.list_files(user_id)?);
        let status = self.quota.check_upload(current, size)?;

        let mime = request.mime.filter(|m| !m.trim().is_empty()).or_else(|| {
            mime_guess::from_path(display_name(&request.name))
                .first()
                .map(|m| m.to_string())
        });
        let ext = extension_of(&request.name);
        let kind = FileKind::infer(mime.as_deref(), &request.name);
        let blob_key = self.blobs.save(user_id, &request.content)?;
        let id = Uuid::new_v4().to_string();
        let record = FileRecord {
            url: Some(content_url(user_id, &id)),
            id,
            name: request.name,
            mime,
            size,
            tags: normalize_tags(&request.tags),
            created_at: Utc::now(),
            ext,
            kind,
            path: blob_key,
            user_id: user_id.to_string(),
        };
        if let Err(e) = self.store.insert_file(&record) {
            // Don't leave bytes behind that no record points at.
            let _ = self.blobs.delete(&record.path);
            return Err(e);
        }

        if status == QuotaStatus::OverLimit && self.store.mark_over_limit(user_id)? {
            tracing::warn!("User {} is now over the storage limit", user_id);
        }
        tracing::info!("Stored {} ({} bytes, {})", record.name, record.size, record.kind);
        Ok(record)
    }

    /// Uploads a queue of files after checking the whole queue fits the soft limit.
    /// The lock is held for the whole batch so a concurrent upload cannot slip in
    /// between the preflight and the inserts.
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub(crate) fn upload_batch(
        &self,
        user_id: &str,
        requests: Vec<UploadRequest>,
    ) -> Result<Vec<FileRecord>> {
        validate_user(user_id)?;
        let _guard = self.lock_uploads()?;
        let queued: u64 = requests.iter().map(|r| r.content.len() as u64).sum();
        let current = usage(&self.store.list_files(user_id)?);
        if self.quota.would_exceed(current, queued) {
            return Err(ShelfError::new(
                ShelfErrorType::QuotaExceeded,
                format!(
                    "Queued uploads would exceed the {} limit",
                    crate::records::format_size(self.quota.user_limit)
                ),
            ));
        }
        requests
            .into_iter()
            .map(|request| self.store_upload(user_id, request))
            .collect()
    }

    pub(crate) fn read_content(&self, user_id: &str, id: &str) -> Result<(FileRecord, Vec<u8>)> {
        let record = self.get_file(user_id, id)?;
        let content = self.blobs.load(&record.path)?;
        Ok((record, content))
    }

    #[instrument(skip(self))]
    pub(crate) fn delete_file(&self, user_id: &str, id: &str) -> Result<FileRecord> {
        validate_user(user_id)?;
        let record = self.store.remove_file(user_id, id)?;
        if !self.blobs.delete(&record.path)? {
            tracing::warn!("Blob {} for file {} was already gone", record.path, id);
        }
        Ok(record)
    }

    pub(crate) fn update_tags(
        &self,
        user_id: &str,
        id: &str,
        tags: &[String],
    ) -> Result<FileRecord> {
        validate_user(user_id)?;
        self.store.update_tags(user_id, id, tags)
    }

    /// Deletes everything under a virtual folder, looked up fresh from the store.
    #[instrument(skip(self))]
    pub(crate) fn delete_folder(&self, user_id: &str, path: &str) -> Result<Vec<FileRecord>> {
        validate_user(user_id)?;
        let prefix = folder_prefix(path);
        let mut removed = Vec::new();
        for record in self.store.files_with_prefix(user_id, &prefix)? {
            removed.push(self.delete_file(user_id, &record.id)?);
        }
        tracing::info!("Removed {} files under {}", removed.len(), prefix);
        Ok(removed)
    }

    /// Records under the folder at `path`, each paired with its name relative to it.
    fn folder_contents(&self, user_id: &str, path: &str) -> Result<Vec<(String, FileRecord)>> {
        validate_user(user_id)?;
        let prefix = folder_prefix(path);
        let records = self.store.files_with_prefix(user_id, &prefix)?;
        if records.is_empty() {
            return Err(ShelfError::not_found(format!("No files under {:?}", path)));
        }
        Ok(records
            .into_iter()
            .map(|r| (r.name[prefix.len()..].to_string(), r))
            .collect())
    }

    pub(crate) fn download_folder(&self, user_id: &str, path: &str) -> Result<FolderManifest> {
        let entries: Vec<ManifestEntry> = self
            .folder_contents(user_id, path)?
            .into_iter()
            .map(|(relative_path, r)| ManifestEntry {
                relative_path,
                id: r.id,
                size: r.size,
                url: r.url,
            })
            .collect();
        Ok(FolderManifest {
            folder: display_name(path).to_string(),
            path: path.to_string(),
            total_size: entries.iter().map(|e| e.size).sum(),
            entries,
        })
    }

    /// Packs every file under the folder into a zip, read fresh from the blob store.
    #[instrument(skip(self))]
    pub(crate) fn archive_folder(&self, user_id: &str, path: &str) -> Result<FolderArchive> {
        let contents = self.folder_contents(user_id, path)?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (relative_path, record) in &contents {
            let bytes = self.blobs.load(&record.path)?;
            writer.start_file(relative_path.as_str(), options)?;
            writer.write_all(&bytes)?;
        }
        let content = writer.finish()?.into_inner();
        let folder = match display_name(path) {
            "" => "folder",
            name => name,
        };
        tracing::info!("Archived {} files under {:?}", contents.len(), path);
        Ok(FolderArchive {
            file_name: format!("{}.zip", folder),
            content,
        })
    }

    pub(crate) fn usage(&self, user_id: &str) -> Result<Usage> {
        let used = usage(&self.list_files(user_id)?);
        Ok(self.quota.usage(used))
    }

    pub(crate) fn create_smart_folder(
        &self,
        user_id: &str,
        request: NewSmartFolder,
    ) -> Result<SmartFolder> {
        validate_user(user_id)?;
        let folder = SmartFolder::create(user_id, request)?;
        self.store.insert_folder(&folder)?;
        Ok(folder)
    }

    pub(crate) fn list_smart_folders(&self, user_id: &str) -> Result<Vec<SmartFolder>> {
        validate_user(user_id)?;
        self.store.list_folders(user_id)
    }

    pub(crate) fn remove_smart_folder(&self, user_id: &str, id: &str) -> Result<SmartFolder> {
        validate_user(user_id)?;
        self.store.remove_folder(user_id, id)
    }

    pub(crate) fn retag_smart_folder(
        &self,
        user_id: &str,
        id: &str,
        tags: &[String],
    ) -> Result<SmartFolder> {
        validate_user(user_id)?;
        let mut folder = self.store.get_folder(user_id, id)?;
        folder.set_tags(tags);
        self.store.insert_folder(&folder)?;
        Ok(folder)
    }

    pub(crate) fn smart_folder_files(&self, user_id: &str, id: &str) -> Result<Vec<FileRecord>> {
        validate_user(user_id)?;
        let folder = self.store.get_folder(user_id, id)?;
        Ok(self
            .store
            .list_files(user_id)?
            .into_iter()
            .filter(|r| folder.matches(r))
            .collect())
    }
}

#[cfg(test)]
pub(crate) fn test_library(dir: &std::path::Path, quota: QuotaPolicy) -> Library {
    let store = crate::storage::SledStore::open(&dir.join("db")).unwrap();
    let blobs = BlobStore::new(dir.join("blobs")).unwrap();
    Library::new(Arc::new(store), blobs, quota)
}

#[cfg(test)]
pub(crate) fn upload_request(name: &str, size: usize) -> UploadRequest {
    UploadRequest {
        name: name.to_string(),
        mime: None,
        tags: Vec::new(),
        content: Bytes::from(vec![b'x'; size]),
    }
}
