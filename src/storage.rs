// Persistence for the shelf. `RecordStore` is the seam a hosted backend would
// implement; `SledStore` keeps everything in a local sled database. File bytes
// live on disk under a `BlobStore`.

use chrono::{DateTime, Utc};
use ciborium::{from_reader, into_writer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::{Result, ShelfError, ShelfErrorType};
use crate::folders::SmartFolder;
use crate::records::{normalize_tags, FileRecord};

pub(crate) trait RecordStore: Send + Sync {
    /// All of a user's files, newest first.
    fn list_files(&self, user_id: &str) -> Result<Vec<FileRecord>>;
    fn get_file(&self, user_id: &str, id: &str) -> Result<FileRecord>;
    fn insert_file(&self, record: &FileRecord) -> Result<()>;
    fn remove_file(&self, user_id: &str, id: &str) -> Result<FileRecord>;
    fn update_tags(&self, user_id: &str, id: &str, tags: &[String]) -> Result<FileRecord>;

    fn files_with_prefix(&self, user_id: &str, prefix: &str) -> Result<Vec<FileRecord>> {
        Ok(self
            .list_files(user_id)?
            .into_iter()
            .filter(|r| r.name.starts_with(prefix))
            .collect())
    }

    /// Returns true when the user was not flagged before.
    fn mark_over_limit(&self, user_id: &str) -> Result<bool>;
    fn is_over_limit(&self, user_id: &str) -> Result<bool>;

    fn list_folders(&self, user_id: &str) -> Result<Vec<SmartFolder>>;
    fn get_folder(&self, user_id: &str, id: &str) -> Result<SmartFolder>;
    fn insert_folder(&self, folder: &SmartFolder) -> Result<()>;
    fn remove_folder(&self, user_id: &str, id: &str) -> Result<SmartFolder>;

    /// Announces the id of every user whose files changed, if the store can.
    fn subscribe(&self) -> Option<broadcast::Receiver<String>> {
        None
    }
}

#[derive(Serialize, Deserialize)]
struct OverLimitMark {
    user_id: String,
    marked_at: DateTime<Utc>,
}

pub(crate) struct SledStore {
    _db: Db,
    files: Tree,
    folders: Tree,
    over_limit: Tree,
    changes: broadcast::Sender<String>,
}

fn key(user_id: &str, id: &str) -> String {
    format!("{}/{}", user_id, id)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    into_writer(value, &mut bytes)?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(from_reader(bytes)?)
}

fn scan_user<T: DeserializeOwned>(tree: &Tree, user_id: &str) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for entry in tree.scan_prefix(format!("{}/", user_id)) {
        let (_, value) = entry?;
        out.push(decode(&value)?);
    }
    Ok(out)
}

impl SledStore {
    pub(crate) fn open(path: &Path) -> Result<SledStore> {
        let db = sled::open(path)?;
        let (changes, _) = broadcast::channel(64);
        Ok(SledStore {
            files: db.open_tree("files")?,
            folders: db.open_tree("folders")?,
            over_limit: db.open_tree("over_limit_users")?,
            _db: db,
            changes,
        })
    }

    fn announce(&self, user_id: &str) {
        // No receivers is fine; nobody is watching this user.
        let _ = self.changes.send(user_id.to_string());
    }
}

impl RecordStore for SledStore {
    #[instrument(skip(self))]
    fn list_files(&self, user_id: &str) -> Result<Vec<FileRecord>> {
        let mut records: Vec<FileRecord> = scan_user(&self.files, user_id)?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn get_file(&self, user_id: &str, id: &str) -> Result<FileRecord> {
        match self.files.get(key(user_id, id))? {
            Some(bytes) => decode(&bytes),
            None => Err(ShelfError::not_found(format!("No file with id {}", id))),
        }
    }

    #[instrument(skip(self, record), fields(id = %record.id, name = %record.name))]
    fn insert_file(&self, record: &FileRecord) -> Result<()> {
        let k = key(&record.user_id, &record.id);
        if self.files.contains_key(&k)? {
            return Err(ShelfError::new(
                ShelfErrorType::AlreadyExists,
                format!("File {} already exists", record.id),
            ));
        }
        self.files.insert(k, encode(record)?)?;
        self.announce(&record.user_id);
        Ok(())
    }

    #[instrument(skip(self))]
    fn remove_file(&self, user_id: &str, id: &str) -> Result<FileRecord> {
        match self.files.remove(key(user_id, id))? {
            Some(bytes) => {
                self.announce(user_id);
                decode(&bytes)
            }
            None => Err(ShelfError::not_found(format!("No file with id {}", id))),
        }
    }

    fn update_tags(&self, user_id: &str, id: &str, tags: &[String]) -> Result<FileRecord> {
        let mut record = self.get_file(user_id, id)?;
        record.tags = normalize_tags(tags);
        self.files.insert(key(user_id, id), encode(&record)?)?;
        self.announce(user_id);
        Ok(record)
    }

    fn files_with_prefix(&self, user_id: &str, prefix: &str) -> Result<Vec<FileRecord>> {
        let mut records: Vec<FileRecord> = scan_user::<FileRecord>(&self.files, user_id)?
            .into_iter()
            .filter(|r| r.name.starts_with(prefix))
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    #[instrument(skip(self))]
    fn mark_over_limit(&self, user_id: &str) -> Result<bool> {
        if self.over_limit.contains_key(user_id)? {
            return Ok(false);
        }
        let mark = OverLimitMark {
            user_id: user_id.to_string(),
            marked_at: Utc::now(),
        };
        self.over_limit.insert(user_id, encode(&mark)?)?;
        Ok(true)
    }

    fn is_over_limit(&self, user_id: &str) -> Result<bool> {
        Ok(self.over_limit.contains_key(user_id)?)
    }

    fn list_folders(&self, user_id: &str) -> Result<Vec<SmartFolder>> {
        let mut folders: Vec<SmartFolder> = scan_user(&self.folders, user_id)?;
        folders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(folders)
    }

    fn get_folder(&self, user_id: &str, id: &str) -> Result<SmartFolder> {
        match self.folders.get(key(user_id, id))? {
            Some(bytes) => decode(&bytes),
            None => Err(ShelfError::not_found(format!("No folder with id {}", id))),
        }
    }

    fn insert_folder(&self, folder: &SmartFolder) -> Result<()> {
        self.folders
            .insert(key(&folder.user_id, &folder.id), encode(folder)?)?;
        Ok(())
    }

    fn remove_folder(&self, user_id: &str, id: &str) -> Result<SmartFolder> {
        match self.folders.remove(key(user_id, id))? {
            Some(bytes) => decode(&bytes),
            None => Err(ShelfError::not_found(format!("No folder with id {}", id))),
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<String>> {
        Some(self.changes.subscribe())
    }
}

/// File bytes on local disk, one file per upload at `<root>/<user>/<uuid>`.
pub(crate) struct BlobStore {
    root_path: PathBuf,
}

impl BlobStore {
    pub(crate) fn new(root_path: PathBuf) -> Result<BlobStore> {
        fs::create_dir_all(&root_path)?;
        Ok(BlobStore { root_path })
    }

    fn full_path(&self, blob_key: &str) -> Result<PathBuf> {
        let relative = Path::new(blob_key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)));
        if escapes || blob_key.is_empty() {
            return Err(ShelfError::invalid(format!("Invalid blob key {}", blob_key)));
        }
        Ok(self.root_path.join(relative))
    }

    /// Writes the bytes and returns the key to store on the record.
    pub(crate) fn save(&self, user_id: &str, content: &[u8]) -> Result<String> {
        let blob_key = format!("{}/{}", user_id, Uuid::new_v4());
        let path = self.full_path(&blob_key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(blob_key)
    }

    pub(crate) fn load(&self, blob_key: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.full_path(blob_key)?)?)
    }

    /// Returns false when there was nothing to delete.
    pub(crate) fn delete(&self, blob_key: &str) -> Result<bool> {
        match fs::remove_file(self.full_path(blob_key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
