use crate::errors::{Result, ShelfError, ShelfErrorType};
use directories::BaseDirs;
use std::path::{Path, PathBuf};

fn base_dirs() -> Result<BaseDirs> {
    BaseDirs::new().ok_or_else(|| {
        ShelfError::new(
            ShelfErrorType::InternalError,
            "Could not determine the home directory".to_string(),
        )
    })
}

pub(crate) fn get_default_storage_dir() -> Result<PathBuf> {
    let base_dirs = base_dirs()?;
    Ok(base_dirs.data_dir().join("cloudshelf"))
}

pub(crate) fn get_default_socket_path() -> Result<PathBuf> {
    let base_dirs = base_dirs()?;
    Ok(base_dirs.home_dir().join(".cloudshelf.sock"))
}

pub(crate) fn db_dir(storage_dir: &Path) -> PathBuf {
    storage_dir.join(".db")
}

pub(crate) fn blob_dir(storage_dir: &Path) -> PathBuf {
    storage_dir.join("blobs")
}

pub(crate) fn log_dir(storage_dir: &Path) -> PathBuf {
    storage_dir.join("logs")
}
