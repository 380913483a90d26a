use crate::errors::{Result, ShelfError, ShelfErrorType};
use crate::locations::log_dir;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{layer::SubscriberExt, Registry};

const LOG_RETENTION_DAYS: i64 = 30;

fn setup_error(message: String) -> ShelfError {
    ShelfError::new(ShelfErrorType::InternalError, message)
}

pub(crate) fn init_logging(
    storage_dir: &Path,
    debug: bool,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_file = get_log_location(storage_dir)?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let default_level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let formatter = BunyanFormattingLayer::new("cloudshelf".into(), non_blocking);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatter);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| setup_error(format!("Could not install log subscriber: {}", e)))?;
    // sled reports through the `log` crate
    tracing_log::LogTracer::init()
        .map_err(|e| setup_error(format!("Could not forward log records: {}", e)))?;

    Ok(guard)
}

fn get_log_location(storage_dir: &Path) -> Result<PathBuf> {
    let log_dir = log_dir(storage_dir);
    std::fs::create_dir_all(&log_dir)?;
    let timestamp = Utc::now().format("%Y-%m-%d-%H-%M-%S");
    let log_file = log_dir.join(format!("cloudshelf-{}.log", timestamp));
    clean_logfiles(&log_dir)?;
    Ok(log_file)
}

fn clean_logfiles(log_dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for file in std::fs::read_dir(log_dir)? {
        let file = file?;
        let modified = file.metadata()?.modified()?;
        let modified: chrono::DateTime<Utc> = chrono::DateTime::from(modified);
        let age = Utc::now().signed_duration_since(modified);
        if age.num_days() > LOG_RETENTION_DAYS {
            std::fs::remove_file(file.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_logs_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = get_log_location(dir.path()).unwrap();
        std::fs::write(&path, b"{}").unwrap();
        assert_eq!(clean_logfiles(&log_dir(dir.path())).unwrap(), 0);
        assert!(path.exists());
        assert!(path.starts_with(dir.path().join("logs")));
    }
}
