use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::Result;
use crate::locations::{get_default_socket_path, get_default_storage_dir};
use crate::quota::QuotaPolicy;

#[derive(Parser, Debug)]
#[clap(about = "Personal file shelf server")]
pub(crate) struct Opts {
    #[clap(short, long)]
    pub(crate) version: bool,
    #[clap(short, long, env = "CLOUDSHELF_DEBUG")]
    pub(crate) debug: bool,
    /// Listen on 127.0.0.1:<port> instead of the unix socket
    #[clap(short, long, env = "CLOUDSHELF_PORT")]
    pub(crate) port: Option<u16>,
    #[clap(long, env = "CLOUDSHELF_STORAGE_DIR")]
    pub(crate) storage_dir: Option<PathBuf>,
    /// How often cached file lists are refreshed, in milliseconds
    #[clap(long, env = "CLOUDSHELF_REFRESH_MS", default_value_t = 2000)]
    pub(crate) refresh_ms: u64,
    #[clap(long, env = "CLOUDSHELF_MAX_FILE_MB", default_value_t = 30)]
    pub(crate) max_file_mb: u64,
    #[clap(long, env = "CLOUDSHELF_USER_LIMIT_MB", default_value_t = 100)]
    pub(crate) user_limit_mb: u64,
    #[clap(long, env = "CLOUDSHELF_GRACE_MB", default_value_t = 10)]
    pub(crate) grace_mb: u64,
}

#[derive(Debug, Clone)]
pub(crate) enum Listen {
    Tcp(u16),
    Unix(PathBuf),
}

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) storage_dir: PathBuf,
    pub(crate) listen: Listen,
    pub(crate) refresh_interval: Duration,
    pub(crate) quota: QuotaPolicy,
    pub(crate) debug: bool,
}

impl Settings {
    pub(crate) fn from_opts(opts: &Opts) -> Result<Settings> {
        let storage_dir = match &opts.storage_dir {
            Some(dir) => dir.clone(),
            None => get_default_storage_dir()?,
        };
        let listen = match opts.port {
            Some(port) => Listen::Tcp(port),
            None => Listen::Unix(get_default_socket_path()?),
        };
        Ok(Settings {
            storage_dir,
            listen,
            // A zero interval would make tokio panic.
            refresh_interval: Duration::from_millis(opts.refresh_ms.max(1)),
            quota: QuotaPolicy::from_mib(
                opts.max_file_mb,
                opts.user_limit_mb,
                opts.grace_mb,
            )?,
            debug: opts.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::MIB;

    #[test]
    fn defaults_match_the_standard_quota() {
        let opts =
            Opts::parse_from(["cloudshelf", "--port", "8080", "--storage-dir", "/tmp/shelf"]);
        let settings = Settings::from_opts(&opts).unwrap();
        assert_eq!(settings.quota, QuotaPolicy::default());
        assert_eq!(settings.refresh_interval, Duration::from_secs(2));
        assert_eq!(settings.storage_dir, PathBuf::from("/tmp/shelf"));
        assert!(matches!(settings.listen, Listen::Tcp(8080)));
    }

    #[test]
    fn quota_sizes_are_configurable() {
        let opts = Opts::parse_from([
            "cloudshelf",
            "--port",
            "1",
            "--storage-dir",
            "/tmp/shelf",
            "--user-limit-mb",
            "5",
            "--grace-mb",
            "0",
            "--refresh-ms",
            "0",
        ]);
        let settings = Settings::from_opts(&opts).unwrap();
        assert_eq!(settings.quota.user_limit, 5 * MIB);
        assert_eq!(settings.quota.hard_limit(), 5 * MIB);
        assert_eq!(settings.refresh_interval, Duration::from_millis(1));
    }

    #[test]
    fn overflowing_quota_is_rejected() {
        let huge = u64::MAX.to_string();
        let opts = Opts::parse_from([
            "cloudshelf",
            "--port",
            "1",
            "--storage-dir",
            "/tmp/shelf",
            "--max-file-mb",
            huge.as_str(),
        ]);
        let err = Settings::from_opts(&opts).unwrap_err();
        assert_eq!(err.error_type, crate::errors::ShelfErrorType::InvalidInput);
    }
}
