// Per-user storage limits. A user may go past the soft limit by up to the grace
// amount; uploads beyond that are refused and single files have a hard cap.

use serde::Serialize;

use crate::errors::{Result, ShelfError, ShelfErrorType};
use crate::records::{format_size, FileRecord};

pub(crate) const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct QuotaPolicy {
    pub(crate) max_file_size: u64,
    pub(crate) user_limit: u64,
    pub(crate) grace: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum QuotaStatus {
    WithinLimit,
    OverLimit,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Usage {
    pub(crate) used: u64,
    pub(crate) limit: u64,
    pub(crate) grace: u64,
    pub(crate) over_limit: bool,
    pub(crate) summary: String,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        QuotaPolicy {
            max_file_size: 30 * MIB,
            user_limit: 100 * MIB,
            grace: 10 * MIB,
        }
    }
}

pub(crate) fn usage(records: &[FileRecord]) -> u64 {
    records.iter().map(|r| r.size).sum()
}

fn mib(value: u64, what: &str) -> Result<u64> {
    value
        .checked_mul(MIB)
        .ok_or_else(|| ShelfError::invalid(format!("{} of {} MiB is too large", what, value)))
}

impl QuotaPolicy {
    /// Builds a policy from sizes given in MiB, refusing values that do not fit in bytes.
    pub(crate) fn from_mib(
        max_file_mb: u64,
        user_limit_mb: u64,
        grace_mb: u64,
    ) -> Result<QuotaPolicy> {
        let policy = QuotaPolicy {
            max_file_size: mib(max_file_mb, "File size limit")?,
            user_limit: mib(user_limit_mb, "User limit")?,
            grace: mib(grace_mb, "Grace")?,
        };
        if policy.user_limit.checked_add(policy.grace).is_none() {
            return Err(ShelfError::invalid(
                "User limit plus grace does not fit in a byte count".to_string(),
            ));
        }
        Ok(policy)
    }

    pub(crate) fn hard_limit(&self) -> u64 {
        self.user_limit.saturating_add(self.grace)
    }

    pub(crate) fn check_file_size(&self, size: u64) -> Result<()> {
        if size > self.max_file_size {
            return Err(ShelfError::new(
                ShelfErrorType::FileTooLarge,
                format!(
                    "File is {} but single uploads are limited to {}",
                    format_size(size),
                    format_size(self.max_file_size)
                ),
            ));
        }
        Ok(())
    }

    pub(crate) fn check_upload(&self, current: u64, incoming: u64) -> Result<QuotaStatus> {
        let total = current.saturating_add(incoming);
        if total > self.hard_limit() {
            return Err(ShelfError::new(
                ShelfErrorType::QuotaExceeded,
                format!(
                    "Upload would exceed the {} limit ({} plus {} grace); {} already in use",
                    format_size(self.hard_limit()),
                    format_size(self.user_limit),
                    format_size(self.grace),
                    format_size(current)
                ),
            ));
        }
        if total > self.user_limit {
            Ok(QuotaStatus::OverLimit)
        } else {
            Ok(QuotaStatus::WithinLimit)
        }
    }

    /// Preflight for a batch of queued uploads. Only the soft limit counts here.
    pub(crate) fn would_exceed(&self, current: u64, queued: u64) -> bool {
        current.saturating_add(queued) > self.user_limit
    }

    pub(crate) fn usage(&self, used: u64) -> Usage {
        Usage {
            used,
            limit: self.user_limit,
            grace: self.grace,
            over_limit: used > self.user_limit,
            summary: format!("{} / {} used", format_size(used), format_size(self.user_limit)),
        }
    }
}
