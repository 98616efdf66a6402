//! Size-rotated log file, backed by `file-rotate`.
//!
//! The active file keeps its configured name. Once it has grown past
//! `max_size`, the next record first moves it aside to
//! `<name>.<YYYYMMDDTHHMMSS>`; rotations within the same second get a `.1`,
//! `.2`, ... counter. Backups are optionally gzipped (`.gz`). A record is
//! always written whole into one file.

use std::{fs::OpenOptions, io, path::Path, time::Duration};

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

const MEGABYTE: u64 = 1024 * 1024;
const DEFAULT_MAX_SIZE_MB: u64 = 100;
const MAX_AGE_DAYS: u64 = 365 * 100;

/// The rotating file sink. Wrap it in a
/// [`LockedWriter`](super::writer::LockedWriter) to share it.
pub type RotatingFile = FileRotate<AppendTimestamp>;

/// Rotation limits handed to the file sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Size in bytes after which the file is rotated.
    pub max_size: u64,
    /// Number of backups to keep; 0 keeps all.
    pub max_backups: usize,
    /// Maximum backup age; zero keeps backups regardless of age.
    pub max_age: Duration,
    /// Gzip rotated backups.
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::from_config(0, 0, 0, false)
    }
}

impl RotationPolicy {
    /// Build a policy from the configuration units (megabytes and days).
    ///
    /// `max_size_mb = 0` falls back to 100 MB.
    pub fn from_config(max_size_mb: u64, max_backups: usize, max_age_days: u64, compress: bool) -> Self {
        let size_mb = if max_size_mb == 0 {
            DEFAULT_MAX_SIZE_MB
        } else {
            max_size_mb
        };
        let age_days = max_age_days.min(MAX_AGE_DAYS);
        Self {
            max_size: size_mb.saturating_mul(MEGABYTE),
            max_backups,
            max_age: Duration::from_secs(age_days * 24 * 60 * 60),
            compress,
        }
    }

    /// Backup retention. A backup count takes precedence over an age limit.
    fn file_limit(&self) -> FileLimit {
        if self.max_backups > 0 {
            FileLimit::MaxFiles(self.max_backups)
        } else if !self.max_age.is_zero() {
            let age = chrono::Duration::from_std(self.max_age)
                .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
            FileLimit::Age(age)
        } else {
            FileLimit::Unlimited
        }
    }

    fn compression(&self) -> Compression {
        if self.compress {
            Compression::OnRotate(0)
        } else {
            Compression::None
        }
    }
}

/// Open (or create) `path` for appending. The parent directory must exist.
pub fn open(path: &Path, policy: RotationPolicy) -> io::Result<RotatingFile> {
    // FileRotate::new cannot fail, so make sure the file can be opened first.
    OpenOptions::new().create(true).append(true).open(path)?;

    let content_limit =
        ContentLimit::BytesSurpassed(usize::try_from(policy.max_size).unwrap_or(usize::MAX));
    Ok(FileRotate::new(
        path,
        AppendTimestamp::default(policy.file_limit()),
        content_limit,
        policy.compression(),
        #[cfg(unix)]
        None,
    ))
}
