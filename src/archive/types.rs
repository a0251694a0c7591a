//! Archive Types Module
//!
//! Quotas, job descriptors and summaries shared by the archive handlers.

use anyhow::ensure;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use super::format_detection::ArchiveKind;
use crate::error::{FsError, Result};

/// Upper bound accepted for `max_entries`.
pub const QUOTA_ENTRY_CEILING: usize = 100_000;
/// Upper bound accepted for `max_total_size` (10 GiB).
pub const QUOTA_SIZE_CEILING: u64 = 10 * 1024 * 1024 * 1024;

/// Extraction quotas, enforced while scanning an archive before anything is
/// written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveQuotas {
    /// Maximum number of entries in one archive (default 10 000)
    pub max_entries: usize,
    /// Maximum uncompressed size per entry (default 2GB)
    pub max_entry_size: u64,
    /// Maximum total uncompressed size (default 8GB)
    pub max_total_size: u64,
}

impl Default for ArchiveQuotas {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_entry_size: 2 * 1024 * 1024 * 1024,
            max_total_size: 8 * 1024 * 1024 * 1024,
        }
    }
}

impl ArchiveQuotas {
    pub fn new(max_entries: usize, max_entry_size: u64, max_total_size: u64) -> Self {
        Self {
            max_entries,
            max_entry_size,
            max_total_size,
        }
    }

    /// Reject zero limits, a per-entry limit above the total, and values
    /// past [`QUOTA_ENTRY_CEILING`] / [`QUOTA_SIZE_CEILING`].
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.max_entries > 0, "archive.max_entries must be positive");
        ensure!(self.max_entry_size > 0, "archive.max_entry_size must be positive");
        ensure!(self.max_total_size > 0, "archive.max_total_size must be positive");
        ensure!(
            self.max_entry_size <= self.max_total_size,
            "archive.max_entry_size ({}) is larger than archive.max_total_size ({})",
            self.max_entry_size,
            self.max_total_size
        );
        ensure!(
            self.max_entries <= QUOTA_ENTRY_CEILING,
            "archive.max_entries may not exceed {}",
            QUOTA_ENTRY_CEILING
        );
        ensure!(
            self.max_total_size <= QUOTA_SIZE_CEILING,
            "archive.max_total_size may not exceed {} bytes",
            QUOTA_SIZE_CEILING
        );
        Ok(())
    }

    /// Check one entry against the per-entry and running total limits.
    pub(crate) fn charge(
        &self,
        archive: &std::path::Path,
        entry_path: &str,
        size: u64,
        entry_count: usize,
        total: &mut u64,
    ) -> Result<()> {
        if entry_count > self.max_entries {
            return Err(FsError::archive(
                archive,
                format!("archive contains more than {} entries", self.max_entries),
            ));
        }

        if size > self.max_entry_size {
            return Err(FsError::archive(
                archive,
                format!(
                    "entry {} size {} exceeds limit {}",
                    entry_path, size, self.max_entry_size
                ),
            ));
        }

        *total = total.saturating_add(size);
        if *total > self.max_total_size {
            return Err(FsError::archive(
                archive,
                format!(
                    "total uncompressed size {} exceeds limit {}",
                    *total, self.max_total_size
                ),
            ));
        }
        Ok(())
    }
}

/// Output formats accepted by compress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressFormat {
    Zip,
    Tar,
    Gzip,
}

impl CompressFormat {
    /// File extension appended to the archive name, dot included.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => ".zip",
            Self::Tar => ".tar",
            Self::Gzip => ".gz",
        }
    }
}

impl FromStr for CompressFormat {
    type Err = FsError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "tar" => Ok(Self::Tar),
            "gzip" | "gz" => Ok(Self::Gzip),
            other => Err(FsError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Absolute, sandbox-checked inputs of one compress call.
#[derive(Debug, Clone)]
pub struct CompressJob {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub format: CompressFormat,
}

/// Absolute, sandbox-checked inputs of one extract call.
#[derive(Debug, Clone)]
pub struct ExtractJob {
    pub archive: PathBuf,
    pub destination: PathBuf,
    pub kind: ArchiveKind,
}

impl ExtractJob {
    pub fn new(archive: PathBuf, destination: PathBuf) -> Self {
        let kind = ArchiveKind::detect(&archive);
        Self {
            archive,
            destination,
            kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    /// Regular files written into or out of the archive.
    pub files: usize,
    /// Uncompressed bytes of those files.
    pub bytes: u64,
}

impl ArchiveSummary {
    pub(crate) fn add_file(&mut self, size: u64) {
        self.files += 1;
        self.bytes = self.bytes.saturating_add(size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn create_test_quotas() -> ArchiveQuotas {
        ArchiveQuotas::new(3, 1024, 2048)
    }

    #[test]
    fn test_archive_quotas_default() {
        let quotas = ArchiveQuotas::default();
        assert_eq!(quotas.max_entries, 10_000);
        assert!(quotas.validate().is_ok());
    }

    #[test]
    fn test_archive_quotas_validation() {
        assert!(ArchiveQuotas::new(100, 1024, 10240).validate().is_ok());
        assert!(ArchiveQuotas::new(0, 1024, 10240).validate().is_err());
        assert!(ArchiveQuotas::new(100, 10240, 1024).validate().is_err());
        assert!(ArchiveQuotas::new(1_000_000, 1024, 10240).validate().is_err());
    }

    #[test]
    fn test_charge_enforces_each_limit() {
        let quotas = create_test_quotas();
        let archive = Path::new("a.zip");
        let mut total = 0u64;

        assert!(quotas.charge(archive, "a", 1000, 1, &mut total).is_ok());
        assert_eq!(total, 1000);

        let err = quotas.charge(archive, "big", 1025, 2, &mut total).unwrap_err();
        assert!(err.to_string().contains("big"));

        assert!(quotas.charge(archive, "b", 1000, 2, &mut total).is_ok());
        let err = quotas.charge(archive, "c", 100, 3, &mut total).unwrap_err();
        assert!(err.to_string().contains("total uncompressed size"));

        let mut total = 0u64;
        let err = quotas.charge(archive, "d", 1, 4, &mut total).unwrap_err();
        assert_eq!(err.code(), "ARCHIVE_ERROR");
    }

    #[test]
    fn test_charge_saturates_instead_of_overflowing() {
        let quotas = create_test_quotas();
        let mut total = u64::MAX - 100;
        assert!(quotas
            .charge(Path::new("a.tar"), "x", 1000, 1, &mut total)
            .is_err());
        assert_eq!(total, u64::MAX);
    }

    #[test]
    fn test_compress_format_parsing() {
        assert_eq!("ZIP".parse::<CompressFormat>().unwrap(), CompressFormat::Zip);
        assert_eq!("gzip".parse::<CompressFormat>().unwrap(), CompressFormat::Gzip);
        assert_eq!(CompressFormat::Tar.extension(), ".tar");

        let err = "rar".parse::<CompressFormat>().unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_FORMAT");
    }
}
