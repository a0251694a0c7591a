//! Trash sidecar records.
//!
//! Each trashed item `X` has a pretty-printed JSON sidecar `X.trashinfo`
//! beside it in the trash directory.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{FsError, MetadataProblem, Result};

pub const TRASHINFO_SUFFIX: &str = ".trashinfo";

const DELETION_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashRecord {
    /// Logical path the item was trashed from, e.g. `/docs/readme.txt`.
    pub original_path: String,
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    #[serde(default)]
    pub deletion_date: String,
    #[serde(default)]
    pub original_name: String,
}

impl TrashRecord {
    pub fn new<Tz: TimeZone>(
        original_path: impl Into<String>,
        original_name: impl Into<String>,
        deleted_at: DateTime<Tz>,
    ) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            original_path: original_path.into(),
            deletion_date: deleted_at.format(DELETION_DATE_FORMAT).to_string(),
            original_name: original_name.into(),
        }
    }

    pub fn now(original_path: impl Into<String>, original_name: impl Into<String>) -> Self {
        Self::new(original_path, original_name, Local::now())
    }

    /// `<item>.trashinfo`, beside the item.
    pub fn sidecar_path(item: &Path) -> PathBuf {
        let mut name: OsString = item.file_name().map(OsString::from).unwrap_or_default();
        name.push(TRASHINFO_SUFFIX);
        item.with_file_name(name)
    }

    pub fn is_sidecar_name(name: &str) -> bool {
        name.len() > TRASHINFO_SUFFIX.len() && name.ends_with(TRASHINFO_SUFFIX)
    }

    pub fn write(&self, item: &Path) -> Result<()> {
        let sidecar = Self::sidecar_path(item);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| FsError::io(&sidecar, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        fs::write(&sidecar, json).map_err(|e| FsError::io(&sidecar, e))
    }

    /// Read the sidecar of `item`, telling a missing file apart from one
    /// that does not parse or lacks the original path.
    pub fn read(item: &Path) -> Result<Self> {
        let sidecar = Self::sidecar_path(item);
        let raw = match fs::read_to_string(&sidecar) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(FsError::InvalidMetadata {
                    path: sidecar,
                    problem: MetadataProblem::Missing,
                })
            }
            Err(err) => return Err(FsError::io(&sidecar, err)),
        };

        match serde_json::from_str::<TrashRecord>(&raw) {
            Ok(record) if !record.original_path.trim().is_empty() => Ok(record),
            _ => Err(FsError::InvalidMetadata {
                path: sidecar,
                problem: MetadataProblem::Unparseable,
            }),
        }
    }

    /// Delete the sidecar of `item` if there is one.
    pub fn remove(item: &Path) -> Result<()> {
        let sidecar = Self::sidecar_path(item);
        match fs::remove_file(&sidecar) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FsError::io(&sidecar, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            TrashRecord::sidecar_path(Path::new("/r/.trash/a (1).txt")),
            PathBuf::from("/r/.trash/a (1).txt.trashinfo")
        );
        assert!(TrashRecord::is_sidecar_name("a.txt.trashinfo"));
        assert!(!TrashRecord::is_sidecar_name(".trashinfo"));
        assert!(!TrashRecord::is_sidecar_name("a.txt"));
    }

    #[test]
    fn test_write_and_read() {
        let dir = TempDir::new().unwrap();
        let item = dir.path().join("readme.txt");
        let deleted = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let record = TrashRecord::new("/docs/readme.txt", "readme.txt", deleted);
        record.write(&item).unwrap();

        let raw = fs::read_to_string(TrashRecord::sidecar_path(&item)).unwrap();
        assert!(raw.contains("\"original_path\": \"/docs/readme.txt\""));
        assert!(raw.contains("\"deletion_date\": \"2024-03-09 14:05:07\""));

        let read = TrashRecord::read(&item).unwrap();
        assert_eq!(read, record);
    }

    #[test]
    fn test_missing_and_invalid_metadata_are_distinguished() {
        let dir = TempDir::new().unwrap();
        let item = dir.path().join("x");

        match TrashRecord::read(&item) {
            Err(FsError::InvalidMetadata { problem, .. }) => {
                assert_eq!(problem, MetadataProblem::Missing)
            }
            other => panic!("unexpected: {:?}", other),
        }

        fs::write(TrashRecord::sidecar_path(&item), "{not json").unwrap();
        match TrashRecord::read(&item) {
            Err(FsError::InvalidMetadata { problem, .. }) => {
                assert_eq!(problem, MetadataProblem::Unparseable)
            }
            other => panic!("unexpected: {:?}", other),
        }

        fs::write(
            TrashRecord::sidecar_path(&item),
            r#"{"original_path": "", "deletion_date": "", "original_name": "x"}"#,
        )
        .unwrap();
        let err = TrashRecord::read(&item).unwrap_err();
        assert_eq!(err.code(), "INVALID_METADATA");

        TrashRecord::remove(&item).unwrap();
        TrashRecord::remove(&item).unwrap();
    }
}
