//! Directory enumerator
//!
//! Produces [`FileEntry`] snapshots for a directory's immediate children. A
//! failed `stat` on one entry degrades that entry to zero values instead of
//! failing the whole listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::{self, Metadata};
use std::path::Path;
use std::str::FromStr;
use std::time::SystemTime;
use tracing::debug;

use crate::error::{FsError, Result};

pub mod search;
pub mod tree;

pub use search::{search, SearchHit};
pub use tree::{build_tree, TreeNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[serde(rename = "dir")]
    Directory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Byte size, always 0 for directories.
    pub size: u64,
    /// Unix seconds; 0 when the platform cannot report it.
    pub created: i64,
    pub modified: i64,
    /// Permission bits (`mode & 0o7777`).
    pub permissions: u32,
    /// Lower-case extension without the dot, empty for directories.
    pub extension: String,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    fn from_metadata(name: String, metadata: Option<&Metadata>, is_dir: bool) -> Self {
        let kind = if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let extension = if is_dir {
            String::new()
        } else {
            extension_of(&name)
        };

        Self {
            size: match metadata {
                Some(meta) if !is_dir => meta.len(),
                _ => 0,
            },
            created: metadata
                .and_then(|meta| meta.created().ok())
                .map(unix_seconds)
                .unwrap_or(0),
            modified: metadata
                .and_then(|meta| meta.modified().ok())
                .map(unix_seconds)
                .unwrap_or(0),
            permissions: metadata.map(permission_bits).unwrap_or(0),
            extension,
            kind,
            name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Name,
    Size,
    Modified,
}

impl FromStr for SortKey {
    type Err = FsError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "size" => Ok(Self::Size),
            "modified" | "last_modified" | "mtime" | "date" => Ok(Self::Modified),
            other => Err(FsError::invalid_input(format!("unknown sort key: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = FsError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            other => Err(FsError::invalid_input(format!("unknown sort order: {}", other))),
        }
    }
}

/// List the immediate children of `dir`, skipping the names in `hidden`.
pub fn list_directory(
    dir: &Path,
    sort: SortKey,
    order: SortOrder,
    hidden: &[&str],
) -> Result<Vec<FileEntry>> {
    let read_dir = fs::read_dir(dir).map_err(|e| FsError::from_io(dir, e))?;
    let mut entries = Vec::new();

    for dir_entry in read_dir {
        let dir_entry = match dir_entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };

        let name = dir_entry.file_name().to_string_lossy().into_owned();
        if hidden.contains(&name.as_str()) {
            continue;
        }

        // Follows symlinks so a link to a directory lists as a directory.
        let metadata = fs::metadata(dir_entry.path())
            .or_else(|_| fs::symlink_metadata(dir_entry.path()))
            .ok();
        if metadata.is_none() {
            debug!(entry = %dir_entry.path().display(), "stat failed, listing with empty fields");
        }
        let is_dir = metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false);
        entries.push(FileEntry::from_metadata(name, metadata.as_ref(), is_dir));
    }

    sort_entries(&mut entries, sort, order);
    Ok(entries)
}

/// Directories first regardless of key; `order` only flips the comparison
/// within each kind.
pub fn sort_entries(entries: &mut [FileEntry], sort: SortKey, order: SortOrder) {
    entries.sort_by(|a, b| {
        match (a.is_dir(), b.is_dir()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }

        let by_key = match sort {
            SortKey::Name => a.name.cmp(&b.name),
            SortKey::Size => a.size.cmp(&b.size).then_with(|| a.name.cmp(&b.name)),
            SortKey::Modified => a
                .modified
                .cmp(&b.modified)
                .then_with(|| a.name.cmp(&b.name)),
        };

        match order {
            SortOrder::Asc => by_key,
            SortOrder::Desc => by_key.reverse(),
        }
    });
}

/// Lower-case extension of a file name (`archive.TAR.GZ` -> `gz`).
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn unix_seconds(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
