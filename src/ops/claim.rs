//! Collision-free naming
//!
//! A name is claimed by exclusively creating a placeholder of the same kind
//! as the item about to move there (empty file or empty directory). Creation
//! fails with `AlreadyExists` when another writer holds the name, so two
//! concurrent movers can never pick the same destination. The item is then
//! renamed over its own placeholder, which POSIX rename permits for a file
//! onto a file and a directory onto an empty directory.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{FsError, Result};

const MAX_ATTEMPTS: u32 = 10_000;

/// Suffix appended when the base name is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStyle {
    /// `name (1).ext`
    Numbered,
    /// `name (restored 1).ext`
    Restored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryShape {
    File,
    Directory,
}

impl EntryShape {
    /// Shape of the entry at `path` without following a final symlink.
    pub fn of(path: &Path) -> Result<Self> {
        let meta = fs::symlink_metadata(path).map_err(|e| FsError::from_io(path, e))?;
        Ok(if meta.is_dir() {
            Self::Directory
        } else {
            Self::File
        })
    }
}

/// Candidate name for attempt `counter`; attempt 0 is the base name itself.
///
/// The counter goes before the last extension, and names without one (or
/// dot-files like `.env`) get it appended.
pub fn candidate_name(base: &str, style: NameStyle, counter: u32) -> String {
    if counter == 0 {
        return base.to_string();
    }

    let suffix = match style {
        NameStyle::Numbered => format!(" ({})", counter),
        NameStyle::Restored => format!(" (restored {})", counter),
    };

    match base.rfind('.') {
        Some(idx) if idx > 0 => format!("{}{}{}", &base[..idx], suffix, &base[idx..]),
        _ => format!("{}{}", base, suffix),
    }
}

/// Exclusively create a placeholder at `path`.
pub fn claim_exact(path: &Path, shape: EntryShape) -> io::Result<()> {
    match shape {
        EntryShape::File => OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map(|_| ()),
        EntryShape::Directory => fs::create_dir(path),
    }
}

/// Remove a placeholder left behind by a failed move.
pub fn release(path: &Path, shape: EntryShape) {
    let result = match shape {
        EntryShape::File => fs::remove_file(path),
        EntryShape::Directory => fs::remove_dir(path),
    };
    if let Err(err) = result {
        debug!(path = %path.display(), error = %err, "failed to release name claim");
    }
}

/// Claim the first free name in `dir` derived from `base`, skipping any
/// candidate `reserved` rejects.
pub fn claim_free_name(
    dir: &Path,
    base: &str,
    style: NameStyle,
    shape: EntryShape,
    reserved: impl Fn(&Path) -> bool,
) -> Result<PathBuf> {
    for counter in 0..MAX_ATTEMPTS {
        let candidate = dir.join(candidate_name(base, style, counter));
        if reserved(&candidate) {
            continue;
        }
        match claim_exact(&candidate, shape) {
            Ok(()) => {
                debug!(claimed = %candidate.display(), "name claimed");
                return Ok(candidate);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(FsError::io(&candidate, err)),
        }
    }

    Err(FsError::AlreadyExists(format!(
        "no free name for {} after {} attempts",
        base, MAX_ATTEMPTS
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_candidate_names() {
        assert_eq!(candidate_name("a.txt", NameStyle::Numbered, 0), "a.txt");
        assert_eq!(candidate_name("a.txt", NameStyle::Numbered, 2), "a (2).txt");
        assert_eq!(candidate_name("a.tar.gz", NameStyle::Numbered, 1), "a.tar (1).gz");
        assert_eq!(candidate_name("Makefile", NameStyle::Numbered, 1), "Makefile (1)");
        assert_eq!(candidate_name(".env", NameStyle::Numbered, 1), ".env (1)");
        assert_eq!(
            candidate_name("a.txt", NameStyle::Restored, 3),
            "a (restored 3).txt"
        );
    }

    #[test]
    fn test_claim_skips_taken_and_reserved_names() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "taken").unwrap();
        let reserved = dir.path().join("a (1).txt");

        let claimed = claim_free_name(
            dir.path(),
            "a.txt",
            NameStyle::Numbered,
            EntryShape::File,
            |candidate| candidate == reserved,
        )
        .unwrap();

        assert_eq!(claimed, dir.path().join("a (2).txt"));
        assert_eq!(fs::read(&claimed).unwrap().len(), 0);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "taken");
    }

    #[test]
    fn test_successive_claims_never_collide() {
        let dir = TempDir::new().unwrap();
        let first =
            claim_free_name(dir.path(), "d", NameStyle::Numbered, EntryShape::Directory, |_| false)
                .unwrap();
        let second =
            claim_free_name(dir.path(), "d", NameStyle::Numbered, EntryShape::Directory, |_| false)
                .unwrap();
        assert_ne!(first, second);
        assert!(first.is_dir() && second.is_dir());
    }

    #[test]
    fn test_rename_over_placeholder() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/inner.txt"), "x").unwrap();

        claim_exact(&dir.path().join("dst"), EntryShape::Directory).unwrap();
        fs::rename(dir.path().join("src"), dir.path().join("dst")).unwrap();
        assert!(dir.path().join("dst/inner.txt").exists());

        assert_eq!(
            claim_exact(&dir.path().join("dst"), EntryShape::Directory)
                .unwrap_err()
                .kind(),
            io::ErrorKind::AlreadyExists
        );
    }
}
