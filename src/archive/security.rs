//! Entry-name checks for archives being extracted
//!
//! Entry-name and link-target checks applied while pre-scanning an archive.
//! Any violation rejects the whole archive before a single byte is written.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{FsError, Result};

/// Stateless checks run over every entry name and link target.
pub struct EntryValidator;

impl EntryValidator {
    /// Reject entry names that would land outside the destination directory.
    pub fn validate_entry_path(&self, archive: &Path, path: &str) -> Result<()> {
        if self.is_bad_entry_name(path) {
            warn!(
                archive = %archive.display(),
                entry = %path.escape_debug(),
                "archive entry escapes destination"
            );
            return Err(FsError::security(path.escape_debug().to_string()));
        }
        Ok(())
    }

    /// Reject link entries whose target leaves the destination.
    ///
    /// Symlink targets are relative to the entry's own directory; hard link
    /// targets name another entry and are checked like entry names.
    pub fn validate_link_target(
        &self,
        archive: &Path,
        entry_path: &str,
        target: &str,
        hard_link: bool,
    ) -> Result<()> {
        let unsafe_target = if hard_link {
            self.is_bad_entry_name(target)
        } else {
            self.is_rooted(target)
                || self.has_control_chars(target)
                || self.symlink_escapes(entry_path, target)
        };

        if unsafe_target {
            warn!(
                archive = %archive.display(),
                entry = %entry_path.escape_debug(),
                target = %target.escape_debug(),
                "archive link points outside the destination"
            );
            return Err(FsError::security(format!(
                "{} -> {}",
                entry_path.escape_debug(),
                target.escape_debug()
            )));
        }
        Ok(())
    }

    /// Reject entries written through another symlink entry of the same
    /// archive, and link targets that walk through one.
    ///
    /// Each link is checked against its own entry path, so on its own a chain
    /// such as `a/l1 -> ..` followed by `a/l1/l2 -> ..` looks harmless; once
    /// `l1` exists on disk the second link lands above the destination.
    pub fn validate_link_chain(
        &self,
        archive: &Path,
        entry_path: &str,
        link_target: Option<&str>,
        links: &HashSet<PathBuf>,
    ) -> Result<()> {
        let relative = Self::relative_destination(entry_path);
        let nested = relative
            .ancestors()
            .skip(1)
            .any(|ancestor| links.contains(ancestor));

        let chained = match link_target {
            Some(target) => match Self::link_walk(entry_path, target) {
                Some(visited) => visited.iter().any(|step| links.contains(step)),
                None => true,
            },
            None => false,
        };

        if nested || chained {
            warn!(
                archive = %archive.display(),
                entry = %entry_path.escape_debug(),
                "archive entry resolves through another symlink entry"
            );
            return Err(FsError::security(format!(
                "{} passes through a symlink in the archive",
                entry_path.escape_debug()
            )));
        }
        Ok(())
    }

    /// Destination-relative path of a validated entry name.
    pub fn relative_destination(path: &str) -> PathBuf {
        Self::segments(path)
            .filter(|segment| *segment != ".")
            .collect()
    }

    fn is_bad_entry_name(&self, path: &str) -> bool {
        path.is_empty()
            || self.climbs_parent(path)
            || self.is_rooted(path)
            || self.has_control_chars(path)
    }

    fn climbs_parent(&self, path: &str) -> bool {
        Self::segments(path).any(|segment| segment == "..")
    }

    fn is_rooted(&self, path: &str) -> bool {
        if path.starts_with('/') || path.starts_with('\\') {
            return true;
        }

        // Windows drive letter (C:, D:, etc.)
        let bytes = path.as_bytes();
        bytes.len() > 1 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
    }

    fn has_control_chars(&self, path: &str) -> bool {
        path.chars().any(|c| c.is_control())
    }

    fn symlink_escapes(&self, entry_path: &str, target: &str) -> bool {
        Self::link_walk(entry_path, target).is_none()
    }

    /// Every destination-relative location visited while following `target`
    /// from the link's parent directory, or `None` once the walk climbs above
    /// the destination.
    fn link_walk(entry_path: &str, target: &str) -> Option<Vec<PathBuf>> {
        let mut current: Vec<&str> = Self::segments(entry_path)
            .filter(|segment| *segment != ".")
            .collect();
        current.pop();

        let mut visited = Vec::new();
        for segment in Self::segments(target) {
            match segment {
                "." => continue,
                ".." => {
                    current.pop()?;
                }
                other => current.push(other),
            }
            visited.push(current.iter().collect::<PathBuf>());
        }
        Some(visited)
    }

    fn segments(path: &str) -> impl Iterator<Item = &str> {
        path.split(['/', '\\']).filter(|segment| !segment.is_empty())
    }
}
