//! Path sandbox
//!
//! Resolves caller-supplied logical paths against the configured root and
//! rejects anything whose real location falls outside it. Every component of
//! the engine calls into this module before touching the filesystem, including
//! for destination paths.
//!
//! Resolution policy:
//! - `.` and empty segments are dropped, `..` is applied lexically and may never
//!   climb above the root.
//! - The candidate is canonicalized, following symlinks to their real target.
//! - A path that does not exist yet is accepted when its deepest existing
//!   ancestor canonicalizes inside the root; the missing tail is appended as-is.
//! - Dangling symlinks are rejected because their target cannot be verified.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::RootConfig;
use crate::error::{FsError, Result};


#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
    trash_dir_name: String,
}

impl PathSandbox {
    pub fn new(root: &Path, trash_dir_name: &str) -> Result<Self> {
        let canonical_root = root.canonicalize().map_err(|e| FsError::from_io(root, e))?;
        if !canonical_root.is_dir() {
            return Err(FsError::invalid_input(format!(
                "root {} is not a directory",
                canonical_root.display()
            )));
        }

        Ok(Self {
            root: canonical_root,
            trash_dir_name: trash_dir_name.to_string(),
        })
    }

    pub fn from_config(config: &RootConfig) -> Result<Self> {
        Self::new(&config.root, &config.trash_dir_name)
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trash_dir(&self) -> PathBuf {
        self.root.join(&self.trash_dir_name)
    }

    pub fn trash_dir_name(&self) -> &str {
        &self.trash_dir_name
    }

    /// True for the trash directory itself and everything below it.
    pub fn is_in_trash(&self, path: &Path) -> bool {
        path.starts_with(self.trash_dir())
    }

    /// Resolve a logical path to an absolute path inside the root.
    pub fn resolve(&self, logical: &str) -> Result<PathBuf> {
        let components = Self::normalize(logical)?;
        let candidate = components
            .iter()
            .fold(self.root.clone(), |path, component| path.join(component));

        let resolved = self.real_path(&candidate, logical)?;
        self.ensure_contained(&resolved, logical)?;
        debug!(logical = logical, resolved = %resolved.display(), "path resolved");
        Ok(resolved)
    }

    /// Resolve `name` inside the logical directory `dir`, following symlinks.
    ///
    /// Use this for anything that reads or writes through the entry.
    pub fn resolve_entry(&self, dir: &str, name: &str) -> Result<PathBuf> {
        Self::validate_name(name)?;
        let parent = self.resolve(dir)?;
        let candidate = parent.join(name);
        let logical = self.to_logical(&candidate);
        let resolved = self.real_path(&candidate, &logical)?;
        self.ensure_contained(&resolved, &logical)?;
        Ok(resolved)
    }

    /// Locate `name` inside the logical directory `dir` without following a
    /// symlink in the final component.
    ///
    /// Use this for operations acting on the directory entry itself (rename,
    /// unlink, trash), where the link target is never touched.
    pub fn resolve_link(&self, dir: &str, name: &str) -> Result<PathBuf> {
        Self::validate_name(name)?;
        let parent = self.resolve(dir)?;
        Ok(parent.join(name))
    }

    /// Canonicalize an absolute path produced inside the engine (a directory
    /// child, an archive member) and confirm it is still inside the root.
    pub fn check_real(&self, path: &Path) -> Result<PathBuf> {
        let logical = self.to_logical(path);
        let resolved = self.real_path(path, &logical)?;
        self.ensure_contained(&resolved, &logical)?;
        Ok(resolved)
    }

    /// Like [`check_real`](Self::check_real), but the real path must also
    /// stay below `base`, which must already be canonical.
    pub fn check_within(&self, path: &Path, base: &Path) -> Result<PathBuf> {
        let resolved = self.check_real(path)?;
        if resolved.starts_with(base) {
            Ok(resolved)
        } else {
            let logical = self.to_logical(path);
            warn!(
                logical = %logical,
                resolved = %resolved.display(),
                base = %base.display(),
                "resolved path leaves its directory"
            );
            Err(FsError::security(logical))
        }
    }

    /// Root-relative, forward-slash form of an absolute path (`/` for the root).
    pub fn to_logical(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(relative) => {
                let joined = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                format!("/{}", joined)
            }
            Err(_) => path.display().to_string(),
        }
    }

    /// A single directory-entry name: no separators, no `.`/`..`, no control
    /// characters.
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(FsError::invalid_input("name cannot be empty"));
        }
        if name == "." || name == ".." {
            return Err(FsError::security(name));
        }
        if name.contains('/') {
            return Err(FsError::invalid_input(format!(
                "name must not contain path separators: {}",
                name
            )));
        }
        if name.chars().any(|c| c.is_control()) {
            return Err(FsError::security(name.escape_debug().to_string()));
        }
        Ok(())
    }

    fn normalize(logical: &str) -> Result<Vec<&str>> {
        if logical.chars().any(|c| c.is_control()) {
            warn!(logical = %logical.escape_debug(), "control characters in path");
            return Err(FsError::security(logical.escape_debug().to_string()));
        }

        let mut components: Vec<&str> = Vec::new();
        for segment in logical.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if components.pop().is_none() {
                        warn!(logical = logical, "path climbs above the root");
                        return Err(FsError::security(logical));
                    }
                }
                other => components.push(other),
            }
        }
        Ok(components)
    }

    fn real_path(&self, candidate: &Path, logical: &str) -> Result<PathBuf> {
        match candidate.canonicalize() {
            Ok(path) => Ok(path),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.resolve_missing(candidate, logical)
            }
            Err(err) => Err(FsError::io(candidate, err)),
        }
    }

    /// Resolve a path whose final components do not exist yet.
    fn resolve_missing(&self, candidate: &Path, logical: &str) -> Result<PathBuf> {
        let mut tail = Vec::new();
        let mut current = candidate;

        loop {
            if Self::is_symlink(current) {
                warn!(path = %current.display(), "dangling symlink in path");
                return Err(FsError::security(logical));
            }

            let name = match current.file_name() {
                Some(name) => name.to_os_string(),
                None => return Err(FsError::security(logical)),
            };
            tail.push(name);

            current = match current.parent() {
                Some(parent) => parent,
                None => return Err(FsError::security(logical)),
            };

            match current.canonicalize() {
                Ok(base) => {
                    let resolved = tail.iter().rev().fold(base, |path, part| path.join(part));
                    return Ok(resolved);
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(FsError::io(current, err)),
            }
        }
    }

    fn ensure_contained(&self, resolved: &Path, logical: &str) -> Result<()> {
        if resolved.starts_with(&self.root) {
            Ok(())
        } else {
            warn!(
                logical = logical,
                resolved = %resolved.display(),
                "resolved path escapes the root"
            );
            Err(FsError::security(logical))
        }
    }

    fn is_symlink(path: &Path) -> bool {
        std::fs::symlink_metadata(path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false)
    }
}
