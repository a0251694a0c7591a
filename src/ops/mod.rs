//! Recursive copy/delete engine
//!
//! Depth-first primitives that keep going after a sub-path fails and report
//! every failure through [`RecursiveOutcome`]. Nothing here is transactional:
//! an interrupted copy or delete leaves a partial result.

use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

pub mod claim;
pub mod outcome;

pub use claim::{claim_exact, claim_free_name, EntryShape, NameStyle};
pub use outcome::{
    BatchOutcome, BatchStatus, ErrorReport, ItemOutcome, PathFailure, RecursiveOutcome,
};

use crate::error::{FsError, Result};
use crate::sandbox::PathSandbox;

/// Copy and delete bound to one sandbox, so every visited child can be
/// re-checked against the root.
#[derive(Debug, Clone, Copy)]
pub struct TreeOps<'a> {
    sandbox: &'a PathSandbox,
}

impl<'a> TreeOps<'a> {
    pub fn new(sandbox: &'a PathSandbox) -> Self {
        Self { sandbox }
    }

    /// Delete `path` and, for a directory, everything below it. Symlinks are
    /// unlinked, never followed.
    pub fn delete_recursive(&self, path: &Path) -> RecursiveOutcome {
        let mut outcome = RecursiveOutcome::default();
        self.delete_into(path, &mut outcome);
        outcome
    }

    fn delete_into(&self, path: &Path, outcome: &mut RecursiveOutcome) {
        let logical = self.sandbox.to_logical(path);
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(err) => {
                outcome.record_failure(logical, &FsError::from_io(path, err));
                return;
            }
        };

        if meta.is_dir() {
            match fs::read_dir(path) {
                Ok(children) => {
                    for child in children {
                        match child {
                            Ok(child) => self.delete_into(&child.path(), outcome),
                            Err(err) => outcome.record_failure(&logical, &FsError::io(path, err)),
                        }
                    }
                }
                Err(err) => {
                    outcome.record_failure(&logical, &FsError::from_io(path, err));
                    return;
                }
            }
            match fs::remove_dir(path) {
                Ok(()) => outcome.record_success(),
                Err(err) => outcome.record_failure(logical, &FsError::from_io(path, err)),
            }
        } else {
            match fs::remove_file(path) {
                Ok(()) => outcome.record_success(),
                Err(err) => outcome.record_failure(logical, &FsError::from_io(path, err)),
            }
        }
    }

    /// Copy `source` to `destination`, creating directories as needed and
    /// overwriting files that already exist mid-tree. Children whose real
    /// location is outside the root are recorded as failures.
    pub fn copy_recursive(&self, source: &Path, destination: &Path) -> RecursiveOutcome {
        let mut outcome = RecursiveOutcome::default();

        if let Ok(real_source) = self.sandbox.check_real(source) {
            if real_source.is_dir() {
                let real_destination = self
                    .sandbox
                    .check_real(destination)
                    .unwrap_or_else(|_| destination.to_path_buf());
                if real_destination.starts_with(&real_source) {
                    outcome.record_failure(
                        self.sandbox.to_logical(destination),
                        &FsError::invalid_input("cannot copy a directory into itself"),
                    );
                    return outcome;
                }
            }
        }

        self.copy_into(source, destination, &mut outcome);
        outcome
    }

    fn copy_into(&self, source: &Path, destination: &Path, outcome: &mut RecursiveOutcome) {
        let logical = self.sandbox.to_logical(source);
        let real = match self.sandbox.check_real(source) {
            Ok(real) => real,
            Err(err) => {
                outcome.record_failure(logical, &err);
                return;
            }
        };
        let meta = match fs::metadata(&real) {
            Ok(meta) => meta,
            Err(err) => {
                outcome.record_failure(logical, &FsError::from_io(source, err));
                return;
            }
        };

        if meta.is_dir() {
            if let Err(err) = Self::ensure_directory(destination) {
                outcome.record_failure(self.sandbox.to_logical(destination), &err);
                return;
            }
            outcome.record_success();

            let children = match fs::read_dir(&real) {
                Ok(children) => children,
                Err(err) => {
                    outcome.record_failure(logical, &FsError::from_io(source, err));
                    return;
                }
            };
            for child in children {
                match child {
                    Ok(child) => {
                        let name = child.file_name();
                        self.copy_into(&source.join(&name), &destination.join(&name), outcome);
                    }
                    Err(err) => outcome.record_failure(&logical, &FsError::io(source, err)),
                }
            }
        } else {
            // Never write through a symlink sitting at the destination.
            if let Err(err) = Self::unlink_if_symlink(destination) {
                outcome.record_failure(self.sandbox.to_logical(destination), &err);
                return;
            }
            match fs::copy(&real, destination) {
                Ok(_) => outcome.record_success(),
                Err(err) => outcome.record_failure(logical, &FsError::from_io(destination, err)),
            }
        }
    }

    fn ensure_directory(path: &Path) -> Result<()> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(FsError::AlreadyExists(path.display().to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                fs::create_dir(path).map_err(|e| FsError::from_io(path, e))
            }
            Err(err) => Err(FsError::io(path, err)),
        }
    }

    fn unlink_if_symlink(path: &Path) -> Result<()> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                fs::remove_file(path).map_err(|e| FsError::io(path, e))
            }
            _ => Ok(()),
        }
    }

    /// Move `source` onto `claimed`, a placeholder this process created.
    ///
    /// When the rename crosses filesystems and `cross_device_fallback` is set,
    /// the tree is copied and the source deleted; a failed copy is rolled
    /// back so the source stays the only copy. On any other failure the
    /// placeholder is released.
    pub fn relocate(
        &self,
        source: &Path,
        claimed: &Path,
        shape: EntryShape,
        cross_device_fallback: bool,
    ) -> Result<()> {
        match fs::rename(source, claimed) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::CrossesDevices && cross_device_fallback => {
                info!(
                    source = %source.display(),
                    destination = %claimed.display(),
                    "rename crosses devices, falling back to copy and delete"
                );
                self.copy_then_delete(source, claimed)
            }
            Err(err) => {
                claim::release(claimed, shape);
                Err(FsError::from_io(source, err))
            }
        }
    }

    fn copy_then_delete(&self, source: &Path, destination: &Path) -> Result<()> {
        let copied = self.copy_exact(source, destination);
        if !copied.is_complete() {
            warn!(source = %source.display(), failures = copied.failures.len(), "cross-device copy failed, rolling back");
            let rollback = self.delete_recursive(destination);
            if !rollback.is_complete() {
                warn!(destination = %destination.display(), "rollback left partial copy behind");
            }
            return copied.into_result().map(|_| ());
        }

        let removed = self.delete_recursive(source);
        if !removed.is_complete() {
            warn!(source = %source.display(), "source only partially removed after cross-device copy");
        }
        removed.into_result().map(|_| ())
    }

    /// Copy that keeps symlinks as symlinks, used where the item is moving
    /// rather than being duplicated.
    fn copy_exact(&self, source: &Path, destination: &Path) -> RecursiveOutcome {
        let meta = match fs::symlink_metadata(source) {
            Ok(meta) => meta,
            Err(err) => {
                let mut outcome = RecursiveOutcome::default();
                outcome.record_failure(
                    self.sandbox.to_logical(source),
                    &FsError::from_io(source, err),
                );
                return outcome;
            }
        };

        if meta.file_type().is_symlink() {
            let mut outcome = RecursiveOutcome::default();
            let result = fs::read_link(source).and_then(|target| {
                let _ = fs::remove_file(destination);
                Self::symlink(&target, destination)
            });
            match result {
                Ok(()) => outcome.record_success(),
                Err(err) => outcome.record_failure(
                    self.sandbox.to_logical(source),
                    &FsError::io(destination, err),
                ),
            }
            debug!(link = %source.display(), "copied symlink as link");
            return outcome;
        }

        self.copy_recursive(source, destination)
    }

    #[cfg(unix)]
    fn symlink(target: &Path, at: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, at)
    }

    #[cfg(not(unix))]
    fn symlink(_target: &Path, _at: &Path) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}
