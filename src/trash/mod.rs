//! Trash subsystem
//!
//! Soft delete into a reserved directory under the root, with a sidecar
//! recording where each item came from. Items move
//! `Live -> Trashed -> {Restored, PermanentlyDeleted}`.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub mod record;

pub use record::{TrashRecord, TRASHINFO_SUFFIX};

use crate::error::{FsError, Result};
use crate::ops::{
    claim_free_name, BatchOutcome, EntryShape, ItemOutcome, NameStyle, RecursiveOutcome, TreeOps,
};
use crate::sandbox::PathSandbox;

/// An item that was just moved into the trash.
#[derive(Debug, Clone, Serialize)]
pub struct TrashedItem {
    /// Absolute location inside the trash directory.
    #[serde(skip)]
    pub path: PathBuf,
    /// Logical location inside the trash directory.
    pub trash_path: String,
    pub record: TrashRecord,
}

/// One entry of the trash listing.
#[derive(Debug, Clone, Serialize)]
pub struct TrashEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    /// `None` when the sidecar is missing or unreadable.
    pub record: Option<TrashRecord>,
}

pub struct TrashBin<'a> {
    sandbox: &'a PathSandbox,
    ops: TreeOps<'a>,
    cross_device_fallback: bool,
}

impl<'a> TrashBin<'a> {
    pub fn new(sandbox: &'a PathSandbox, cross_device_fallback: bool) -> Self {
        Self {
            sandbox,
            ops: TreeOps::new(sandbox),
            cross_device_fallback,
        }
    }

    fn ensure_trash_dir(&self) -> Result<PathBuf> {
        let trash_dir = self.sandbox.trash_dir();
        match fs::symlink_metadata(&trash_dir) {
            Ok(meta) if meta.is_dir() => Ok(trash_dir),
            Ok(_) => Err(FsError::invalid_input(format!(
                "{} exists and is not a directory",
                self.sandbox.to_logical(&trash_dir)
            ))),
            Err(_) => {
                fs::create_dir_all(&trash_dir).map_err(|e| FsError::io(&trash_dir, e))?;
                info!(trash = %trash_dir.display(), "created trash directory");
                Ok(trash_dir)
            }
        }
    }

    /// Direct child of the trash directory, which is where every trashed item
    /// and sidecar lives.
    pub fn is_trashed_item(&self, path: &Path) -> bool {
        path.parent() == Some(self.sandbox.trash_dir().as_path())
    }

    /// Move the entry at `source` (not following a final symlink) into the
    /// trash under a collision-free name and record where it came from.
    pub fn move_to_trash(&self, source: &Path) -> Result<TrashedItem> {
        if source == self.sandbox.root() {
            return Err(FsError::invalid_input("cannot trash the root directory"));
        }
        if self.sandbox.is_in_trash(source) {
            return Err(FsError::invalid_input(format!(
                "{} is already in the trash",
                self.sandbox.to_logical(source)
            )));
        }

        let name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| FsError::invalid_input("cannot trash an unnamed path"))?;
        if TrashRecord::is_sidecar_name(&name) {
            return Err(FsError::invalid_input(format!(
                "names ending in {} are reserved for trash metadata",
                TRASHINFO_SUFFIX
            )));
        }

        let shape = EntryShape::of(source)?;
        let trash_dir = self.ensure_trash_dir()?;
        let claimed = claim_free_name(&trash_dir, &name, NameStyle::Numbered, shape, |candidate| {
            TrashRecord::sidecar_path(candidate).exists()
        })?;

        self.ops
            .relocate(source, &claimed, shape, self.cross_device_fallback)?;

        let record = TrashRecord::now(self.sandbox.to_logical(source), name);
        if let Err(err) = record.write(&claimed) {
            // The move already happened; the item stays trashed without metadata.
            warn!(item = %claimed.display(), error = %err, "failed to write trash metadata");
        }

        info!(
            source = %source.display(),
            trashed = %claimed.display(),
            "moved to trash"
        );
        Ok(TrashedItem {
            trash_path: self.sandbox.to_logical(&claimed),
            path: claimed,
            record,
        })
    }

    /// Move a trashed item back to its recorded location, or to a
    /// `(restored N)` variant when that name is taken. The sidecar is removed
    /// only after the item has moved.
    pub fn restore(&self, trashed: &Path) -> Result<PathBuf> {
        if !self.is_trashed_item(trashed) {
            return Err(FsError::invalid_input(format!(
                "{} is not an item in the trash",
                self.sandbox.to_logical(trashed)
            )));
        }
        let shape = EntryShape::of(trashed)?;
        let record = TrashRecord::read(trashed)?;

        let original = Path::new(&record.original_path);
        let name = original
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| FsError::security(record.original_path.clone()))?;
        PathSandbox::validate_name(&name)?;
        let parent_logical = original
            .parent()
            .map(|parent| parent.to_string_lossy().into_owned())
            .unwrap_or_default();

        let parent = self.sandbox.resolve(&parent_logical)?;
        if self.sandbox.is_in_trash(&parent) {
            return Err(FsError::security(record.original_path.clone()));
        }
        fs::create_dir_all(&parent).map_err(|e| FsError::io(&parent, e))?;

        let claimed = claim_free_name(&parent, &name, NameStyle::Restored, shape, |_| false)?;
        self.ops
            .relocate(trashed, &claimed, shape, self.cross_device_fallback)?;

        if let Err(err) = TrashRecord::remove(trashed) {
            warn!(item = %trashed.display(), error = %err, "restored item but could not remove its metadata");
        }

        info!(
            trashed = %trashed.display(),
            restored = %claimed.display(),
            "restored from trash"
        );
        Ok(claimed)
    }

    /// Delete `path` for good. A trashed item takes its sidecar with it.
    pub fn delete_permanently(&self, path: &Path) -> RecursiveOutcome {
        let outcome = self.ops.delete_recursive(path);
        if outcome.is_complete() && self.is_trashed_item(path) {
            if let Err(err) = TrashRecord::remove(path) {
                warn!(item = %path.display(), error = %err, "failed to remove trash metadata");
            }
        }
        outcome
    }

    /// Permanently delete every trashed item and any orphaned sidecar.
    pub fn empty(&self) -> Result<BatchOutcome> {
        let mut batch = BatchOutcome::default();
        let trash_dir = self.sandbox.trash_dir();
        if !trash_dir.is_dir() {
            return Ok(batch);
        }

        let mut sidecars = Vec::new();
        for entry in fs::read_dir(&trash_dir).map_err(|e| FsError::io(&trash_dir, e))? {
            let entry = entry.map_err(|e| FsError::io(&trash_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if TrashRecord::is_sidecar_name(&name) {
                sidecars.push(entry.path());
                continue;
            }
            let outcome = self.delete_permanently(&entry.path());
            batch.push(ItemOutcome::from_recursive(name, None, outcome));
        }

        for sidecar in sidecars {
            if let Err(err) = fs::remove_file(&sidecar) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    debug!(sidecar = %sidecar.display(), error = %err, "failed to remove orphaned sidecar");
                }
            }
        }

        info!(deleted = batch.succeeded(), failed = batch.failed(), "trash emptied");
        Ok(batch)
    }

    /// Every trashed item with its parsed record, sorted by name.
    pub fn list(&self) -> Result<Vec<TrashEntry>> {
        let trash_dir = self.sandbox.trash_dir();
        if !trash_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&trash_dir).map_err(|e| FsError::io(&trash_dir, e))? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(error = %err, "skipping unreadable trash entry");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if TrashRecord::is_sidecar_name(&name) {
                continue;
            }

            let path = entry.path();
            entries.push(TrashEntry {
                is_dir: entry.file_type().map(|t| t.is_dir()).unwrap_or(false),
                record: TrashRecord::read(&path).ok(),
                path: self.sandbox.to_logical(&path),
                name,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
