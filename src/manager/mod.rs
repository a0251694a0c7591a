//! File manager facade
//!
//! One [`FileManager`] serves one root. Every caller-supplied path, including
//! destination directories, goes through the sandbox before anything touches
//! the filesystem. Single-item operations return their first error; batch
//! operations return a [`BatchOutcome`] with one entry per requested name.

use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::archive::{
    default_destination, ArchiveEngine, ArchiveSummary, CompressFormat, CompressJob, ExtractJob,
};
use crate::config::RootConfig;
use crate::error::{FsError, Result};
use crate::listing::{
    build_tree, list_directory, search, FileEntry, SearchHit, SortKey, SortOrder, TreeNode,
};
use crate::ops::{
    claim_exact, claim_free_name, BatchOutcome, EntryShape, ItemOutcome, NameStyle, TreeOps,
};
use crate::sandbox::PathSandbox;
use crate::trash::{TrashBin, TrashEntry, TrashRecord};

/// Highest mode `change_permissions` accepts (setuid, setgid, sticky, rwx).
pub const MAX_MODE: u32 = 0o7777;

/// Result of a compress or extract call.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    /// Logical path of the archive written, or of the extraction directory.
    pub path: String,
    pub format: String,
    #[serde(flatten)]
    pub summary: ArchiveSummary,
}

#[derive(Debug, Clone)]
pub struct FileManager {
    config: RootConfig,
    sandbox: PathSandbox,
}

impl FileManager {
    pub fn new(config: RootConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| FsError::invalid_input(format!("{:#}", e)))?;
        let sandbox = PathSandbox::from_config(&config)?;
        info!(root = %sandbox.root().display(), "file manager ready");
        Ok(Self { config, sandbox })
    }

    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    fn trash_bin(&self) -> TrashBin<'_> {
        TrashBin::new(&self.sandbox, self.config.cross_device_fallback)
    }

    fn tree_ops(&self) -> TreeOps<'_> {
        TreeOps::new(&self.sandbox)
    }

    fn archive_engine(&self) -> ArchiveEngine<'_> {
        ArchiveEngine::new(&self.sandbox, &self.config.archive, &self.config.tools)
    }

    fn resolve_dir(&self, logical: &str) -> Result<PathBuf> {
        let dir = self.sandbox.resolve(logical)?;
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(FsError::invalid_input(format!(
                "{} is not a directory",
                self.sandbox.to_logical(&dir)
            ))),
            Err(err) => Err(FsError::from_io(self.sandbox.to_logical(&dir), err)),
        }
    }

    fn require_exists(&self, path: &Path) -> Result<()> {
        fs::symlink_metadata(path)
            .map(|_| ())
            .map_err(|e| FsError::from_io(self.sandbox.to_logical(path), e))
    }

    /// The root and the trash directory itself are never moved or deleted as
    /// ordinary items.
    fn refuse_reserved(&self, path: &Path) -> Result<()> {
        if path == self.sandbox.root() || path == self.sandbox.trash_dir() {
            return Err(FsError::invalid_input(format!(
                "{} cannot be modified",
                self.sandbox.to_logical(path)
            )));
        }
        Ok(())
    }

    /// Items only enter the trash through [`trash`](Self::trash), which
    /// writes their sidecar.
    fn refuse_trash_destination(&self, destination: &Path) -> Result<()> {
        if self.sandbox.is_in_trash(destination) {
            return Err(FsError::invalid_input(
                "use trash to move items into the trash",
            ));
        }
        Ok(())
    }

    fn check_extension(&self, name: &str) -> Result<()> {
        if self.config.is_allowed_extension(name) {
            Ok(())
        } else {
            Err(FsError::invalid_input(format!(
                "file type of {} is not allowed",
                name
            )))
        }
    }

    fn run_batch<S, F>(&self, verb: &str, names: &[S], mut op: F) -> BatchOutcome
    where
        S: AsRef<str>,
        F: FnMut(&str) -> Result<ItemOutcome>,
    {
        let mut batch = BatchOutcome::default();
        for name in names {
            let name = name.as_ref();
            match op(name) {
                Ok(item) => batch.push(item),
                Err(err) => {
                    debug!(item = name, error = %err, "{} failed", verb);
                    batch.push(ItemOutcome::failed(name, &err));
                }
            }
        }
        info!(
            succeeded = batch.succeeded(),
            failed = batch.failed(),
            "{} finished",
            verb
        );
        batch
    }

    /// Immediate children of `dir`, directories first. The trash directory
    /// is left out of the root listing when `hide_trash` is set, and
    /// sidecars are left out of the trash listing.
    pub fn list(&self, dir: &str, sort: SortKey, order: SortOrder) -> Result<Vec<FileEntry>> {
        let path = self.resolve_dir(dir)?;
        let hidden: Vec<&str> = if self.config.hide_trash && path == self.sandbox.root() {
            vec![self.sandbox.trash_dir_name()]
        } else {
            Vec::new()
        };

        let mut entries = list_directory(&path, sort, order, &hidden)?;
        if path == self.sandbox.trash_dir() {
            entries.retain(|entry| !TrashRecord::is_sidecar_name(&entry.name));
        }
        Ok(entries)
    }

    pub fn tree(&self) -> Result<Vec<TreeNode>> {
        build_tree(&self.sandbox, self.sandbox.root(), self.config.hide_trash)
    }

    pub fn search(&self, dir: &str, query: &str) -> Result<Vec<SearchHit>> {
        let start = self.resolve_dir(dir)?;
        search(&self.sandbox, &start, query, self.config.hide_trash)
    }

    pub fn create_directory(&self, parent: &str, name: &str) -> Result<String> {
        self.resolve_dir(parent)?;
        let path = self.sandbox.resolve_link(parent, name)?;
        fs::create_dir(&path).map_err(|e| FsError::from_io(self.sandbox.to_logical(&path), e))?;

        let logical = self.sandbox.to_logical(&path);
        info!(path = %logical, "directory created");
        Ok(logical)
    }

    /// Create a new file holding `content`. Never replaces an existing entry.
    pub fn create_file(&self, parent: &str, name: &str, content: &str) -> Result<String> {
        self.check_extension(name)?;
        self.resolve_dir(parent)?;
        let path = self.sandbox.resolve_link(parent, name)?;
        let logical = self.sandbox.to_logical(&path);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| FsError::from_io(&logical, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| FsError::io(&path, e))?;

        info!(path = %logical, bytes = content.len(), "file created");
        Ok(logical)
    }

    /// Rename an entry within `dir`. Fails with `AlreadyExists` rather than
    /// replacing whatever holds `new_name`.
    pub fn rename(&self, dir: &str, old_name: &str, new_name: &str) -> Result<String> {
        let source = self.sandbox.resolve_link(dir, old_name)?;
        self.require_exists(&source)?;
        self.refuse_reserved(&source)?;
        if self.sandbox.is_in_trash(&source) {
            return Err(FsError::invalid_input(format!(
                "{} is in the trash; restore it before renaming",
                self.sandbox.to_logical(&source)
            )));
        }
        let shape = EntryShape::of(&source)?;
        if shape == EntryShape::File {
            self.check_extension(new_name)?;
        }

        let target = self.sandbox.resolve_link(dir, new_name)?;
        let logical = self.sandbox.to_logical(&target);
        claim_exact(&target, shape).map_err(|e| FsError::from_io(&logical, e))?;
        self.tree_ops().relocate(&source, &target, shape, false)?;

        info!(from = %self.sandbox.to_logical(&source), to = %logical, "renamed");
        Ok(logical)
    }

    pub fn trash<S: AsRef<str>>(&self, dir: &str, names: &[S]) -> BatchOutcome {
        let bin = self.trash_bin();
        self.run_batch("trash", names, |name| {
            let source = self.sandbox.resolve_link(dir, name)?;
            self.require_exists(&source)?;
            let trashed = bin.move_to_trash(&source)?;
            Ok(ItemOutcome::ok(name, Some(trashed.trash_path)))
        })
    }

    /// Delete each named item for good. Protected names fail individually.
    pub fn delete_permanent<S: AsRef<str>>(&self, dir: &str, names: &[S]) -> BatchOutcome {
        let bin = self.trash_bin();
        self.run_batch("delete", names, |name| {
            if self.config.is_protected(name) {
                return Err(FsError::invalid_input(format!("{} is protected", name)));
            }
            let path = self.sandbox.resolve_link(dir, name)?;
            self.require_exists(&path)?;
            self.refuse_reserved(&path)?;
            Ok(ItemOutcome::from_recursive(
                name,
                None,
                bin.delete_permanently(&path),
            ))
        })
    }

    /// Restore items named from the trash listing in `dir`.
    pub fn restore<S: AsRef<str>>(&self, dir: &str, names: &[S]) -> BatchOutcome {
        let bin = self.trash_bin();
        self.run_batch("restore", names, |name| {
            let trashed = self.sandbox.resolve_link(dir, name)?;
            self.require_exists(&trashed)?;
            let restored = bin.restore(&trashed)?;
            Ok(ItemOutcome::ok(name, Some(self.sandbox.to_logical(&restored))))
        })
    }

    /// Copy each item into `destination_dir`. Existing files in the way are
    /// overwritten; copying an item onto itself makes a numbered duplicate.
    pub fn copy<S: AsRef<str>>(
        &self,
        source_dir: &str,
        names: &[S],
        destination_dir: &str,
    ) -> BatchOutcome {
        let ops = self.tree_ops();
        self.run_batch("copy", names, |name| {
            let destination = self.resolve_dir(destination_dir)?;
            self.refuse_trash_destination(&destination)?;
            let source = self.sandbox.resolve_entry(source_dir, name)?;
            self.require_exists(&source)?;
            self.refuse_reserved(&source)?;

            let mut target = self.sandbox.resolve_entry(destination_dir, name)?;
            if target == source {
                target = claim_free_name(
                    &destination,
                    name,
                    NameStyle::Numbered,
                    EntryShape::of(&source)?,
                    |_| false,
                )?;
            }

            let outcome = ops.copy_recursive(&source, &target);
            Ok(ItemOutcome::from_recursive(
                name,
                Some(self.sandbox.to_logical(&target)),
                outcome,
            ))
        })
    }

    /// Move each item into `destination_dir`; an occupied destination fails
    /// that item with `AlreadyExists`.
    pub fn move_items<S: AsRef<str>>(
        &self,
        source_dir: &str,
        names: &[S],
        destination_dir: &str,
    ) -> BatchOutcome {
        let ops = self.tree_ops();
        self.run_batch("move", names, |name| {
            let destination = self.resolve_dir(destination_dir)?;
            let source = self.sandbox.resolve_link(source_dir, name)?;
            self.require_exists(&source)?;
            self.refuse_reserved(&source)?;
            if destination.starts_with(&source) {
                return Err(FsError::invalid_input(format!(
                    "cannot move {} into itself",
                    self.sandbox.to_logical(&source)
                )));
            }
            self.refuse_trash_destination(&destination)?;

            let target = self.sandbox.resolve_link(destination_dir, name)?;
            let logical = self.sandbox.to_logical(&target);
            let shape = EntryShape::of(&source)?;
            claim_exact(&target, shape).map_err(|e| FsError::from_io(&logical, e))?;
            ops.relocate(&source, &target, shape, self.config.cross_device_fallback)?;

            info!(from = %self.sandbox.to_logical(&source), to = %logical, "moved");
            Ok(ItemOutcome::ok(name, Some(logical)))
        })
    }

    /// Apply an octal mode such as `755` or `0o644`. Returns the mode set.
    pub fn change_permissions(&self, path: &str, mode: &str) -> Result<u32> {
        let mode = parse_mode(mode)?;
        let target = self.sandbox.resolve(path)?;
        self.require_exists(&target)?;
        set_mode(&target, mode)?;

        info!(
            path = %self.sandbox.to_logical(&target),
            mode = %format!("{:o}", mode),
            "permissions changed"
        );
        Ok(mode)
    }

    /// Pack the named items of `dir` into `<archive_name><ext>` inside `dir`.
    pub fn compress<S: AsRef<str>>(
        &self,
        dir: &str,
        names: &[S],
        archive_name: &str,
        format: CompressFormat,
    ) -> Result<ArchiveReport> {
        let base = match archive_name.trim() {
            "" => "archive",
            name => name,
        };
        let file_name = format!("{}{}", base, format.extension());
        let output = self.sandbox.resolve_entry(dir, &file_name)?;

        let inputs = names
            .iter()
            .map(|name| {
                let input = self.sandbox.resolve_entry(dir, name.as_ref())?;
                self.require_exists(&input)?;
                Ok(input)
            })
            .collect::<Result<Vec<_>>>()?;

        let job = CompressJob {
            inputs,
            output,
            format,
        };
        let summary = self.archive_engine().compress(&job)?;
        Ok(ArchiveReport {
            path: self.sandbox.to_logical(&job.output),
            format: format.extension().trim_start_matches('.').to_string(),
            summary,
        })
    }

    /// Extract `archive` into `destination`, or next to the archive when no
    /// destination is given.
    pub fn extract(&self, archive: &str, destination: Option<&str>) -> Result<ArchiveReport> {
        let archive_path = self.sandbox.resolve(archive)?;
        let destination = match destination.map(str::trim) {
            Some(dir) if !dir.is_empty() => self.sandbox.resolve(dir)?,
            _ => self.sandbox.check_real(&default_destination(&archive_path))?,
        };

        let job = ExtractJob::new(archive_path, destination);
        let summary = self.archive_engine().extract(&job)?;
        Ok(ArchiveReport {
            path: self.sandbox.to_logical(&job.destination),
            format: job.kind.name().to_string(),
            summary,
        })
    }

    /// UTF-8 content of an existing file no larger than `max_edit_bytes`.
    pub fn read_file(&self, dir: &str, name: &str) -> Result<String> {
        let path = self.sandbox.resolve_entry(dir, name)?;
        let logical = self.sandbox.to_logical(&path);
        let meta = fs::metadata(&path).map_err(|e| FsError::from_io(&logical, e))?;
        if !meta.is_file() {
            return Err(FsError::invalid_input(format!("{} is not a file", logical)));
        }
        if meta.len() > self.config.max_edit_bytes {
            return Err(FsError::invalid_input(format!(
                "{} is larger than {} bytes",
                logical, self.config.max_edit_bytes
            )));
        }

        fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => {
                FsError::invalid_input(format!("{} is not valid UTF-8 text", logical))
            }
            _ => FsError::io(&path, e),
        })
    }

    /// Replace the content of an existing file.
    pub fn save_file(&self, dir: &str, name: &str, content: &str) -> Result<u64> {
        self.check_extension(name)?;
        let path = self.sandbox.resolve_entry(dir, name)?;
        let logical = self.sandbox.to_logical(&path);
        let meta = fs::metadata(&path).map_err(|e| FsError::from_io(&logical, e))?;
        if !meta.is_file() {
            return Err(FsError::invalid_input(format!("{} is not a file", logical)));
        }
        if content.len() as u64 > self.config.max_edit_bytes {
            return Err(FsError::invalid_input(format!(
                "content is larger than {} bytes",
                self.config.max_edit_bytes
            )));
        }

        fs::write(&path, content).map_err(|e| FsError::io(&path, e))?;
        info!(path = %logical, bytes = content.len(), "file saved");
        Ok(content.len() as u64)
    }

    pub fn empty_trash(&self) -> Result<BatchOutcome> {
        let batch = self.trash_bin().empty()?;
        if batch.failed() > 0 {
            warn!(failed = batch.failed(), "trash emptied with failures");
        }
        Ok(batch)
    }

    pub fn list_trash(&self) -> Result<Vec<TrashEntry>> {
        self.trash_bin().list()
    }
}

/// Parse an octal permission string. Accepts an optional `0o` prefix.
pub fn parse_mode(raw: &str) -> Result<u32> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0o")
        .or_else(|| trimmed.strip_prefix("0O"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(FsError::invalid_input("permission mode is empty"));
    }

    let mode = u32::from_str_radix(digits, 8)
        .map_err(|_| FsError::invalid_input(format!("invalid octal mode: {}", raw)))?;
    if mode > MAX_MODE {
        return Err(FsError::invalid_input(format!(
            "mode {} is out of range",
            raw
        )));
    }
    Ok(mode)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| FsError::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, _mode: u32) -> Result<()> {
    Err(FsError::invalid_input(format!(
        "changing permissions of {} is only supported on unix",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::BatchStatus;
    use tempfile::TempDir;

    fn manager() -> (TempDir, FileManager) {
        let dir = TempDir::new().unwrap();
        let manager = FileManager::new(RootConfig::new(dir.path())).unwrap();
        (dir, manager)
    }

    #[test]
    fn test_create_and_list() {
        let (dir, fm) = manager();
        fm.create_directory("/", "docs").unwrap();
        assert_eq!(
            fm.create_file("/docs", "readme.txt", "hello").unwrap(),
            "/docs/readme.txt"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("docs/readme.txt")).unwrap(),
            "hello"
        );

        let err = fm.create_directory("/", "docs").unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");
        let err = fm.create_file("/docs", "readme.txt", "again").unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");
        assert_eq!(
            fs::read_to_string(dir.path().join("docs/readme.txt")).unwrap(),
            "hello"
        );

        let entries = fm.list("/docs", SortKey::Name, SortOrder::Asc).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "readme.txt");
    }

    #[test]
    fn test_create_rejects_bad_names_and_extensions() {
        let dir = TempDir::new().unwrap();
        let config = RootConfig::new(dir.path()).with_allowed_extensions(vec!["txt".into()]);
        let fm = FileManager::new(config).unwrap();

        assert_eq!(fm.create_file("/", "../x.txt", "").unwrap_err().code(), "INVALID_INPUT");
        assert_eq!(fm.create_file("/", "run.sh", "").unwrap_err().code(), "INVALID_INPUT");
        assert_eq!(fm.create_file("/../..", "x.txt", "").unwrap_err().code(), "SECURITY_VIOLATION");
        assert!(fm.create_file("/", "notes.TXT", "").is_ok());
    }

    #[test]
    fn test_root_listing_hides_trash() {
        let (dir, fm) = manager();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let batch = fm.trash("/", &["a.txt"]);
        assert_eq!(batch.status(), BatchStatus::AllSucceeded);

        assert!(fm.list("/", SortKey::Name, SortOrder::Asc).unwrap().is_empty());
        let trashed = fm.list("/.trash", SortKey::Name, SortOrder::Asc).unwrap();
        assert_eq!(trashed.len(), 1);
        assert_eq!(trashed[0].name, "a.txt");
    }

    #[test]
    fn test_rename_never_clobbers() {
        let (dir, fm) = manager();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();

        let err = fm.rename("/", "a.txt", "b.txt").unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "b");

        assert_eq!(fm.rename("/", "a.txt", "c.txt").unwrap(), "/c.txt");
        assert!(!dir.path().join("a.txt").exists());
        assert_eq!(fs::read_to_string(dir.path().join("c.txt")).unwrap(), "a");

        assert_eq!(fm.rename("/", "missing", "d").unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn test_delete_batch_reports_each_item() {
        let (dir, fm) = manager();
        fs::write(dir.path().join("a"), "").unwrap();
        fs::write(dir.path().join("b"), "").unwrap();
        fs::write(dir.path().join(".fm-config"), "").unwrap();

        let batch = fm.delete_permanent("/", &["a", "missing", "b", ".fm-config"]);
        assert_eq!(batch.succeeded(), 2);
        assert_eq!(batch.failed(), 2);
        assert_eq!(batch.status(), BatchStatus::Partial);
        assert!(matches!(
            batch.to_error(),
            Some(FsError::PartialFailure { succeeded: 2, failed: 2 })
        ));
        assert!(dir.path().join(".fm-config").exists());
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn test_copy_and_move() {
        let (dir, fm) = manager();
        fs::create_dir_all(dir.path().join("src/sub")).unwrap();
        fs::write(dir.path().join("src/sub/f.txt"), "data").unwrap();
        fs::create_dir(dir.path().join("dst")).unwrap();

        let batch = fm.copy("/", &["src"], "/dst");
        assert_eq!(batch.status(), BatchStatus::AllSucceeded);
        assert_eq!(
            fs::read_to_string(dir.path().join("dst/src/sub/f.txt")).unwrap(),
            "data"
        );

        let batch = fm.copy("/", &["src"], "/");
        assert_eq!(batch.items[0].target.as_deref(), Some("/src (1)"));
        assert!(dir.path().join("src (1)/sub/f.txt").exists());

        let batch = fm.move_items("/", &["src"], "/dst");
        assert_eq!(batch.status(), BatchStatus::AllFailed);
        assert_eq!(batch.items[0].error.as_ref().unwrap().code, "ALREADY_EXISTS");
        assert!(dir.path().join("src").exists());

        let batch = fm.move_items("/", &["src (1)"], "/dst");
        assert_eq!(batch.status(), BatchStatus::AllSucceeded);
        assert!(!dir.path().join("src (1)").exists());
        assert!(dir.path().join("dst/src (1)/sub/f.txt").exists());

        let batch = fm.move_items("/", &["dst"], "/dst/src");
        assert_eq!(batch.items[0].error.as_ref().unwrap().code, "INVALID_INPUT");
    }

    #[test]
    fn test_trash_keeps_its_sidecars_consistent() {
        let (dir, fm) = manager();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fm.trash("/", &["a.txt"]);

        let batch = fm.copy("/", &["b.txt"], "/.trash");
        assert_eq!(batch.status(), BatchStatus::AllFailed);
        assert_eq!(batch.items[0].error.as_ref().unwrap().code, "INVALID_INPUT");
        assert!(!dir.path().join(".trash/b.txt").exists());

        let err = fm.rename("/.trash", "a.txt", "renamed.txt").unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(dir.path().join(".trash/a.txt").exists());
        assert!(dir.path().join(".trash/a.txt.trashinfo").exists());

        let batch = fm.restore("/.trash", &["a.txt"]);
        assert_eq!(batch.status(), BatchStatus::AllSucceeded);
    }

    #[test]
    fn test_batch_with_escaping_destination_fails_every_item() {
        let (dir, fm) = manager();
        fs::write(dir.path().join("a"), "").unwrap();
        fs::write(dir.path().join("b"), "").unwrap();

        let batch = fm.copy("/", &["a", "b"], "/../../tmp");
        assert_eq!(batch.status(), BatchStatus::AllFailed);
        assert!(batch
            .items
            .iter()
            .all(|item| item.error.as_ref().unwrap().code == "SECURITY_VIOLATION"));
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("755").unwrap(), 0o755);
        assert_eq!(parse_mode("0o644").unwrap(), 0o644);
        assert_eq!(parse_mode("0644").unwrap(), 0o644);
        assert!(parse_mode("").is_err());
        assert!(parse_mode("89").is_err());
        assert!(parse_mode("17777").is_err());
        assert!(parse_mode("rwx").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_change_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let (dir, fm) = manager();
        fs::write(dir.path().join("run.sh"), "#!/bin/sh").unwrap();

        assert_eq!(fm.change_permissions("/run.sh", "750").unwrap(), 0o750);
        let mode = fs::metadata(dir.path().join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o750);

        assert_eq!(fm.change_permissions("/nope", "750").unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn test_read_and_save_file() {
        let (dir, fm) = manager();
        fs::write(dir.path().join("notes.md"), "# Notes").unwrap();
        fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();

        assert_eq!(fm.read_file("/", "notes.md").unwrap(), "# Notes");
        assert_eq!(fm.save_file("/", "notes.md", "# Updated").unwrap(), 9);
        assert_eq!(fm.read_file("/", "notes.md").unwrap(), "# Updated");

        assert_eq!(fm.read_file("/", "blob.bin").unwrap_err().code(), "INVALID_INPUT");
        assert_eq!(fm.save_file("/", "new.md", "x").unwrap_err().code(), "NOT_FOUND");
        assert!(!dir.path().join("new.md").exists());
    }

    #[test]
    fn test_compress_and_extract_default_destination() {
        let (dir, fm) = manager();
        fs::create_dir_all(dir.path().join("project/src")).unwrap();
        fs::write(dir.path().join("project/src/main.rs"), "fn main() {}").unwrap();

        let report = fm
            .compress("/", &["project"], "bundle", CompressFormat::Zip)
            .unwrap();
        assert_eq!(report.path, "/bundle.zip");
        assert_eq!(report.summary.files, 1);

        let err = fm
            .compress("/", &["project"], "bundle", CompressFormat::Zip)
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");

        let report = fm.extract("/bundle.zip", None).unwrap();
        assert_eq!(report.path, "/bundle");
        assert_eq!(
            fs::read_to_string(dir.path().join("bundle/project/src/main.rs")).unwrap(),
            "fn main() {}"
        );
    }

    #[test]
    fn test_empty_trash() {
        let (dir, fm) = manager();
        fs::write(dir.path().join("a"), "").unwrap();
        fs::create_dir(dir.path().join("d")).unwrap();
        fm.trash("/", &["a", "d"]);
        assert_eq!(fm.list_trash().unwrap().len(), 2);

        let batch = fm.empty_trash().unwrap();
        assert_eq!(batch.status(), BatchStatus::AllSucceeded);
        assert!(fm.list_trash().unwrap().is_empty());
    }
}
