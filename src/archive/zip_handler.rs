//! Zip support: deflated writer and pre-scanned extraction.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::security::EntryValidator;
use super::types::{ArchiveQuotas, ArchiveSummary};
use super::SourceFile;
use crate::error::{FsError, Result};
use crate::sandbox::PathSandbox;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Reads and writes `.zip` files.
pub struct ZipHandler;

impl ZipHandler {
    pub fn compress(output: &Path, sources: &[SourceFile]) -> Result<ArchiveSummary> {
        let file = File::create_new(output).map_err(|e| FsError::from_io(output, e))?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut summary = ArchiveSummary::default();

        for source in sources {
            let mut input =
                File::open(&source.path).map_err(|e| FsError::from_io(&source.path, e))?;
            writer
                .start_file(source.name.as_str(), options)
                .map_err(|e| FsError::archive(output, e.to_string()))?;
            let size = io::copy(&mut input, &mut writer).map_err(|e| FsError::io(output, e))?;
            summary.add_file(size);
        }

        writer
            .finish()
            .map_err(|e| FsError::archive(output, e.to_string()))?;
        Ok(summary)
    }

    pub fn extract(
        archive_path: &Path,
        destination: &Path,
        quotas: &ArchiveQuotas,
        sandbox: &PathSandbox,
    ) -> Result<ArchiveSummary> {
        let file = File::open(archive_path).map_err(|e| FsError::from_io(archive_path, e))?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| FsError::archive(archive_path, e.to_string()))?;

        Self::check_central_directory(&archive, archive_path, quotas)?;
        Self::scan_entries(&mut archive, archive_path, quotas)?;
        Self::write_entries(&mut archive, archive_path, destination, quotas, sandbox)
    }

    /// Fail fast on the central directory count before reading any entry.
    fn check_central_directory(
        archive: &ZipArchive<File>,
        archive_path: &Path,
        quotas: &ArchiveQuotas,
    ) -> Result<()> {
        if archive.len() > quotas.max_entries {
            return Err(FsError::archive(
                archive_path,
                format!(
                    "archive contains {} entries, exceeds limit of {}",
                    archive.len(),
                    quotas.max_entries
                ),
            ));
        }
        Ok(())
    }

    /// Check every entry name, link target and declared size, then reject
    /// entries that would be written through a symlink entry.
    fn scan_entries(
        archive: &mut ZipArchive<File>,
        archive_path: &Path,
        quotas: &ArchiveQuotas,
    ) -> Result<()> {
        let validator = EntryValidator;
        let mut expanded_bytes = 0u64;
        let mut scanned = Vec::with_capacity(archive.len());
        let mut links = HashSet::new();

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| FsError::archive(archive_path, e.to_string()))?;
            let entry_path = entry.name().to_string();

            validator.validate_entry_path(archive_path, &entry_path)?;
            quotas.charge(
                archive_path,
                &entry_path,
                entry.size(),
                i + 1,
                &mut expanded_bytes,
            )?;

            let link_target = if Self::is_symlink(entry.unix_mode()) {
                let target = Self::read_link_target(&mut entry, archive_path)?;
                validator.validate_link_target(archive_path, &entry_path, &target, false)?;
                links.insert(EntryValidator::relative_destination(&entry_path));
                Some(target)
            } else {
                None
            };
            scanned.push((entry_path, link_target));
        }

        for (entry_path, link_target) in &scanned {
            validator.validate_link_chain(
                archive_path,
                entry_path,
                link_target.as_deref(),
                &links,
            )?;
        }
        Ok(())
    }

    fn write_entries(
        archive: &mut ZipArchive<File>,
        archive_path: &Path,
        destination: &Path,
        quotas: &ArchiveQuotas,
        sandbox: &PathSandbox,
    ) -> Result<ArchiveSummary> {
        let mut summary = ArchiveSummary::default();

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| FsError::archive(archive_path, e.to_string()))?;
            let target = destination.join(EntryValidator::relative_destination(entry.name()));

            if entry.is_dir() {
                sandbox.check_within(&target, destination)?;
                fs::create_dir_all(&target).map_err(|e| FsError::io(&target, e))?;
                sandbox.check_within(&target, destination)?;
                continue;
            }

            if let Some(parent) = target.parent() {
                // A symlink already in the destination could redirect the write.
                sandbox.check_within(parent, destination)?;
                fs::create_dir_all(parent).map_err(|e| FsError::io(parent, e))?;
                sandbox.check_within(parent, destination)?;
            }
            Self::remove_existing_link(&target)?;

            if Self::is_symlink(entry.unix_mode()) {
                let link_target = Self::read_link_target(&mut entry, archive_path)?;
                Self::create_symlink(&link_target, &target)?;
                debug!(entry = %target.display(), "extracted symlink");
                continue;
            }

            let mut out = File::create(&target).map_err(|e| FsError::io(&target, e))?;
            let mut limited = (&mut entry).take(quotas.max_entry_size.saturating_add(1));
            let written = io::copy(&mut limited, &mut out)
                .map_err(|e| FsError::archive(archive_path, e.to_string()))?;
            if written > quotas.max_entry_size
                || summary.bytes.saturating_add(written) > quotas.max_total_size
            {
                drop(out);
                let _ = fs::remove_file(&target);
                return Err(FsError::archive(
                    archive_path,
                    format!("entry {} expands beyond its quota", entry.name()),
                ));
            }

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                let mode = (mode & 0o777) | 0o600;
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                    .map_err(|e| FsError::io(&target, e))?;
            }

            summary.add_file(written);
        }

        Ok(summary)
    }

    fn is_symlink(mode: Option<u32>) -> bool {
        mode.map(|mode| mode & S_IFMT == S_IFLNK).unwrap_or(false)
    }

    fn read_link_target<R: Read>(entry: &mut R, archive_path: &Path) -> Result<String> {
        let mut target = String::new();
        entry
            .take(4096)
            .read_to_string(&mut target)
            .map_err(|e| FsError::archive(archive_path, e.to_string()))?;
        Ok(target)
    }

    fn remove_existing_link(target: &Path) -> Result<()> {
        match fs::symlink_metadata(target) {
            Ok(meta) if meta.file_type().is_symlink() => {
                fs::remove_file(target).map_err(|e| FsError::io(target, e))
            }
            _ => Ok(()),
        }
    }

    #[cfg(unix)]
    fn create_symlink(link_target: &str, at: &Path) -> Result<()> {
        std::os::unix::fs::symlink(link_target, at).map_err(|e| FsError::io(at, e))
    }

    #[cfg(not(unix))]
    fn create_symlink(_link_target: &str, at: &Path) -> Result<()> {
        debug!(entry = %at.display(), "skipping symlink entry on this platform");
        Ok(())
    }
}
