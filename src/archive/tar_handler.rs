//! Tarballs, plain or wrapped in gzip or bzip2.
//!
//! Handles plain, gzip and bzip2 tar streams. Streams cannot be rewound, so
//! extraction opens the archive twice: one pass validates every entry, the
//! second unpacks.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::{Archive, Builder};
use tracing::debug;

use super::security::EntryValidator;
use super::stream_handler::StreamCodec;
use super::types::{ArchiveQuotas, ArchiveSummary};
use super::SourceFile;
use crate::error::{FsError, Result};

/// TAR archive processing handler
pub struct TarHandler;

impl TarHandler {
    /// Write an uncompressed tar container.
    pub fn compress(output: &Path, sources: &[SourceFile]) -> Result<ArchiveSummary> {
        let file = File::create_new(output).map_err(|e| FsError::from_io(output, e))?;
        let mut builder = Builder::new(file);
        let mut summary = ArchiveSummary::default();

        for source in sources {
            let size = std::fs::metadata(&source.path)
                .map_err(|e| FsError::from_io(&source.path, e))?
                .len();
            builder
                .append_path_with_name(&source.path, &source.name)
                .map_err(|e| FsError::io(&source.path, e))?;
            summary.add_file(size);
        }

        builder
            .into_inner()
            .map_err(|e| FsError::io(output, e))?
            .sync_all()
            .map_err(|e| FsError::io(output, e))?;
        Ok(summary)
    }

    pub fn extract(
        archive_path: &Path,
        destination: &Path,
        codec: StreamCodec,
        quotas: &ArchiveQuotas,
    ) -> Result<ArchiveSummary> {
        let summary = {
            let mut archive = Archive::new(codec.open(archive_path)?);
            Self::scan_entries(&mut archive, archive_path, quotas)?
        };

        let mut archive = Archive::new(codec.open(archive_path)?);
        archive.set_overwrite(true);
        Self::unpack_entries(&mut archive, archive_path, destination)?;
        Ok(summary)
    }

    /// Validate names, link targets and sizes of every entry.
    fn scan_entries<R: Read>(
        archive: &mut Archive<R>,
        archive_path: &Path,
        quotas: &ArchiveQuotas,
    ) -> Result<ArchiveSummary> {
        let validator = EntryValidator;
        let mut summary = ArchiveSummary::default();
        let mut expanded_bytes = 0u64;

        let entries = archive
            .entries()
            .map_err(|e| FsError::archive(archive_path, e.to_string()))?;

        for (index, entry_result) in entries.enumerate() {
            let entry = entry_result.map_err(|e| FsError::archive(archive_path, e.to_string()))?;
            let entry_path = entry
                .path()
                .map_err(|e| FsError::archive(archive_path, e.to_string()))?
                .to_string_lossy()
                .into_owned();
            let header = entry.header();
            let entry_type = header.entry_type();
            let size = header
                .size()
                .map_err(|e| FsError::archive(archive_path, e.to_string()))?;

            validator.validate_entry_path(archive_path, &entry_path)?;
            quotas.charge(archive_path, &entry_path, size, index + 1, &mut expanded_bytes)?;

            if entry_type.is_symlink() || entry_type.is_hard_link() {
                let target = entry
                    .link_name()
                    .map_err(|e| FsError::archive(archive_path, e.to_string()))?
                    .map(|target| target.to_string_lossy().into_owned())
                    .unwrap_or_default();
                validator.validate_link_target(
                    archive_path,
                    &entry_path,
                    &target,
                    entry_type.is_hard_link(),
                )?;
            } else if entry_type.is_file() {
                summary.add_file(size);
            }
        }

        Ok(summary)
    }

    fn unpack_entries<R: Read>(
        archive: &mut Archive<R>,
        archive_path: &Path,
        destination: &Path,
    ) -> Result<()> {
        let entries = archive
            .entries()
            .map_err(|e| FsError::archive(archive_path, e.to_string()))?;

        for entry_result in entries {
            let mut entry =
                entry_result.map_err(|e| FsError::archive(archive_path, e.to_string()))?;
            let unpacked = entry
                .unpack_in(destination)
                .map_err(|e| FsError::archive(archive_path, e.to_string()))?;
            if !unpacked {
                debug!(archive = %archive_path.display(), "tar skipped an entry outside the destination");
            }
        }
        Ok(())
    }
}
