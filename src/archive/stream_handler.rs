//! Single-stream codecs
//!
//! gzip and bzip2 wrap exactly one file. This module decompresses such a
//! stream under its stripped name and produces gzip output for compress.

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::debug;

use super::format_detection::stream_output_name;
use super::types::{ArchiveQuotas, ArchiveSummary};
use super::SourceFile;
use crate::error::{FsError, Result};
use crate::sandbox::PathSandbox;

/// Compression wrapped around a file or a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCodec {
    Plain,
    Gzip,
    Bzip2,
}

impl StreamCodec {
    /// Open `path` and wrap it in the matching decoder.
    pub fn open(self, path: &Path) -> Result<Box<dyn Read>> {
        let file = File::open(path).map_err(|e| FsError::from_io(path, e))?;
        let reader = BufReader::new(file);
        Ok(match self {
            Self::Plain => Box::new(reader),
            Self::Gzip => Box::new(GzDecoder::new(reader)),
            Self::Bzip2 => Box::new(BzDecoder::new(reader)),
        })
    }
}

pub struct StreamHandler;

impl StreamHandler {
    /// Wrap one file in gzip at the best compression level.
    pub fn compress_gzip(output: &Path, source: &SourceFile) -> Result<ArchiveSummary> {
        let out = File::create_new(output).map_err(|e| FsError::from_io(output, e))?;
        let mut input = File::open(&source.path).map_err(|e| FsError::from_io(&source.path, e))?;

        let mut encoder = GzEncoder::new(out, Compression::best());
        let size = io::copy(&mut input, &mut encoder).map_err(|e| FsError::io(output, e))?;
        encoder.finish().map_err(|e| FsError::io(output, e))?;

        let mut summary = ArchiveSummary::default();
        summary.add_file(size);
        Ok(summary)
    }

    /// Decompress a single-file stream into `destination/<stripped name>`.
    /// An existing entry of that name is never replaced.
    pub fn decompress(
        archive: &Path,
        destination: &Path,
        codec: StreamCodec,
        quotas: &ArchiveQuotas,
        sandbox: &PathSandbox,
    ) -> Result<ArchiveSummary> {
        let target = destination.join(stream_output_name(archive));
        if fs::symlink_metadata(&target).is_ok() {
            return Err(FsError::AlreadyExists(sandbox.to_logical(&target)));
        }
        let target = sandbox.check_within(&target, destination)?;

        let reader = codec.open(archive)?;
        let limit = quotas.max_entry_size.min(quotas.max_total_size);
        let mut limited = reader.take(limit.saturating_add(1));

        let mut out = File::create_new(&target).map_err(|e| FsError::from_io(&target, e))?;
        let written = match io::copy(&mut limited, &mut out) {
            Ok(written) => written,
            Err(err) => {
                drop(out);
                let _ = fs::remove_file(&target);
                return Err(FsError::archive(archive, err.to_string()));
            }
        };

        if written > limit {
            drop(out);
            let _ = fs::remove_file(&target);
            return Err(FsError::archive(
                archive,
                format!("decompressed size exceeds limit {}", limit),
            ));
        }

        debug!(archive = %archive.display(), target = %target.display(), bytes = written, "stream decompressed");
        let mut summary = ArchiveSummary::default();
        summary.add_file(written);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, PathSandbox) {
        let dir = TempDir::new().unwrap();
        let sandbox = PathSandbox::new(dir.path(), ".trash").unwrap();
        (dir, sandbox)
    }

    #[test]
    fn test_gzip_round_trip() {
        let (_dir, sandbox) = sandbox();
        let root = sandbox.root().to_path_buf();
        fs::write(root.join("notes.txt"), "hello gzip").unwrap();

        let source = SourceFile {
            path: root.join("notes.txt"),
            name: "notes.txt".to_string(),
        };
        let summary = StreamHandler::compress_gzip(&root.join("notes.txt.gz"), &source).unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.bytes, 10);

        fs::create_dir(root.join("out")).unwrap();
        StreamHandler::decompress(
            &root.join("notes.txt.gz"),
            &root.join("out"),
            StreamCodec::Gzip,
            &ArchiveQuotas::default(),
            &sandbox,
        )
        .unwrap();
        assert_eq!(fs::read_to_string(root.join("out/notes.txt")).unwrap(), "hello gzip");
    }

    #[test]
    fn test_compress_refuses_existing_output() {
        let (_dir, sandbox) = sandbox();
        let root = sandbox.root().to_path_buf();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("a.gz"), "existing").unwrap();

        let source = SourceFile {
            path: root.join("a.txt"),
            name: "a.txt".to_string(),
        };
        let err = StreamHandler::compress_gzip(&root.join("a.gz"), &source).unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");
        assert_eq!(fs::read_to_string(root.join("a.gz")).unwrap(), "existing");
    }

    #[test]
    fn test_bzip2_decompress_and_quota() {
        let (_dir, sandbox) = sandbox();
        let root = sandbox.root().to_path_buf();

        let mut encoder = BzEncoder::new(
            File::create(root.join("dump.sql.bz2")).unwrap(),
            bzip2::Compression::best(),
        );
        encoder.write_all(&[b'x'; 4096]).unwrap();
        encoder.finish().unwrap();

        let summary = StreamHandler::decompress(
            &root.join("dump.sql.bz2"),
            &root,
            StreamCodec::Bzip2,
            &ArchiveQuotas::default(),
            &sandbox,
        )
        .unwrap();
        assert_eq!(summary.bytes, 4096);
        assert_eq!(fs::read(root.join("dump.sql")).unwrap().len(), 4096);

        fs::remove_file(root.join("dump.sql")).unwrap();
        let tight = ArchiveQuotas::new(10, 1024, 1024);
        let err = StreamHandler::decompress(
            &root.join("dump.sql.bz2"),
            &root,
            StreamCodec::Bzip2,
            &tight,
            &sandbox,
        )
        .unwrap_err();
        assert_eq!(err.code(), "ARCHIVE_ERROR");
        assert!(!root.join("dump.sql").exists());
    }

    #[test]
    fn test_decompress_keeps_existing_file() {
        let (_dir, sandbox) = sandbox();
        let root = sandbox.root().to_path_buf();
        fs::write(root.join("notes.txt"), "archived").unwrap();
        let source = SourceFile {
            path: root.join("notes.txt"),
            name: "notes.txt".to_string(),
        };
        StreamHandler::compress_gzip(&root.join("notes.txt.gz"), &source).unwrap();
        fs::write(root.join("notes.txt"), "live edits").unwrap();

        let err = StreamHandler::decompress(
            &root.join("notes.txt.gz"),
            &root,
            StreamCodec::Gzip,
            &ArchiveQuotas::default(),
            &sandbox,
        )
        .unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");
        assert_eq!(fs::read_to_string(root.join("notes.txt")).unwrap(), "live edits");
    }
}
