//! Archive engine
//!
//! Compresses sandboxed paths into zip, tar or gzip output and extracts
//! archives whose format is chosen from the file extension:
//! - format_detection: extension to [`ArchiveKind`] mapping
//! - security: entry-name and link-target validation
//! - zip_handler / tar_handler / stream_handler: in-process codecs
//! - external: rar and 7z through a subprocess
//! - types: quotas, jobs and summaries

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub mod external;
pub mod format_detection;
pub mod security;
pub mod stream_handler;
pub mod tar_handler;
pub mod types;
pub mod zip_handler;

pub use format_detection::{default_destination, ArchiveKind};
pub use types::{ArchiveQuotas, ArchiveSummary, CompressFormat, CompressJob, ExtractJob};

use crate::config::ExternalTools;
use crate::error::{FsError, Result};
use crate::sandbox::PathSandbox;
use external::ExternalExtractor;
use stream_handler::{StreamCodec, StreamHandler};
use tar_handler::TarHandler;
use zip_handler::ZipHandler;

/// A regular file queued for compression and its name inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
}

pub struct ArchiveEngine<'a> {
    sandbox: &'a PathSandbox,
    quotas: &'a ArchiveQuotas,
    tools: &'a ExternalTools,
}

impl<'a> ArchiveEngine<'a> {
    pub fn new(sandbox: &'a PathSandbox, quotas: &'a ArchiveQuotas, tools: &'a ExternalTools) -> Self {
        Self {
            sandbox,
            quotas,
            tools,
        }
    }

    /// Write a new archive. An existing output is never overwritten, and a
    /// partially written archive is removed on failure.
    pub fn compress(&self, job: &CompressJob) -> Result<ArchiveSummary> {
        if job.inputs.is_empty() {
            return Err(FsError::invalid_input("no items to compress"));
        }
        if fs::symlink_metadata(&job.output).is_ok() {
            return Err(FsError::AlreadyExists(self.sandbox.to_logical(&job.output)));
        }
        if job.format == CompressFormat::Gzip {
            if job.inputs.len() > 1 {
                return Err(FsError::invalid_input("gzip can only compress one file at a time"));
            }
            if job.inputs[0].is_dir() {
                return Err(FsError::invalid_input("gzip cannot compress a directory"));
            }
        }

        let sources = self.collect_sources(&job.inputs, &job.output)?;
        let result = match job.format {
            CompressFormat::Zip => ZipHandler::compress(&job.output, &sources),
            CompressFormat::Tar => TarHandler::compress(&job.output, &sources),
            CompressFormat::Gzip => match sources.first() {
                Some(source) => StreamHandler::compress_gzip(&job.output, source),
                None => Err(FsError::invalid_input("nothing to compress")),
            },
        };

        match result {
            Ok(summary) => {
                info!(
                    archive = %job.output.display(),
                    format = ?job.format,
                    files = summary.files,
                    "archive created"
                );
                Ok(summary)
            }
            Err(err) => {
                if !matches!(err, FsError::AlreadyExists(_)) {
                    if let Err(cleanup) = fs::remove_file(&job.output) {
                        debug!(archive = %job.output.display(), error = %cleanup, "no partial archive to remove");
                    }
                }
                warn!(archive = %job.output.display(), error = %err, "compression failed");
                Err(err)
            }
        }
    }

    /// Extract into `job.destination`, creating it first. Unsupported formats
    /// fail before the destination is touched.
    pub fn extract(&self, job: &ExtractJob) -> Result<ArchiveSummary> {
        if let ArchiveKind::Unsupported(extension) = &job.kind {
            return Err(FsError::UnsupportedFormat(if extension.is_empty() {
                "archive has no extension".to_string()
            } else {
                extension.clone()
            }));
        }

        let metadata =
            fs::metadata(&job.archive).map_err(|e| FsError::from_io(&job.archive, e))?;
        if !metadata.is_file() {
            return Err(FsError::invalid_input(format!(
                "{} is not an archive file",
                self.sandbox.to_logical(&job.archive)
            )));
        }

        let extractor = ExternalExtractor::new(self.tools);
        if matches!(job.kind, ArchiveKind::Rar | ArchiveKind::SevenZip) {
            extractor.locate(&job.kind)?;
        }

        fs::create_dir_all(&job.destination).map_err(|e| FsError::io(&job.destination, e))?;
        let destination = self.sandbox.check_real(&job.destination)?;
        if !destination.is_dir() {
            return Err(FsError::invalid_input(format!(
                "{} is not a directory",
                self.sandbox.to_logical(&destination)
            )));
        }

        let summary = match &job.kind {
            ArchiveKind::Zip => {
                ZipHandler::extract(&job.archive, &destination, self.quotas, self.sandbox)
            }
            ArchiveKind::Tar => {
                TarHandler::extract(&job.archive, &destination, StreamCodec::Plain, self.quotas)
            }
            ArchiveKind::Gzip { tarball: true } => {
                TarHandler::extract(&job.archive, &destination, StreamCodec::Gzip, self.quotas)
            }
            ArchiveKind::Bzip2 { tarball: true } => {
                TarHandler::extract(&job.archive, &destination, StreamCodec::Bzip2, self.quotas)
            }
            ArchiveKind::Gzip { tarball: false } => StreamHandler::decompress(
                &job.archive,
                &destination,
                StreamCodec::Gzip,
                self.quotas,
                self.sandbox,
            ),
            ArchiveKind::Bzip2 { tarball: false } => StreamHandler::decompress(
                &job.archive,
                &destination,
                StreamCodec::Bzip2,
                self.quotas,
                self.sandbox,
            ),
            ArchiveKind::Rar | ArchiveKind::SevenZip => {
                extractor.extract(&job.kind, &job.archive, &destination, self.sandbox)
            }
            ArchiveKind::Unsupported(extension) => {
                Err(FsError::UnsupportedFormat(extension.clone()))
            }
        }?;

        info!(
            archive = %job.archive.display(),
            destination = %destination.display(),
            format = job.kind.name(),
            files = summary.files,
            "archive extracted"
        );
        Ok(summary)
    }

    /// Leaf regular files below every input, named relative to the input's
    /// parent. Directories contribute only their files; symlinks are followed
    /// only when their target is a file inside the root.
    fn collect_sources(&self, inputs: &[PathBuf], output: &Path) -> Result<Vec<SourceFile>> {
        let mut sources = Vec::new();

        for input in inputs {
            let base = input.parent().unwrap_or(self.sandbox.root());

            if !input.is_dir() {
                let name = input
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .ok_or_else(|| FsError::invalid_input("cannot compress the root itself"))?;
                sources.push(SourceFile {
                    path: input.clone(),
                    name,
                });
                continue;
            }

            let walker = WalkDir::new(input)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter();
            for entry in walker {
                let entry = entry.map_err(|err| {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| input.clone());
                    FsError::io(path, err.into())
                })?;
                let path = entry.path();
                if path == output {
                    continue;
                }

                let file_type = entry.file_type();
                let include = if file_type.is_file() {
                    true
                } else if file_type.is_symlink() {
                    match self.sandbox.check_real(path) {
                        Ok(real) if real.is_file() => true,
                        _ => {
                            debug!(link = %path.display(), "skipping symlink during compression");
                            false
                        }
                    }
                } else {
                    false
                };

                if include {
                    sources.push(SourceFile {
                        path: path.to_path_buf(),
                        name: Self::archive_name(path, base),
                    });
                }
            }
        }

        Ok(sources)
    }

    fn archive_name(path: &Path, base: &Path) -> String {
        path.strip_prefix(base)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        sandbox: PathSandbox,
        quotas: ArchiveQuotas,
        tools: ExternalTools,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let sandbox = PathSandbox::new(dir.path(), ".trash").unwrap();
            let root = sandbox.root().to_path_buf();
            fs::create_dir_all(root.join("project/src/nested")).unwrap();
            fs::write(root.join("project/README.md"), "readme").unwrap();
            fs::write(root.join("project/src/lib.rs"), "pub fn f() {}").unwrap();
            fs::write(root.join("project/src/nested/deep.txt"), "deep").unwrap();
            fs::write(root.join("single.txt"), "single").unwrap();
            Self {
                _dir: dir,
                sandbox,
                quotas: ArchiveQuotas::default(),
                tools: ExternalTools::default(),
            }
        }

        fn engine(&self) -> ArchiveEngine<'_> {
            ArchiveEngine::new(&self.sandbox, &self.quotas, &self.tools)
        }

        fn root(&self) -> PathBuf {
            self.sandbox.root().to_path_buf()
        }
    }

    #[test]
    fn test_collect_sources_names_relative_to_parent() {
        let fx = Fixture::new();
        let root = fx.root();
        let sources = fx
            .engine()
            .collect_sources(
                &[root.join("project"), root.join("single.txt")],
                &root.join("out.zip"),
            )
            .unwrap();

        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "project/README.md",
                "project/src/lib.rs",
                "project/src/nested/deep.txt",
                "single.txt"
            ]
        );
    }

    #[test]
    fn test_collect_sources_skips_escaping_symlinks() {
        let fx = Fixture::new();
        let root = fx.root();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), root.join("project/leak"))
            .unwrap();
        std::os::unix::fs::symlink(root.join("single.txt"), root.join("project/alias.txt"))
            .unwrap();

        let sources = fx
            .engine()
            .collect_sources(&[root.join("project")], &root.join("out.zip"))
            .unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"project/alias.txt"));
        assert!(!names.contains(&"project/leak"));
    }

    #[test]
    fn test_zip_and_tar_round_trip() {
        let fx = Fixture::new();
        let root = fx.root();

        for format in [CompressFormat::Zip, CompressFormat::Tar] {
            let output = root.join(format!("bundle{}", format.extension()));
            let summary = fx
                .engine()
                .compress(&CompressJob {
                    inputs: vec![root.join("project")],
                    output: output.clone(),
                    format,
                })
                .unwrap();
            assert_eq!(summary.files, 3);

            let destination = root.join(format!("restored-{:?}", format));
            fx.engine()
                .extract(&ExtractJob::new(output, destination.clone()))
                .unwrap();
            assert_eq!(
                fs::read_to_string(destination.join("project/src/nested/deep.txt")).unwrap(),
                "deep"
            );
            assert_eq!(
                fs::read_to_string(destination.join("project/README.md")).unwrap(),
                "readme"
            );
        }
    }

    #[test]
    fn test_gzip_rules() {
        let fx = Fixture::new();
        let root = fx.root();

        let err = fx
            .engine()
            .compress(&CompressJob {
                inputs: vec![root.join("single.txt"), root.join("project/README.md")],
                output: root.join("two.gz"),
                format: CompressFormat::Gzip,
            })
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(!root.join("two.gz").exists());

        let err = fx
            .engine()
            .compress(&CompressJob {
                inputs: vec![root.join("project")],
                output: root.join("dir.gz"),
                format: CompressFormat::Gzip,
            })
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn test_compress_refuses_existing_archive() {
        let fx = Fixture::new();
        let root = fx.root();
        fs::write(root.join("taken.zip"), "keep me").unwrap();

        let err = fx
            .engine()
            .compress(&CompressJob {
                inputs: vec![root.join("single.txt")],
                output: root.join("taken.zip"),
                format: CompressFormat::Zip,
            })
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");
        assert_eq!(fs::read_to_string(root.join("taken.zip")).unwrap(), "keep me");
    }

    #[test]
    fn test_unsupported_format_creates_nothing() {
        let fx = Fixture::new();
        let root = fx.root();
        fs::write(root.join("data.xyz"), "???").unwrap();

        let err = fx
            .engine()
            .extract(&ExtractJob::new(root.join("data.xyz"), root.join("data")))
            .unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_FORMAT");
        assert!(!root.join("data").exists());
    }

    #[test]
    fn test_missing_archive_is_not_found() {
        let fx = Fixture::new();
        let root = fx.root();
        let err = fx
            .engine()
            .extract(&ExtractJob::new(root.join("gone.zip"), root.join("gone")))
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
