//! rar and 7z extraction through an external tool.
//!
//! The tool is located on `PATH` with `which`; when it is missing the format
//! counts as unsupported. The tool's output is re-checked afterwards because
//! its own path handling cannot be trusted.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::format_detection::ArchiveKind;
use super::types::ArchiveSummary;
use crate::config::ExternalTools;
use crate::error::{FsError, Result};
use crate::sandbox::PathSandbox;

/// Size and mtime of every entry already in the destination, keyed by path.
type Stamps = HashMap<PathBuf, (u64, Option<SystemTime>)>;

pub struct ExternalExtractor<'a> {
    tools: &'a ExternalTools,
}

impl<'a> ExternalExtractor<'a> {
    pub fn new(tools: &'a ExternalTools) -> Self {
        Self { tools }
    }

    /// Resolve the executable for `kind`, or fail with `UnsupportedFormat`.
    pub fn locate(&self, kind: &ArchiveKind) -> Result<PathBuf> {
        let program = match kind {
            ArchiveKind::Rar => &self.tools.unrar,
            ArchiveKind::SevenZip => &self.tools.sevenzip,
            other => return Err(FsError::UnsupportedFormat(other.name().to_string())),
        };

        which::which(program).map_err(|_| {
            FsError::UnsupportedFormat(format!(
                "{} extraction requires `{}` on PATH",
                kind.name(),
                program
            ))
        })
    }

    pub fn extract(
        &self,
        kind: &ArchiveKind,
        archive: &Path,
        destination: &Path,
        sandbox: &PathSandbox,
    ) -> Result<ArchiveSummary> {
        let binary = self.locate(kind)?;
        let args = Self::arguments(kind, archive, destination);
        info!(tool = %binary.display(), archive = %archive.display(), "running external extractor");
        let before = Self::stamp(destination);

        let output = Command::new(&binary)
            .args(&args)
            .output()
            .map_err(|e| FsError::io(&binary, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(FsError::archive(
                archive,
                format!("{} exited with {}: {}", binary.display(), output.status, detail),
            ));
        }

        Ok(Self::audit_output(destination, sandbox, &before))
    }

    fn arguments(kind: &ArchiveKind, archive: &Path, destination: &Path) -> Vec<OsString> {
        match kind {
            ArchiveKind::Rar => {
                // unrar treats a destination without trailing slash as a file mask.
                let mut dest = destination.as_os_str().to_os_string();
                dest.push("/");
                vec!["x".into(), "-o+".into(), archive.into(), dest]
            }
            _ => {
                let mut out = OsString::from("-o");
                out.push(destination);
                vec!["x".into(), archive.into(), out, "-y".into()]
            }
        }
    }

    fn stamp(destination: &Path) -> Stamps {
        WalkDir::new(destination)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let meta = entry.metadata().ok()?;
                Some((entry.into_path(), (meta.len(), meta.modified().ok())))
            })
            .collect()
    }

    /// Remove symlinks the tool created that leave the destination, and count
    /// the regular files it created or rewrote. Entries unchanged since
    /// `before` belong to the caller and are left alone.
    fn audit_output(
        destination: &Path,
        sandbox: &PathSandbox,
        before: &Stamps,
    ) -> ArchiveSummary {
        let mut summary = ArchiveSummary::default();

        for entry in WalkDir::new(destination).min_depth(1).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(error = %err, "skipping unreadable extracted entry");
                    continue;
                }
            };
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) => {
                    debug!(path = %entry.path().display(), error = %err, "skipping unreadable extracted entry");
                    continue;
                }
            };
            let stamp = (meta.len(), meta.modified().ok());
            if before.get(entry.path()) == Some(&stamp) {
                continue;
            }

            if entry.file_type().is_symlink() {
                if sandbox.check_within(entry.path(), destination).is_err() {
                    warn!(link = %entry.path().display(), "removing extracted symlink that leaves the destination");
                    if let Err(err) = fs::remove_file(entry.path()) {
                        warn!(link = %entry.path().display(), error = %err, "failed to remove escaping symlink");
                    }
                }
            } else if entry.file_type().is_file() {
                summary.add_file(meta.len());
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_tool_is_unsupported_format() {
        let tools = ExternalTools {
            unrar: "fsroot-no-such-unrar-binary".to_string(),
            sevenzip: "fsroot-no-such-7z-binary".to_string(),
        };
        let extractor = ExternalExtractor::new(&tools);

        let err = extractor.locate(&ArchiveKind::Rar).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_FORMAT");
        assert!(err.to_string().contains("fsroot-no-such-unrar-binary"));

        let err = extractor.locate(&ArchiveKind::SevenZip).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_FORMAT");

        let err = extractor.locate(&ArchiveKind::Zip).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_FORMAT");
    }

    #[test]
    fn test_command_lines() {
        let archive = Path::new("/r/a.rar");
        let dest = Path::new("/r/a");

        let rar = ExternalExtractor::arguments(&ArchiveKind::Rar, archive, dest);
        assert_eq!(rar, ["x", "-o+", "/r/a.rar", "/r/a/"].map(OsString::from));

        let seven = ExternalExtractor::arguments(&ArchiveKind::SevenZip, archive, dest);
        assert_eq!(seven, ["x", "/r/a.rar", "-o/r/a", "-y"].map(OsString::from));
    }

    #[cfg(unix)]
    #[test]
    fn test_audit_removes_escaping_links() {
        let dir = TempDir::new().unwrap();
        let sandbox = PathSandbox::new(dir.path(), ".trash").unwrap();
        let dest = sandbox.root().join("out");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("existing.txt"), "already here").unwrap();
        std::os::unix::fs::symlink(sandbox.root(), dest.join("owned-link")).unwrap();
        let before = ExternalExtractor::stamp(&dest);

        fs::write(dest.join("kept.txt"), "abc").unwrap();
        std::os::unix::fs::symlink("/etc", dest.join("escape")).unwrap();
        std::os::unix::fs::symlink(sandbox.root(), dest.join("up")).unwrap();
        std::os::unix::fs::symlink("kept.txt", dest.join("inner")).unwrap();

        let summary = ExternalExtractor::audit_output(&dest, &sandbox, &before);
        assert_eq!(summary.files, 1);
        assert_eq!(summary.bytes, 3);
        assert!(fs::symlink_metadata(dest.join("escape")).is_err());
        assert!(fs::symlink_metadata(dest.join("up")).is_err());
        assert!(fs::symlink_metadata(dest.join("inner")).is_ok());
        assert!(fs::symlink_metadata(dest.join("owned-link")).is_ok());
        assert!(dest.join("existing.txt").exists());
    }
}
