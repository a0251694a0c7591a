//! Extension-based format detection.
//!
//! Maps an archive's file extension (case-insensitive) onto a closed set of
//! codecs. Content is never inspected.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    /// `.gz`/`.gzip`/`.tgz`; `tarball` when the stripped name ends in `.tar`.
    Gzip { tarball: bool },
    /// `.bz2`/`.bzip2`/`.tbz2`/`.tbz`, same dual handling as gzip.
    Bzip2 { tarball: bool },
    Rar,
    SevenZip,
    /// Lower-cased extension that matched nothing.
    Unsupported(String),
}

impl ArchiveKind {
    pub fn detect(path: &Path) -> Self {
        let extension = Self::extract_extension(path);
        let stem_is_tar = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(|stem| stem.to_lowercase().ends_with(".tar"))
            .unwrap_or(false);

        match extension.as_str() {
            "zip" => Self::Zip,
            "tar" => Self::Tar,
            "gz" | "gzip" => Self::Gzip {
                tarball: stem_is_tar,
            },
            "tgz" => Self::Gzip { tarball: true },
            "bz2" | "bzip2" => Self::Bzip2 {
                tarball: stem_is_tar,
            },
            "tbz2" | "tbz" => Self::Bzip2 { tarball: true },
            "rar" => Self::Rar,
            "7z" => Self::SevenZip,
            _ => Self::Unsupported(extension),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::Gzip { tarball: true } => "tar.gz",
            Self::Gzip { tarball: false } => "gzip",
            Self::Bzip2 { tarball: true } => "tar.bz2",
            Self::Bzip2 { tarball: false } => "bzip2",
            Self::Rar => "rar",
            Self::SevenZip => "7z",
            Self::Unsupported(extension) => extension,
        }
    }

    /// Single compressed file rather than a container.
    pub fn is_single_stream(&self) -> bool {
        matches!(
            self,
            Self::Gzip { tarball: false } | Self::Bzip2 { tarball: false }
        )
    }

    fn extract_extension(path: &Path) -> String {
        path.extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase()
    }
}

/// Where an archive is extracted when the caller names no destination.
///
/// Containers go into a directory beside the archive named after its stem,
/// with a `.tar` inner extension stripped too (`src.tar.gz` -> `src/`).
/// Single compressed files decompress beside the archive.
pub fn default_destination(archive: &Path) -> PathBuf {
    let parent = archive.parent().unwrap_or_else(|| Path::new("/"));
    let kind = ArchiveKind::detect(archive);
    if kind.is_single_stream() {
        return parent.to_path_buf();
    }

    let name = archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut stem = match name.rfind('.') {
        Some(idx) if idx > 0 => name[..idx].to_string(),
        _ => name.clone(),
    };
    if matches!(
        kind,
        ArchiveKind::Gzip { tarball: true } | ArchiveKind::Bzip2 { tarball: true }
    ) && stem.to_lowercase().ends_with(".tar")
    {
        stem.truncate(stem.len() - ".tar".len());
    }
    if stem.is_empty() {
        stem = "extracted".to_string();
    }
    parent.join(stem)
}

/// File name a single compressed stream decompresses to (`notes.txt.gz` ->
/// `notes.txt`).
pub fn stream_output_name(archive: &Path) -> String {
    match archive.file_stem() {
        Some(stem) if !stem.is_empty() => stem.to_string_lossy().into_owned(),
        _ => "decompressed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(ArchiveKind::detect(Path::new("a.zip")), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::detect(Path::new("a.TAR")), ArchiveKind::Tar);
        assert_eq!(ArchiveKind::detect(Path::new("a.7z")), ArchiveKind::SevenZip);
        assert_eq!(ArchiveKind::detect(Path::new("a.rar")), ArchiveKind::Rar);
        assert_eq!(
            ArchiveKind::detect(Path::new("docs.exe")),
            ArchiveKind::Unsupported("exe".to_string())
        );
        assert_eq!(
            ArchiveKind::detect(Path::new("noext")),
            ArchiveKind::Unsupported(String::new())
        );
    }

    #[test]
    fn test_gzip_and_bzip2_dual_handling() {
        assert_eq!(
            ArchiveKind::detect(Path::new("src.tar.gz")),
            ArchiveKind::Gzip { tarball: true }
        );
        assert_eq!(
            ArchiveKind::detect(Path::new("SRC.TAR.GZIP")),
            ArchiveKind::Gzip { tarball: true }
        );
        assert_eq!(
            ArchiveKind::detect(Path::new("notes.txt.gz")),
            ArchiveKind::Gzip { tarball: false }
        );
        assert_eq!(
            ArchiveKind::detect(Path::new("src.tgz")),
            ArchiveKind::Gzip { tarball: true }
        );
        assert_eq!(
            ArchiveKind::detect(Path::new("src.tar.bz2")),
            ArchiveKind::Bzip2 { tarball: true }
        );
        assert_eq!(
            ArchiveKind::detect(Path::new("dump.sql.bzip2")),
            ArchiveKind::Bzip2 { tarball: false }
        );
        assert_eq!(
            ArchiveKind::detect(Path::new("src.tbz2")),
            ArchiveKind::Bzip2 { tarball: true }
        );
    }

    #[test]
    fn test_default_destination() {
        assert_eq!(
            default_destination(Path::new("/r/photos.zip")),
            PathBuf::from("/r/photos")
        );
        assert_eq!(
            default_destination(Path::new("/r/src.tar.gz")),
            PathBuf::from("/r/src")
        );
        assert_eq!(
            default_destination(Path::new("/r/src.tgz")),
            PathBuf::from("/r/src")
        );
        assert_eq!(
            default_destination(Path::new("/r/notes.txt.gz")),
            PathBuf::from("/r")
        );
    }

    #[test]
    fn test_stream_output_name() {
        assert_eq!(stream_output_name(Path::new("/r/notes.txt.gz")), "notes.txt");
        assert_eq!(stream_output_name(Path::new("/r/dump.bz2")), "dump");
    }
}
