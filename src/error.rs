//! Error taxonomy shared by every file operation.
//!
//! Each variant maps to a stable machine-readable code so the dispatch layer can
//! report `code` + `message` pairs without string matching.

use std::io;
use std::path::PathBuf;

/// Why a trash sidecar could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataProblem {
    Missing,
    Unparseable,
}

impl std::fmt::Display for MetadataProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "trash metadata not found"),
            Self::Unparseable => write!(f, "invalid trash metadata"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FsError {
    /// A caller-supplied path resolves outside the configured root.
    #[error("security violation: {path} escapes the root directory")]
    SecurityViolation { path: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("filesystem error on {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{problem}: {path}")]
    InvalidMetadata {
        path: PathBuf,
        problem: MetadataProblem,
    },

    #[error("partial failure: {succeeded} succeeded, {failed} failed")]
    PartialFailure { succeeded: usize, failed: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Corrupt container, quota violation or a failing external extractor.
    #[error("archive error on {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("operation timed out after {0}s")]
    TimedOut(u64),
}

impl FsError {
    pub fn security(path: impl Into<String>) -> Self {
        Self::SecurityViolation { path: path.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn archive(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Archive {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Maps an I/O failure on `path` onto the taxonomy, keeping `NotFound` and
    /// `AlreadyExists` distinguishable from generic filesystem errors.
    pub fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.display().to_string()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.display().to_string()),
            _ => Self::io(path, source),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::SecurityViolation { .. } => "SECURITY_VIOLATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::Filesystem { .. } => "FILESYSTEM_ERROR",
            // Missing and unparseable sidecars share one caller-facing code.
            Self::InvalidMetadata { .. } => "INVALID_METADATA",
            Self::PartialFailure { .. } => "PARTIAL_FAILURE",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Archive { .. } => "ARCHIVE_ERROR",
            Self::TimedOut(_) => "TIMED_OUT",
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_keeps_not_found_and_exists_distinct() {
        let err = FsError::from_io("/a", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.code(), "NOT_FOUND");

        let err = FsError::from_io("/a", io::Error::from(io::ErrorKind::AlreadyExists));
        assert_eq!(err.code(), "ALREADY_EXISTS");

        let err = FsError::from_io("/a", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.code(), "FILESYSTEM_ERROR");
        assert!(err.to_string().contains("/a"));
    }

    #[test]
    fn test_metadata_problems_share_code() {
        let missing = FsError::InvalidMetadata {
            path: PathBuf::from("x.trashinfo"),
            problem: MetadataProblem::Missing,
        };
        let broken = FsError::InvalidMetadata {
            path: PathBuf::from("x.trashinfo"),
            problem: MetadataProblem::Unparseable,
        };
        assert_eq!(missing.code(), broken.code());
        assert!(missing.to_string().contains("not found"));
        assert!(broken.to_string().contains("invalid"));
    }
}
