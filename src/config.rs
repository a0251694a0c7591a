//! Per-process root configuration.
//!
//! The configuration is an explicit value handed to every component at
//! construction time. Nothing reads it from ambient global state, so one
//! process can serve several roots side by side.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::archive::types::ArchiveQuotas;

/// Wildcard entry in `allowed_extensions` that disables the filter.
pub const EXTENSION_WILDCARD: &str = "*";

fn default_allowed_extensions() -> Vec<String> {
    vec![EXTENSION_WILDCARD.to_string()]
}

fn default_trash_dir_name() -> String {
    ".trash".to_string()
}

fn default_protected_names() -> Vec<String> {
    vec![".fm-config".to_string()]
}

fn default_max_edit_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

/// Executables used for formats without an in-process codec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalTools {
    pub unrar: String,
    pub sevenzip: String,
}

impl Default for ExternalTools {
    fn default() -> Self {
        Self {
            unrar: "unrar".to_string(),
            sevenzip: "7z".to_string(),
        }
    }
}

/// Presentation options. The engine never reads these; the CLI uses them to
/// render timestamps in human-readable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOptions {
    pub date_format: String,
    pub utc_offset_minutes: i32,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            date_format: "%b %e %Y, %l:%M %p".to_string(),
            utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootConfig {
    /// Directory every logical path is resolved against.
    pub root: PathBuf,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Reserved directory name directly beneath the root.
    #[serde(default = "default_trash_dir_name")]
    pub trash_dir_name: String,
    /// Omit the trash directory from root listings, the tree and search.
    #[serde(default = "default_true")]
    pub hide_trash: bool,
    /// Names that may never be permanently deleted.
    #[serde(default = "default_protected_names")]
    pub protected_names: Vec<String>,
    /// Upper bound for read_file.
    #[serde(default = "default_max_edit_bytes")]
    pub max_edit_bytes: u64,
    /// Fall back to copy + delete when a rename crosses filesystems.
    #[serde(default = "default_true")]
    pub cross_device_fallback: bool,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub archive: ArchiveQuotas,
    #[serde(default)]
    pub tools: ExternalTools,
    #[serde(default)]
    pub display: DisplayOptions,
}

impl RootConfig {
    /// Configuration with defaults for everything except the root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allowed_extensions: default_allowed_extensions(),
            trash_dir_name: default_trash_dir_name(),
            hide_trash: true,
            protected_names: default_protected_names(),
            max_edit_bytes: default_max_edit_bytes(),
            cross_device_fallback: true,
            request_timeout_secs: None,
            archive: ArchiveQuotas::default(),
            tools: ExternalTools::default(),
            display: DisplayOptions::default(),
        }
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: RootConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = extensions;
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let metadata = std::fs::metadata(&self.root)
            .with_context(|| format!("Root directory {} is not accessible", self.root.display()))?;
        if !metadata.is_dir() {
            anyhow::bail!("Root {} is not a directory", self.root.display());
        }

        if self.trash_dir_name.is_empty()
            || self.trash_dir_name.contains('/')
            || self.trash_dir_name.contains('\\')
            || self.trash_dir_name == ".."
            || self.trash_dir_name == "."
        {
            anyhow::bail!("Invalid trash directory name: {:?}", self.trash_dir_name);
        }

        for ext in &self.allowed_extensions {
            if ext.contains("..") || ext.contains('/') || ext.contains('\\') {
                anyhow::bail!("Invalid extension pattern: {}", ext);
            }
        }

        if self.max_edit_bytes == 0 {
            anyhow::bail!("max_edit_bytes must be greater than 0");
        }

        self.archive.validate()?;
        Ok(())
    }

    pub fn allows_any_extension(&self) -> bool {
        self.allowed_extensions
            .iter()
            .any(|ext| ext == EXTENSION_WILDCARD)
    }

    /// Case-insensitive extension filter; names without an extension only pass
    /// the wildcard.
    pub fn is_allowed_extension(&self, name: &str) -> bool {
        if self.allows_any_extension() {
            return true;
        }

        let name_lower = name.to_lowercase();
        self.allowed_extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .any(|ext| !ext.is_empty() && name_lower.ends_with(&format!(".{}", ext)))
    }

    pub fn is_protected(&self, name: &str) -> bool {
        self.protected_names.iter().any(|protected| protected == name)
    }
}
