//! Case-insensitive name search below a directory.

use serde::Serialize;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use super::FileEntry;
use crate::error::Result;
use crate::sandbox::PathSandbox;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Logical path of the match.
    pub path: String,
    #[serde(flatten)]
    pub entry: FileEntry,
}

/// Walk `start` without following symlinks and return every entry whose name
/// contains `query`, ignoring case. The trash directory is skipped when
/// `hide_trash` is set.
pub fn search(
    sandbox: &PathSandbox,
    start: &Path,
    query: &str,
    hide_trash: bool,
) -> Result<Vec<SearchHit>> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let start = sandbox.check_real(start)?;
    let trash_dir = sandbox.trash_dir();
    let mut hits = Vec::new();

    let walker = WalkDir::new(&start)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !(hide_trash && entry.path() == trash_dir));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry during search");
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.to_lowercase().contains(&query) {
            continue;
        }

        let metadata = entry.metadata().ok();
        let is_dir = entry.file_type().is_dir();
        hits.push(SearchHit {
            path: sandbox.to_logical(entry.path()),
            entry: FileEntry::from_metadata(name, metadata.as_ref(), is_dir),
        });
    }

    hits.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(hits)
}
