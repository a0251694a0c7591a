//! Directory-only tree builder.

use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{FsError, Result};
use crate::sandbox::PathSandbox;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    /// Logical path, always starting with `/`.
    pub path: String,
    pub children: Vec<TreeNode>,
}

/// Build the directory tree below `start`.
///
/// Subdirectories failing the sandbox check are silently omitted, as is the
/// trash directory when `hide_trash` is set. A canonical directory is never
/// visited twice, which breaks symlink cycles.
pub fn build_tree(sandbox: &PathSandbox, start: &Path, hide_trash: bool) -> Result<Vec<TreeNode>> {
    let start = sandbox.check_real(start)?;
    if !start.is_dir() {
        return Err(FsError::invalid_input(format!(
            "{} is not a directory",
            sandbox.to_logical(&start)
        )));
    }

    let mut visited = HashSet::new();
    visited.insert(start.clone());
    Ok(build_level(sandbox, &start, hide_trash, &mut visited))
}

fn build_level(
    sandbox: &PathSandbox,
    dir: &Path,
    hide_trash: bool,
    visited: &mut HashSet<PathBuf>,
) -> Vec<TreeNode> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "cannot read directory for tree");
            return Vec::new();
        }
    };

    let mut children: Vec<(String, PathBuf)> = read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| (entry.file_name().to_string_lossy().into_owned(), entry.path()))
        .filter(|(_, path)| path.is_dir())
        .collect();
    children.sort_by(|a, b| a.0.cmp(&b.0));

    let mut nodes = Vec::new();
    for (name, path) in children {
        if hide_trash && path == sandbox.trash_dir() {
            continue;
        }

        let real = match sandbox.check_real(&path) {
            Ok(real) => real,
            Err(_) => {
                debug!(dir = %path.display(), "omitting directory outside the root");
                continue;
            }
        };
        if !visited.insert(real.clone()) {
            debug!(dir = %path.display(), "omitting already visited directory");
            continue;
        }

        nodes.push(TreeNode {
            path: sandbox.to_logical(&path),
            children: build_level(sandbox, &real, hide_trash, visited),
            name,
        });
    }
    nodes
}
