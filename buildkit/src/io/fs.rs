//! Directory helpers used by the release build and workflow tasks.

use std::fs;
use std::path::{self, Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;
use walkdir::WalkDir;

/// Absolute path of the project directory `dir`, which must exist.
///
/// Unlike `canonicalize`, this never produces a verbatim `\\?\` path on
/// Windows; `cmd.exe` cannot start in one.
pub fn resolve_root(dir: &Path) -> Result<PathBuf> {
    let root =
        path::absolute(dir).with_context(|| format!("resolve project dir {}", dir.display()))?;
    if !root.is_dir() {
        bail!("project dir {} is not a directory", root.display());
    }
    Ok(root)
}

/// Remove a directory tree if it exists. A missing directory is not an error.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    debug!(path = %path.display(), "removing directory");
    fs::remove_dir_all(path).with_context(|| format!("remove {}", path.display()))
}

/// Create a directory (and parents) unless it already exists.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

/// Remove `path` if present and create it again, empty.
pub fn recreate_dir(path: &Path) -> Result<()> {
    remove_dir_if_exists(path)?;
    ensure_dir(path)
}

/// Copy the directory tree at `from` to `to`.
///
/// `to` must not exist yet; its parent is created if needed.
pub fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        bail!("source directory {} does not exist", from.display());
    }
    if to.exists() {
        bail!("destination {} already exists", to.display());
    }
    debug!(from = %from.display(), to = %to.display(), "copying tree");

    let mut files = 0usize;
    for entry in WalkDir::new(from).follow_links(true) {
        let entry = entry.with_context(|| format!("walk {}", from.display()))?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .with_context(|| format!("relativize {}", entry.path().display()))?;
        let target = to.join(rel);
        if entry.file_type().is_dir() {
            ensure_dir(&target)?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!("copy {} to {}", entry.path().display(), target.display())
            })?;
            files += 1;
        }
    }

    debug!(files, "tree copied");
    Ok(())
}

/// Replace `to` with a fresh copy of `from`.
pub fn refresh_copy(from: &Path, to: &Path) -> Result<()> {
    remove_dir_if_exists(to)?;
    copy_tree(from, to)
}

/// Copy a single file, creating the destination's parent directory.
pub fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        ensure_dir(parent)?;
    }
    fs::copy(from, to)
        .with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
    Ok(())
}
