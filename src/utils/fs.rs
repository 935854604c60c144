//! Filesystem utilities.
//!
//! Helper functions for file operations. The mirror helpers here are the only
//! place the crate copies directory trees; both the Synchronizer and the
//! Executor route through them.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Read a file to string, returning None if it doesn't exist.
pub fn read_optional(path: impl AsRef<Path>) -> Result<Option<String>> {
    let path = path.as_ref();
    if path.exists() {
        Ok(Some(fs::read_to_string(path)?))
    } else {
        Ok(None)
    }
}

/// Write a file atomically: write to a sibling temp file, then rename over
/// the destination. Readers never observe a half-written document.
pub fn write_atomic(path: impl AsRef<Path>, contents: &str) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Recursively copy a directory tree. Symlinks are recreated as symlinks
/// (not dereferenced) so a mirrored bundle keeps the same digest as its
/// source tree.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            let target = fs::read_link(&from)?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &to)?;
            #[cfg(not(unix))]
            {
                // No symlink support: copy the resolved target when it
                // exists, otherwise skip the entry.
                if from.exists() {
                    if from.is_dir() {
                        copy_dir_recursive(&from, &to)?;
                    } else {
                        fs::copy(&from, &to)?;
                    }
                }
            }
        } else if file_type.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Replace `dst` with a fresh copy of `src` (remove-then-copy). Stale
/// entries from a previous copy never linger.
pub fn replace_dir(src: &Path, dst: &Path) -> Result<()> {
    if dst.exists() {
        remove_path(dst)?;
    }
    copy_dir_recursive(src, dst)
}

/// Remove a file, symlink, or directory tree. Symlinks are unlinked, never
/// followed.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}
