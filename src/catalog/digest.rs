//! Content digests for bundle directories.
//!
//! A digest is SHA-256 over a canonical traversal: entries sorted by relative
//! path, `.git` excluded, symlinks hashed by their link-target string (never
//! dereferenced, so cycles and escapes cannot influence the digest), regular
//! files hashed by path, kind marker, declared size, and raw bytes.
//! Byte-identical trees hash identically regardless of traversal order.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{PackError, Result};

/// Digest literal format: `sha256:<64 lowercase hex>`.
pub const DIGEST_PREFIX: &str = "sha256:";

/// Compute the canonical digest of a bundle directory.
pub fn digest_dir(root: &Path) -> Result<String> {
    if !root.is_dir() {
        return Err(PackError::Validation(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|err| {
            PackError::Io(err.into_io_error().unwrap_or_else(|| {
                std::io::Error::other("walk error")
            }))
        })?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        if rel.components().any(|c| c.as_os_str() == ".git") {
            continue;
        }
        let kind = entry.file_type();
        if kind.is_symlink() || kind.is_file() {
            entries.push((rel, entry.path().to_path_buf()));
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (rel, abs) in entries {
        let rel_str = rel.to_string_lossy();
        hasher.update(rel_str.as_bytes());
        hasher.update([0u8]);

        let meta = fs::symlink_metadata(&abs)?;
        if meta.file_type().is_symlink() {
            let target = fs::read_link(&abs)?;
            hasher.update(b"l");
            hasher.update(target.to_string_lossy().as_bytes());
        } else {
            let data = fs::read(&abs)?;
            hasher.update(b"f");
            hasher.update(meta.len().to_le_bytes());
            hasher.update(&data);
        }
        hasher.update([0u8]);
    }

    let digest = hasher.finalize();
    Ok(format!("{DIGEST_PREFIX}{}", hex::encode(digest)))
}

/// Check a digest literal for well-formedness.
#[must_use]
pub fn is_valid_digest(literal: &str) -> bool {
    literal
        .strip_prefix(DIGEST_PREFIX)
        .is_some_and(|hex_part| {
            hex_part.len() == 64 && hex_part.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_tree(root: &Path) {
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("SKILL.md"), "---\nname: a\n---\n").unwrap();
        fs::write(root.join("sub/ref.md"), "reference").unwrap();
    }

    #[test]
    fn identical_trees_hash_identically() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        make_tree(&a);
        make_tree(&b);
        assert_eq!(digest_dir(&a).unwrap(), digest_dir(&b).unwrap());
    }

    #[test]
    fn single_byte_mutation_changes_digest() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        make_tree(&a);
        let before = digest_dir(&a).unwrap();
        fs::write(a.join("sub/ref.md"), "referencf").unwrap();
        assert_ne!(before, digest_dir(&a).unwrap());
    }

    #[test]
    fn git_dir_is_excluded() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        make_tree(&a);
        let before = digest_dir(&a).unwrap();
        fs::create_dir_all(a.join(".git")).unwrap();
        fs::write(a.join(".git/config"), "noise").unwrap();
        assert_eq!(before, digest_dir(&a).unwrap());
    }

    #[test]
    #[cfg(unix)]
    fn symlinks_hash_by_target_string() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        make_tree(&a);
        std::os::unix::fs::symlink("sub/ref.md", a.join("alias")).unwrap();
        let with_link = digest_dir(&a).unwrap();

        // Retargeting the link changes the digest even though no file bytes
        // changed.
        fs::remove_file(a.join("alias")).unwrap();
        std::os::unix::fs::symlink("SKILL.md", a.join("alias")).unwrap();
        assert_ne!(with_link, digest_dir(&a).unwrap());
    }

    #[test]
    #[cfg(unix)]
    fn dangling_symlink_does_not_error() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        make_tree(&a);
        std::os::unix::fs::symlink("/nonexistent/target", a.join("dangling")).unwrap();
        assert!(digest_dir(&a).is_ok());
    }

    #[test]
    fn digest_literal_format() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        make_tree(&a);
        let digest = digest_dir(&a).unwrap();
        assert!(is_valid_digest(&digest));
        assert!(!is_valid_digest("sha256:short"));
        assert!(!is_valid_digest("md5:aaaa"));
    }
}
