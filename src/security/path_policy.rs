//! Path containment for install roots.
//!
//! Every destructive filesystem operation the Executor performs (deleting a
//! managed entity, overwriting an install destination) is gated on the target
//! staying inside the resolved install root. Recorded paths come from state
//! documents on disk and are re-validated on every use; a tampered state file
//! must not be able to direct a delete outside the root.

use std::path::{Component, Path, PathBuf};

use crate::error::{PackError, Result};

/// Containment violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPolicyViolation {
    /// Path contains traversal sequences that would climb out of the root.
    TraversalAttempt { path: PathBuf },
    /// Path does not live under the install root.
    OutsideRoot { path: PathBuf, root: PathBuf },
}

impl std::fmt::Display for PathPolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TraversalAttempt { path } => {
                write!(f, "path {path:?} contains traversal sequences")
            }
            Self::OutsideRoot { path, root } => {
                write!(f, "path {path:?} is outside install root {root:?}")
            }
        }
    }
}

impl std::error::Error for PathPolicyViolation {}

impl From<PathPolicyViolation> for PackError {
    fn from(violation: PathPolicyViolation) -> Self {
        Self::PathViolation(violation.to_string())
    }
}

/// Normalize a path by removing `.` components and resolving `..` lexically.
///
/// Does not touch the filesystem and does not resolve symlinks.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                let last = normalized.components().next_back();
                match last {
                    None => {}
                    Some(Component::RootDir | Component::Prefix(_)) => {}
                    _ => {
                        normalized.pop();
                    }
                }
            }
            Component::CurDir => {}
            _ => normalized.push(component),
        }
    }

    normalized
}

/// Check whether `path` lies under `root` after lexical normalization.
#[must_use]
pub fn is_under_root(path: &Path, root: &Path) -> bool {
    let normalized_path = normalize_path(path);
    let normalized_root = normalize_path(root);
    normalized_path.starts_with(&normalized_root)
}

/// Validate that `path` is contained within `root`, returning the normalized
/// path on success. Rejection happens before any filesystem mutation.
pub fn contain(path: &Path, root: &Path) -> Result<PathBuf> {
    let normalized = normalize_path(path);
    if !normalized.starts_with(normalize_path(root)) {
        return Err(PathPolicyViolation::OutsideRoot {
            path: normalized,
            root: root.to_path_buf(),
        }
        .into());
    }
    Ok(normalized)
}

/// Validate a bundle name used as a destination directory component.
///
/// Rejects separators, traversal components, null bytes, and empty names so
/// `root.join(name)` can never address anything outside `root`.
pub fn validate_destination_component(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PackError::Validation("empty bundle name".to_string()));
    }
    if name.contains('\0') {
        return Err(PackError::Validation(format!(
            "bundle name {name:?} contains null byte"
        )));
    }
    if name == "." || name == ".." {
        return Err(PathPolicyViolation::TraversalAttempt {
            path: PathBuf::from(name),
        }
        .into());
    }
    if name.contains('/') || name.contains('\\') {
        return Err(PackError::Validation(format!(
            "bundle name {name:?} contains directory separator"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_resolves_dots() {
        assert_eq!(
            normalize_path(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(normalize_path(Path::new("/a/..")), PathBuf::from("/"));
        assert_eq!(normalize_path(Path::new("a/b/..")), PathBuf::from("a"));
    }

    #[test]
    fn containment_accepts_children() {
        let root = Path::new("/home/u/.claude/skills");
        assert!(contain(Path::new("/home/u/.claude/skills/dev"), root).is_ok());
        assert!(is_under_root(Path::new("/home/u/.claude/skills"), root));
    }

    #[test]
    fn containment_rejects_escapes() {
        let root = Path::new("/home/u/.claude/skills");
        assert!(contain(Path::new("/home/u/.claude/other"), root).is_err());
        assert!(contain(Path::new("/home/u/.claude/skills/../../../etc"), root).is_err());
        assert!(!is_under_root(Path::new("/home/u"), root));
    }

    #[test]
    fn destination_component_rules() {
        assert!(validate_destination_component("developer").is_ok());
        assert!(validate_destination_component("a.b-c_d").is_ok());
        assert!(validate_destination_component("..").is_err());
        assert!(validate_destination_component("a/b").is_err());
        assert!(validate_destination_component("").is_err());
        assert!(validate_destination_component("a\0b").is_err());
    }
}
