//! Bundle kinds.
//!
//! agentpack manages two kinds of configuration bundle: skills and hooks.
//! Both flow through the same registry/sync/catalog/install machinery; the
//! kind decides marker files, default subtree roots, and on-disk layout.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BundleKind {
    Skill,
    Hook,
}

impl BundleKind {
    /// Marker file identifying an immediate subdirectory as a bundle.
    #[must_use]
    pub const fn marker_file(self) -> &'static str {
        match self {
            Self::Skill => "SKILL.md",
            Self::Hook => "HOOK.md",
        }
    }

    /// Default subtree root inside a source repository.
    #[must_use]
    pub const fn default_root_path(self) -> &'static str {
        match self {
            Self::Skill => "/skills",
            Self::Hook => "/hooks",
        }
    }

    /// Directory name for this kind under the data root and install roots.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Skill => "skills",
            Self::Hook => "hooks",
        }
    }

    /// Repo-level index file mapping bundle name to metadata overrides.
    #[must_use]
    pub const fn index_file(self) -> &'static str {
        "index.json"
    }

    /// Structured per-bundle manifest. Wins over frontmatter when present.
    #[must_use]
    pub const fn structured_manifest(self) -> &'static str {
        "manifest.json"
    }

    /// Legacy bundle names excluded from every catalog build.
    #[must_use]
    pub const fn denylist(self) -> &'static [&'static str] {
        match self {
            Self::Skill => &["_template", "skill-template"],
            Self::Hook => &["_template", "hook-template"],
        }
    }

    /// Built-in official source for this kind.
    #[must_use]
    pub const fn builtin_source(self) -> BuiltinSource {
        match self {
            Self::Skill => BuiltinSource {
                id: "official",
                name: "Official Skills",
                repo_url: "https://github.com/agentpack/skills",
                root_path: "/skills",
            },
            Self::Hook => BuiltinSource {
                id: "official",
                name: "Official Hooks",
                repo_url: "https://github.com/agentpack/hooks",
                root_path: "/hooks",
            },
        }
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Static description of the built-in official source.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinSource {
    pub id: &'static str,
    pub name: &'static str,
    pub repo_url: &'static str,
    pub root_path: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_have_distinct_markers() {
        assert_ne!(
            BundleKind::Skill.marker_file(),
            BundleKind::Hook.marker_file()
        );
    }

    #[test]
    fn builtin_root_paths_are_absolute() {
        for kind in [BundleKind::Skill, BundleKind::Hook] {
            assert!(kind.builtin_source().root_path.starts_with('/'));
        }
    }
}
