//! Install targets.
//!
//! A target is the agent-specific install root an operation applies to,
//! qualified by scope: user-level (home directory) or project-level
//! (a directory inside the project tree).

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::bundle::BundleKind;
use crate::error::{PackError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    Claude,
    Codex,
    Opencode,
}

impl Agent {
    /// Directory name used by this agent, relative to home (user scope) or
    /// the project root (project scope).
    #[must_use]
    pub const fn config_dir(self) -> &'static str {
        match self {
            Self::Claude => ".claude",
            Self::Codex => ".codex",
            Self::Opencode => ".opencode",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Opencode => "opencode",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    User,
    Project,
}

impl Scope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Project => "project",
        }
    }
}

/// A fully resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub agent: Agent,
    pub scope: Scope,
    pub project_path: Option<PathBuf>,
}

impl Target {
    /// Resolve the install root for a bundle kind.
    ///
    /// User scope roots live under the agent's home config directory,
    /// project scope under `<project>/<agent-dir>`.
    pub fn install_root(&self, kind: BundleKind) -> Result<PathBuf> {
        let base = match self.scope {
            Scope::User => dirs::home_dir()
                .ok_or_else(|| PackError::Config("home directory not found".to_string()))?,
            Scope::Project => self.project_path.clone().ok_or_else(|| {
                PackError::Validation(
                    "project scope requires a project path".to_string(),
                )
            })?,
        };
        Ok(base.join(self.agent.config_dir()).join(kind.dir_name()))
    }

    /// Short label for reports, e.g. `claude:user`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}:{}", self.agent.as_str(), self.scope.as_str())
    }
}
