//! Configuration.
//!
//! Layered TOML config: built-in defaults, the global user config, a config
//! file in the data root, then `AGENTPACK_*` environment overrides. Each
//! layer is parsed as a patch and merged field-by-field.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PackError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub install: InstallConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Hard timeout for every git subprocess.
    pub timeout_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

impl GitConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Mirrors younger than this are reused by non-refresh builds.
    pub fresh_window_minutes: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            fresh_window_minutes: 15,
        }
    }
}

impl CatalogConfig {
    #[must_use]
    pub const fn fresh_window(&self) -> Duration {
        Duration::from_secs(self.fresh_window_minutes * 60)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Default install mode when the CLI does not specify one.
    #[serde(default)]
    pub default_mode: crate::state::InstallMode,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    git: Option<GitPatch>,
    catalog: Option<CatalogPatch>,
    install: Option<InstallPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct GitPatch {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    fresh_window_minutes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct InstallPatch {
    default_mode: Option<crate::state::InstallMode>,
}

impl Config {
    /// Load configuration for a data root. An explicit path short-circuits
    /// the global/data-root chain; env overrides always apply last.
    pub fn load(explicit_path: Option<&Path>, data_dir: &Path) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = explicit_path {
            if let Some(patch) = Self::load_patch(path)? {
                config.merge_patch(patch);
            }
        } else {
            if let Some(global) = dirs::config_dir()
                .map(|dir| dir.join("agentpack/config.toml"))
                .map(|path| Self::load_patch(&path))
                .transpose()?
                .flatten()
            {
                config.merge_patch(global);
            }
            if let Some(local) = Self::load_patch(&data_dir.join("config.toml"))? {
                config.merge_patch(local);
            }
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|err| PackError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| PackError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(git) = patch.git {
            if let Some(timeout) = git.timeout_secs {
                self.git.timeout_secs = timeout;
            }
        }
        if let Some(catalog) = patch.catalog {
            if let Some(window) = catalog.fresh_window_minutes {
                self.catalog.fresh_window_minutes = window;
            }
        }
        if let Some(install) = patch.install {
            if let Some(mode) = install.default_mode {
                self.install.default_mode = mode;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var("AGENTPACK_GIT_TIMEOUT_SECS") {
            self.git.timeout_secs = raw.parse().map_err(|_| {
                PackError::Config(format!("invalid AGENTPACK_GIT_TIMEOUT_SECS: {raw}"))
            })?;
        }
        if let Ok(raw) = std::env::var("AGENTPACK_FRESH_WINDOW_MINUTES") {
            self.catalog.fresh_window_minutes = raw.parse().map_err(|_| {
                PackError::Config(format!("invalid AGENTPACK_FRESH_WINDOW_MINUTES: {raw}"))
            })?;
        }
        Ok(())
    }
}
