//! Application context.
//!
//! Wires the data root, configuration, and shared engine services for the
//! CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bundle::BundleKind;
use crate::catalog::CatalogBuilder;
use crate::cli::Cli;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::{PackError, Result};
use crate::gitio::GitClient;
use crate::sources::SourceRegistry;
use crate::syncer::{SyncLocks, Synchronizer};
use crate::utils::fs::ensure_dir;

pub struct AppContext {
    pub data_dir: PathBuf,
    pub config: Config,
    pub credentials: Arc<CredentialStore>,
    pub robot_mode: bool,
    pub verbosity: u8,
    locks: Arc<SyncLocks>,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let data_dir = Self::find_data_dir()?;
        ensure_dir(&data_dir)?;
        let config = Config::load(cli.config.as_deref(), &data_dir)?;

        Ok(Self {
            credentials: Arc::new(CredentialStore::open(&data_dir)),
            data_dir,
            config,
            robot_mode: cli.robot,
            verbosity: cli.verbose,
            locks: Arc::new(SyncLocks::new()),
        })
    }

    /// Context rooted at an explicit directory (tests).
    pub fn at_root(data_dir: &Path) -> Result<Self> {
        ensure_dir(data_dir)?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config: Config::load(None, data_dir)?,
            credentials: Arc::new(CredentialStore::file_only(data_dir)),
            robot_mode: true,
            verbosity: 0,
            locks: Arc::new(SyncLocks::new()),
        })
    }

    fn find_data_dir() -> Result<PathBuf> {
        if let Ok(root) = std::env::var("AGENTPACK_ROOT") {
            return Ok(PathBuf::from(root));
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| PackError::Config("data directory not found".to_string()))?;
        Ok(data_dir.join("agentpack"))
    }

    pub fn registry(&self, kind: BundleKind) -> SourceRegistry {
        SourceRegistry::new(&self.data_dir, kind)
    }

    pub fn synchronizer(&self, kind: BundleKind) -> Result<Synchronizer> {
        let git = GitClient::detect(self.config.git.timeout())?;
        Ok(Synchronizer::new(
            git,
            &self.data_dir,
            kind,
            self.locks.clone(),
        ))
    }

    pub fn catalog_builder(&self, kind: BundleKind) -> Result<CatalogBuilder> {
        Ok(CatalogBuilder::new(
            self.registry(kind),
            self.synchronizer(kind)?,
            self.credentials.clone(),
            &self.data_dir,
            kind,
            self.config.catalog.fresh_window(),
        ))
    }
}
