//! Source synchronizer.
//!
//! Mirrors a source's git repository into the local data directory and
//! extracts the configured bundle subtree into a stable per-source path.
//!
//! Same-source syncs serialize on a keyed lock; distinct sources run fully
//! concurrently with no global lock. Credentialed remote URLs exist only
//! in-memory for the duration of a sync: `origin` is reset to the plain URL
//! on every exit path, so credentials never rest in local git config.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bundle::BundleKind;
use crate::error::{PackError, Result};
use crate::gitio::GitClient;
use crate::redact::with_url_credentials;
use crate::sources::{Source, Transport};
use crate::utils::fs::{ensure_dir, replace_dir, remove_path};

/// Result of a successful sync.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub local_repo_path: PathBuf,
    pub extracted_path: PathBuf,
    pub revision: String,
}

/// Keyed mutual exclusion: one sync in flight per source id.
#[derive(Default)]
pub struct SyncLocks {
    map: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SyncLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn for_source(&self, source_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.map.lock();
        map.entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Mirrors sources for one bundle kind.
pub struct Synchronizer {
    git: GitClient,
    kind_dir: PathBuf,
    kind: BundleKind,
    locks: Arc<SyncLocks>,
}

impl Synchronizer {
    #[must_use]
    pub fn new(git: GitClient, data_dir: &Path, kind: BundleKind, locks: Arc<SyncLocks>) -> Self {
        Self {
            git,
            kind_dir: data_dir.join(kind.dir_name()),
            kind,
            locks,
        }
    }

    /// Local mirror checkout path for a source.
    #[must_use]
    pub fn repo_path(&self, source_id: &str) -> PathBuf {
        self.kind_dir.join("repos").join(source_id)
    }

    /// Stable extraction path for a source's bundle subtree.
    #[must_use]
    pub fn extracted_path(&self, source_id: &str) -> PathBuf {
        self.kind_dir.join("extracted").join(source_id)
    }

    /// Synchronize one source. Serializes against other syncs of the same
    /// source id; errors are already redacted.
    pub fn sync(&self, source: &Source, token: Option<&str>) -> Result<SyncOutcome> {
        let lock = self.locks.for_source(&source.id);
        let _guard = lock.lock();

        let repo_dir = self.repo_path(&source.id);
        let outcome = self.sync_locked(source, token, &repo_dir);

        // Reset origin to the credential-free URL even on failure; the
        // credentialed form must never remain in git config at rest.
        if token.is_some() && GitClient::is_repo(&repo_dir) {
            if let Err(err) = self.git.set_remote_url(&repo_dir, &source.repo_url) {
                warn!(source = %source.id, %err, "failed to reset origin url");
            }
        }

        outcome
    }

    fn sync_locked(
        &self,
        source: &Source,
        token: Option<&str>,
        repo_dir: &Path,
    ) -> Result<SyncOutcome> {
        let remote_url = match (token, source.transport) {
            (Some(token), Transport::Https) => with_url_credentials(&source.repo_url, token),
            _ => source.repo_url.clone(),
        };

        if GitClient::is_repo(repo_dir) {
            debug!(source = %source.id, "fetching existing mirror");
            self.git.set_remote_url(repo_dir, &remote_url)?;
            // The wildcard refspec survives upstream default-branch renames
            // that a shallow clone's single-branch refspec would miss.
            self.git.force_wildcard_refspec(repo_dir)?;
            self.git.fetch_prune(repo_dir)?;
        } else {
            if repo_dir.exists() {
                // Leftover from an interrupted clone.
                remove_path(repo_dir)?;
            }
            if let Some(parent) = repo_dir.parent() {
                ensure_dir(parent)?;
            }
            info!(source = %source.id, "cloning mirror");
            self.git.clone_shallow(&remote_url, repo_dir)?;
        }

        let branch = self.detect_default_branch(repo_dir)?;
        // The mirror always reflects upstream; local modifications never
        // survive a sync.
        self.git.hard_reset_to(repo_dir, &branch)?;
        let revision = self.git.head_revision(repo_dir)?;

        let subtree = self.resolve_subtree(source, repo_dir)?;
        let extracted = self.extracted_path(&source.id);
        replace_dir(&subtree, &extracted)?;

        Ok(SyncOutcome {
            local_repo_path: repo_dir.to_path_buf(),
            extracted_path: extracted,
            revision,
        })
    }

    /// Default-branch fallback chain: remote symref, local `origin/HEAD`,
    /// `main`/`master`, then any remaining `origin/*` ref.
    fn detect_default_branch(&self, repo_dir: &Path) -> Result<String> {
        if let Some(branch) = self.git.remote_head_branch(repo_dir)? {
            return Ok(branch);
        }
        if let Some(branch) = self.git.local_head_branch(repo_dir)? {
            return Ok(branch);
        }
        for candidate in ["main", "master"] {
            if self.git.has_remote_branch(repo_dir, candidate)? {
                return Ok(candidate.to_string());
            }
        }
        if let Some(branch) = self.git.remote_branches(repo_dir)?.into_iter().next() {
            return Ok(branch);
        }
        Err(PackError::Git(format!(
            "no default branch resolvable in {}",
            repo_dir.display()
        )))
    }

    /// Resolve the configured subtree root. When absent, the repo root is
    /// accepted as bundle root iff at least one immediate subdirectory
    /// carries the kind's marker file (pre-convention repos).
    fn resolve_subtree(&self, source: &Source, repo_dir: &Path) -> Result<PathBuf> {
        let rel = source.root_path.trim_start_matches('/');
        let configured = repo_dir.join(rel);
        if configured.is_dir() {
            return Ok(configured);
        }

        let marker = self.kind.marker_file();
        let mut has_bundles = false;
        if repo_dir.is_dir() {
            for entry in std::fs::read_dir(repo_dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir()
                    && entry.file_name() != ".git"
                    && path.join(marker).is_file()
                {
                    has_bundles = true;
                    break;
                }
            }
        }
        if has_bundles {
            debug!(source = %source.id, "root path missing, using repo root as bundle root");
            return Ok(repo_dir.to_path_buf());
        }

        Err(PackError::Validation(format!(
            "source {} has no {} subtree and no {marker} bundles at the repo root",
            source.id, source.root_path
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn keyed_locks_serialize_same_source() {
        let locks = Arc::new(SyncLocks::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = locks.clone();
                let concurrent = concurrent.clone();
                let peak = peak.clone();
                std::thread::spawn(move || {
                    let lock = locks.for_source("same");
                    let _guard = lock.lock();
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_sources_get_distinct_locks() {
        let locks = SyncLocks::new();
        let a = locks.for_source("a");
        let b = locks.for_source("b");
        let _ga = a.lock();
        // Distinct key: acquiring b must not deadlock.
        let _gb = b.lock();
    }
}
