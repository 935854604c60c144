//! Catalog construction.
//!
//! For each enabled source: synchronize (unless a sufficiently fresh mirror
//! exists and `refresh` is off), walk the extracted subtree's immediate
//! children, parse manifests, compute content digests, and merge repo-level
//! index metadata. Per-source failures are recorded on that source and never
//! abort the build; the catalog is the union of the sources that succeeded.
//!
//! When a live build cannot run or yields nothing, the builder degrades to
//! the last cached catalog, then to a bundled read-only snapshot. Callers
//! always get a usable catalog.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::bundle::BundleKind;
use crate::catalog::digest::digest_dir;
use crate::catalog::{Catalog, CatalogEntry, CatalogProvenance, CATALOG_VERSION};
use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::manifest::ParsedManifest;
use crate::sources::{Source, SourceRegistry};
use crate::syncer::{SyncOutcome, Synchronizer};
use crate::utils::fs::{read_optional, write_atomic};

const SNAPSHOT_SKILLS: &str = include_str!("../../assets/snapshot-skills.json");
const SNAPSHOT_HOOKS: &str = include_str!("../../assets/snapshot-hooks.json");

/// Repo-level index record: `index.json` maps bundle name to overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexMeta {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

pub struct CatalogBuilder {
    registry: SourceRegistry,
    syncer: Synchronizer,
    credentials: Arc<CredentialStore>,
    kind: BundleKind,
    cache_path: std::path::PathBuf,
    /// Mirrors younger than this are reused when `refresh` is off.
    fresh_window: Duration,
}

impl CatalogBuilder {
    #[must_use]
    pub fn new(
        registry: SourceRegistry,
        syncer: Synchronizer,
        credentials: Arc<CredentialStore>,
        data_dir: &Path,
        kind: BundleKind,
        fresh_window: Duration,
    ) -> Self {
        Self {
            registry,
            syncer,
            credentials,
            kind,
            cache_path: data_dir.join(kind.dir_name()).join("catalog-cache.json"),
            fresh_window,
        }
    }

    /// Build a catalog. Never fails for source-scoped reasons; the
    /// degradation chain guarantees a usable (possibly stale) result.
    pub fn build(&self, refresh: bool) -> Result<Catalog> {
        let sources = match self.registry.load() {
            Ok(sources) => sources,
            Err(err) => {
                warn!(%err, "source registry unreadable, degrading");
                return self.degraded(format!("source registry unreadable: {err}"));
            }
        };

        let enabled: Vec<Source> = sources.iter().filter(|s| s.enabled).cloned().collect();

        // Sync phase: distinct sources in parallel; registry writes happen
        // sequentially afterwards (single writer).
        let outcomes: Vec<(Source, Result<SyncOutcome>)> = enabled
            .par_iter()
            .map(|source| (source.clone(), self.ensure_mirror(source, refresh)))
            .collect();

        for (source, outcome) in &outcomes {
            if let Err(err) = self.registry.record_sync(&source.id, outcome) {
                warn!(source = %source.id, %err, "failed to record sync status");
            }
        }

        let mut entries = Vec::new();
        let mut any_success = false;
        for (source, outcome) in &outcomes {
            match outcome {
                Ok(sync) => {
                    any_success = true;
                    match self.scan_source(source, &sync.extracted_path) {
                        Ok(mut scanned) => entries.append(&mut scanned),
                        Err(err) => {
                            warn!(source = %source.id, %err, "source scan failed");
                            let _ = self.registry.update(&source.id, |s| {
                                s.last_error = Some(err.to_string());
                            });
                        }
                    }
                }
                Err(err) => {
                    warn!(source = %source.id, %err, "source sync failed");
                }
            }
        }

        if entries.is_empty() {
            let reason = if any_success {
                "live build yielded no entries".to_string()
            } else {
                "no source could be synchronized".to_string()
            };
            return self.degraded(reason);
        }

        entries.sort_by(|a, b| a.composite_id.cmp(&b.composite_id));

        let catalog = Catalog {
            generated_at: Utc::now(),
            source: format!("agentpack/{}", env!("CARGO_PKG_VERSION")),
            version: CATALOG_VERSION,
            sources: self.registry.load().unwrap_or(sources),
            entries,
            stale: false,
            catalog_source: CatalogProvenance::Live,
            stale_reason: None,
            cache_age_seconds: None,
        };

        if let Err(err) = self.write_cache(&catalog) {
            warn!(%err, "failed to write catalog cache");
        }

        Ok(catalog)
    }

    /// Reuse a fresh mirror or run a full sync.
    fn ensure_mirror(&self, source: &Source, refresh: bool) -> Result<SyncOutcome> {
        if !refresh {
            if let (Some(last), Some(extracted), Some(revision)) = (
                source.last_sync_at,
                source.local_extracted_path.as_ref(),
                source.revision.as_ref(),
            ) {
                let age = Utc::now().signed_duration_since(last);
                if age.to_std().map_or(false, |age| age < self.fresh_window)
                    && extracted.is_dir()
                {
                    debug!(source = %source.id, "reusing fresh mirror");
                    return Ok(SyncOutcome {
                        local_repo_path: source
                            .local_repo_path
                            .clone()
                            .unwrap_or_else(|| self.syncer.repo_path(&source.id)),
                        extracted_path: extracted.clone(),
                        revision: revision.clone(),
                    });
                }
            }
        }
        let token = self.credentials.get(&source.id);
        self.syncer.sync(source, token.as_deref())
    }

    /// Walk one extracted subtree into catalog entries.
    fn scan_source(&self, source: &Source, extracted: &Path) -> Result<Vec<CatalogEntry>> {
        let index = self.load_index(extracted)?;
        let denylist = self.kind.denylist();
        let now = Utc::now();
        let mut entries = Vec::new();
        let mut seen = std::collections::BTreeSet::new();

        for entry in std::fs::read_dir(extracted)? {
            let entry = entry?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if denylist.contains(&name.as_str()) {
                debug!(source = %source.id, %name, "denylisted bundle skipped");
                continue;
            }
            let has_marker = dir.join(self.kind.marker_file()).is_file()
                || dir.join(self.kind.structured_manifest()).is_file();
            if !has_marker {
                continue;
            }

            let manifest = match ParsedManifest::load(&dir, self.kind) {
                Ok(manifest) => manifest,
                Err(err) => {
                    warn!(source = %source.id, %name, %err, "manifest unreadable, skipping bundle");
                    continue;
                }
            };

            let digest = match digest_dir(&dir) {
                Ok(digest) => Some(digest),
                Err(err) => {
                    warn!(source = %source.id, %name, %err, "digest failed");
                    None
                }
            };

            let meta = index.get(&name).cloned().unwrap_or_default();
            seen.insert(name.clone());
            entries.push(CatalogEntry {
                composite_id: format!("{}/{name}", source.id),
                source_id: source.id.clone(),
                source_name: source.name.clone(),
                source_url: source.repo_url.clone(),
                description: meta
                    .description
                    .or_else(|| manifest.string_field("description").map(String::from))
                    .unwrap_or_default(),
                category: meta
                    .category
                    .or_else(|| manifest.string_field("category").map(String::from))
                    .unwrap_or_default(),
                resources: manifest.list_field("resources"),
                version: meta
                    .version
                    .or_else(|| manifest.string_field("version").map(String::from)),
                name,
                source_path: dir,
                content_digest: digest,
                updated_at: now,
            });
        }

        // Index-only entries: synthesized even without a physical directory.
        for (name, meta) in &index {
            if seen.contains(name) || denylist.contains(&name.as_str()) {
                continue;
            }
            entries.push(CatalogEntry {
                composite_id: format!("{}/{name}", source.id),
                source_id: source.id.clone(),
                source_name: source.name.clone(),
                source_url: source.repo_url.clone(),
                name: name.clone(),
                description: meta.description.clone().unwrap_or_default(),
                category: meta.category.clone().unwrap_or_default(),
                resources: Vec::new(),
                source_path: extracted.join(name),
                content_digest: None,
                version: meta.version.clone(),
                updated_at: now,
            });
        }

        Ok(entries)
    }

    fn load_index(&self, extracted: &Path) -> Result<BTreeMap<String, IndexMeta>> {
        let path = extracted.join(self.kind.index_file());
        let Some(raw) = read_optional(&path)? else {
            return Ok(BTreeMap::new());
        };
        match serde_json::from_str(&raw) {
            Ok(index) => Ok(index),
            Err(err) => {
                warn!(path = %path.display(), %err, "malformed index ignored");
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_cache(&self, catalog: &Catalog) -> Result<()> {
        write_atomic(&self.cache_path, &serde_json::to_string(catalog)?)
    }

    /// Cache, then snapshot. Both are marked stale.
    fn degraded(&self, reason: String) -> Result<Catalog> {
        if let Some(raw) = read_optional(&self.cache_path)? {
            match serde_json::from_str::<Catalog>(&raw) {
                Ok(mut catalog) => {
                    let age = Utc::now()
                        .signed_duration_since(catalog.generated_at)
                        .num_seconds()
                        .max(0);
                    catalog.stale = true;
                    catalog.catalog_source = CatalogProvenance::Cache;
                    catalog.stale_reason = Some(reason);
                    catalog.cache_age_seconds = Some(age.unsigned_abs());
                    return Ok(catalog);
                }
                Err(err) => {
                    warn!(%err, "catalog cache unreadable, falling back to snapshot");
                }
            }
        }

        let raw = match self.kind {
            BundleKind::Skill => SNAPSHOT_SKILLS,
            BundleKind::Hook => SNAPSHOT_HOOKS,
        };
        let mut catalog: Catalog = serde_json::from_str(raw)?;
        catalog.stale = true;
        catalog.catalog_source = CatalogProvenance::Snapshot;
        catalog.stale_reason = Some(reason);
        Ok(catalog)
    }
}
