//! Install state persistence.
//!
//! One JSON document per install root records exactly what agentpack
//! manages there: managed entities, baseline paths, and a bounded history of
//! operations. The document is read-merge-written on every operation and
//! deleted only by a full force-uninstall.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{PackError, Result};
use crate::utils::fs::{read_optional, write_atomic};

/// Fixed relative path of the state document under an install root.
pub const STATE_FILE: &str = ".agentpack-state.json";

pub const STATE_SCHEMA_VERSION: u32 = 1;

const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    #[default]
    Symlink,
    Copy,
}

/// A bundle the engine installed into a target and tracks for removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedEntity {
    pub name: String,
    pub composite_id: String,
    pub source_id: String,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_content_digest: Option<String>,
    /// True when the binding no longer resolves in the current catalog.
    #[serde(default)]
    pub orphaned: bool,
    /// Mode the user requested.
    pub install_mode: InstallMode,
    /// Mode actually applied (symlink may fall back to copy).
    pub effective_mode: InstallMode,
    pub destination_path: PathBuf,
    pub source_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub at: DateTime<Utc>,
    pub operation: String,
    #[serde(default)]
    pub applied: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub warnings: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallState {
    pub schema_version: u32,
    pub installer_version: String,
    pub target: String,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<PathBuf>,
    #[serde(default)]
    pub managed_entities: Vec<ManagedEntity>,
    #[serde(default)]
    pub managed_baseline_paths: Vec<PathBuf>,
    /// Ring buffer, most recent last.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstallState {
    #[must_use]
    pub fn new(target: String, scope: String, project_path: Option<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            installer_version: env!("CARGO_PKG_VERSION").to_string(),
            target,
            scope,
            project_path,
            managed_entities: Vec::new(),
            managed_baseline_paths: Vec::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn managed_ids(&self) -> Vec<String> {
        self.managed_entities
            .iter()
            .map(|e| e.composite_id.clone())
            .collect()
    }

    #[must_use]
    pub fn entity(&self, composite_id: &str) -> Option<&ManagedEntity> {
        self.managed_entities
            .iter()
            .find(|e| e.composite_id == composite_id)
    }

    /// Record or replace a managed entity (keyed by composite id).
    pub fn upsert_entity(&mut self, entity: ManagedEntity) {
        self.managed_entities
            .retain(|e| e.composite_id != entity.composite_id);
        self.managed_entities.push(entity);
    }

    pub fn remove_entity(&mut self, composite_id: &str) -> Option<ManagedEntity> {
        let idx = self
            .managed_entities
            .iter()
            .position(|e| e.composite_id == composite_id)?;
        Some(self.managed_entities.remove(idx))
    }

    /// Append a history entry, trimming the ring buffer to its cap.
    pub fn push_history(
        &mut self,
        operation: &str,
        applied: Vec<String>,
        removed: Vec<String>,
        warnings: usize,
    ) {
        self.history.push(HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            at: Utc::now(),
            operation: operation.to_string(),
            applied,
            removed,
            warnings,
        });
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }
}

/// Load/save/reconcile install-state documents.
pub struct StateStore;

impl StateStore {
    #[must_use]
    pub fn path(install_root: &Path) -> PathBuf {
        install_root.join(STATE_FILE)
    }

    pub fn load(install_root: &Path) -> Result<Option<InstallState>> {
        let path = Self::path(install_root);
        let Some(raw) = read_optional(&path)? else {
            return Ok(None);
        };
        let state: InstallState = serde_json::from_str(&raw).map_err(|err| {
            PackError::Config(format!("parse install state {}: {err}", path.display()))
        })?;
        Ok(Some(state))
    }

    pub fn save(install_root: &Path, state: &mut InstallState) -> Result<()> {
        state.updated_at = Utc::now();
        state.installer_version = env!("CARGO_PKG_VERSION").to_string();
        let json = serde_json::to_string_pretty(state)?;
        write_atomic(Self::path(install_root), &json)
    }

    pub fn delete(install_root: &Path) -> Result<()> {
        let path = Self::path(install_root);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Re-resolve each managed entity against a freshly built catalog.
    ///
    /// Binding is by composite id first; a bare-name match is accepted only
    /// when exactly one candidate exists. Entities that resolve are rebound
    /// (and un-orphaned); unresolvable entities are flagged `orphaned` and
    /// left in place. Orphaning is informational until an explicit uninstall
    /// acts on it.
    pub fn reconcile(state: &mut InstallState, catalog: &Catalog) {
        for entity in &mut state.managed_entities {
            if let Some(entry) = catalog.get(&entity.composite_id) {
                entity.orphaned = false;
                entity.source_url = entry.source_url.clone();
                continue;
            }
            let candidates = catalog.by_name(&entity.name);
            if candidates.len() == 1 {
                let entry = candidates[0];
                entity.composite_id = entry.composite_id.clone();
                entity.source_id = entry.source_id.clone();
                entity.source_url = entry.source_url.clone();
                entity.orphaned = false;
            } else {
                entity.orphaned = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, CatalogProvenance, CATALOG_VERSION};
    use tempfile::tempdir;

    fn entity(composite_id: &str, name: &str) -> ManagedEntity {
        ManagedEntity {
            name: name.to_string(),
            composite_id: composite_id.to_string(),
            source_id: composite_id.split('/').next().unwrap().to_string(),
            source_url: "https://example.com/r.git".to_string(),
            source_revision: None,
            source_content_digest: None,
            orphaned: false,
            install_mode: InstallMode::Symlink,
            effective_mode: InstallMode::Symlink,
            destination_path: PathBuf::from("/tmp/root/dev"),
            source_path: PathBuf::from("/tmp/src/dev"),
        }
    }

    fn catalog_with(entries: Vec<CatalogEntry>) -> Catalog {
        Catalog {
            generated_at: Utc::now(),
            source: "test".to_string(),
            version: CATALOG_VERSION,
            sources: Vec::new(),
            entries,
            stale: false,
            catalog_source: CatalogProvenance::Live,
            stale_reason: None,
            cache_age_seconds: None,
        }
    }

    fn catalog_entry(composite_id: &str, name: &str) -> CatalogEntry {
        CatalogEntry {
            composite_id: composite_id.to_string(),
            source_id: composite_id.split('/').next().unwrap().to_string(),
            source_name: "src".to_string(),
            source_url: "https://example.com/r.git".to_string(),
            name: name.to_string(),
            description: String::new(),
            category: String::new(),
            resources: Vec::new(),
            source_path: PathBuf::from("/tmp/src"),
            content_digest: None,
            version: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn round_trips_state_document() {
        let dir = tempdir().unwrap();
        let mut state = InstallState::new("claude:user".into(), "user".into(), None);
        state.upsert_entity(entity("official/developer", "developer"));
        StateStore::save(dir.path(), &mut state).unwrap();

        let loaded = StateStore::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.managed_entities.len(), 1);
        assert_eq!(loaded.schema_version, STATE_SCHEMA_VERSION);
    }

    #[test]
    fn missing_state_loads_as_none() {
        let dir = tempdir().unwrap();
        assert!(StateStore::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn history_is_bounded() {
        let mut state = InstallState::new("claude:user".into(), "user".into(), None);
        for i in 0..150 {
            state.push_history("install", vec![format!("official/s{i}")], vec![], 0);
        }
        assert_eq!(state.history.len(), 100);
        // Oldest entries were dropped.
        assert!(state.history[0].applied[0].ends_with("s50"));
    }

    #[test]
    fn reconcile_marks_unresolvable_as_orphaned() {
        let mut state = InstallState::new("claude:user".into(), "user".into(), None);
        state.upsert_entity(entity("gone/developer", "developer"));
        let catalog = catalog_with(vec![]);
        StateStore::reconcile(&mut state, &catalog);
        assert!(state.managed_entities[0].orphaned);
        assert_eq!(state.managed_entities.len(), 1);
    }

    #[test]
    fn reconcile_rebinds_unique_bare_name() {
        let mut state = InstallState::new("claude:user".into(), "user".into(), None);
        state.upsert_entity(entity("old-source/developer", "developer"));
        let catalog = catalog_with(vec![catalog_entry("new-source/developer", "developer")]);
        StateStore::reconcile(&mut state, &catalog);
        let entity = &state.managed_entities[0];
        assert!(!entity.orphaned);
        assert_eq!(entity.composite_id, "new-source/developer");
        assert_eq!(entity.source_id, "new-source");
    }

    #[test]
    fn reconcile_keeps_ambiguous_bare_name_orphaned() {
        let mut state = InstallState::new("claude:user".into(), "user".into(), None);
        state.upsert_entity(entity("gone/developer", "developer"));
        let catalog = catalog_with(vec![
            catalog_entry("a/developer", "developer"),
            catalog_entry("b/developer", "developer"),
        ]);
        StateStore::reconcile(&mut state, &catalog);
        assert!(state.managed_entities[0].orphaned);
    }

    #[test]
    fn upsert_replaces_existing_binding() {
        let mut state = InstallState::new("claude:user".into(), "user".into(), None);
        state.upsert_entity(entity("official/developer", "developer"));
        let mut replacement = entity("official/developer", "developer");
        replacement.effective_mode = InstallMode::Copy;
        state.upsert_entity(replacement);
        assert_eq!(state.managed_entities.len(), 1);
        assert_eq!(
            state.managed_entities[0].effective_mode,
            InstallMode::Copy
        );
    }
}
