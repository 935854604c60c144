//! Catalog types.
//!
//! A catalog is a point-in-time aggregation of every bundle discoverable
//! across enabled sources. It is stateless and rebuilt from scratch on each
//! build; authoritativeness is signaled through `stale`/`catalog_source`
//! rather than through errors.

pub mod builder;
pub mod digest;

pub use builder::CatalogBuilder;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::sources::Source;

/// Where a catalog came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CatalogProvenance {
    #[default]
    Live,
    Cache,
    Snapshot,
}

/// One installable bundle as discovered in a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// `<sourceId>/<name>`; unique per build.
    pub composite_id: String,
    pub source_id: String,
    pub source_name: String,
    pub source_url: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub resources: Vec<String>,
    /// Local extracted bundle directory.
    pub source_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog schema version, bumped when the persisted shape changes.
pub const CATALOG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub generated_at: DateTime<Utc>,
    /// Generator identity.
    pub source: String,
    pub version: u32,
    pub sources: Vec<Source>,
    pub entries: Vec<CatalogEntry>,
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub catalog_source: CatalogProvenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_age_seconds: Option<u64>,
}

impl Catalog {
    /// Look up an entry by composite id.
    #[must_use]
    pub fn get(&self, composite_id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.composite_id == composite_id)
    }

    /// All entries sharing a bare name, across sources.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Vec<&CatalogEntry> {
        self.entries.iter().filter(|e| e.name == name).collect()
    }
}
