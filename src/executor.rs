//! Delta execution.
//!
//! The executor applies a planned delta to each requested target: baseline
//! materialization, selection resolution, removals before installs, integrity
//! verification, and state persistence. A failure in one target never aborts
//! the others; per-entity failures are captured into the target's report.

use std::path::Path;

use tracing::{debug, info};

use crate::bundle::BundleKind;
use crate::catalog::digest::digest_dir;
use crate::catalog::{Catalog, CatalogEntry};
use crate::error::{PackError, Result};
use crate::planner;
use crate::security::path_policy::{contain, validate_destination_component};
use crate::state::{InstallMode, InstallState, ManagedEntity, StateStore};
use crate::targets::Target;
use crate::utils::fs::{copy_dir_recursive, ensure_dir, remove_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Uninstall,
    Sync,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Sync => "sync",
        }
    }
}

/// One engine request, as consumed from collaborators (CLI, control plane).
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub operation: Operation,
    pub kind: BundleKind,
    pub targets: Vec<Target>,
    pub mode: InstallMode,
    pub selection: Vec<String>,
    pub remove_unselected: bool,
    pub force: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub code: &'static str,
    pub message: String,
}

/// Per-target outcome.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReport {
    pub target: String,
    pub applied_ids: Vec<String>,
    pub removed_ids: Vec<String>,
    pub skipped_ids: Vec<String>,
    pub warnings: Vec<Warning>,
    pub errors: Vec<String>,
}

impl TargetReport {
    fn new(target: &Target) -> Self {
        Self {
            target: target.label(),
            ..Self::default()
        }
    }

    fn warn(&mut self, code: &'static str, message: impl Into<String>) {
        self.warnings.push(Warning {
            code,
            message: message.into(),
        });
    }

    #[must_use]
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecReport {
    pub targets: Vec<TargetReport>,
}

impl ExecReport {
    #[must_use]
    pub fn ok(&self) -> bool {
        self.targets.iter().all(TargetReport::ok)
    }
}

/// A selection as supplied at the boundary: either source-qualified or a
/// bare legacy name. Resolved once into canonical composite-id form before
/// planning; the ambiguous form is never carried further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Qualified { source: String, name: String },
    Bare { name: String },
}

impl Selection {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('/') {
            Some((source, name)) if !source.is_empty() && !name.is_empty() => Self::Qualified {
                source: source.to_string(),
                name: name.to_string(),
            },
            _ => Self::Bare {
                name: raw.to_string(),
            },
        }
    }

    /// Resolve against a catalog. Qualified ids must exist; bare names
    /// resolve when globally unique, then via the official source, and fail
    /// with an explicit hint otherwise.
    pub fn resolve(&self, catalog: &Catalog) -> Result<String> {
        match self {
            Self::Qualified { source, name } => {
                let composite = format!("{source}/{name}");
                catalog
                    .get(&composite)
                    .map(|entry| entry.composite_id.clone())
                    .ok_or(PackError::EntryNotFound(composite))
            }
            Self::Bare { name } => {
                let candidates = catalog.by_name(name);
                match candidates.len() {
                    0 => Err(PackError::EntryNotFound(name.clone())),
                    1 => Ok(candidates[0].composite_id.clone()),
                    _ => {
                        let official: Vec<&&CatalogEntry> = candidates
                            .iter()
                            .filter(|entry| {
                                catalog
                                    .sources
                                    .iter()
                                    .any(|s| s.id == entry.source_id && s.official)
                            })
                            .collect();
                        if official.len() == 1 {
                            return Ok(official[0].composite_id.clone());
                        }
                        Err(PackError::Ambiguous(format!(
                            "{name} exists in multiple sources; use `<source>/{name}`"
                        )))
                    }
                }
            }
        }
    }
}

pub struct Executor<'a> {
    catalog: &'a Catalog,
}

impl<'a> Executor<'a> {
    #[must_use]
    pub const fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Apply a request to every target, in request order.
    #[must_use]
    pub fn execute(&self, request: &ExecRequest) -> ExecReport {
        let targets = request
            .targets
            .iter()
            .map(|target| match request.operation {
                Operation::Uninstall => self.uninstall_target(request, target),
                Operation::Install | Operation::Sync => self.apply_target(request, target),
            })
            .collect();
        ExecReport { targets }
    }

    // -----------------------------------------------------------------
    // install / sync
    // -----------------------------------------------------------------

    fn apply_target(&self, request: &ExecRequest, target: &Target) -> TargetReport {
        let mut report = TargetReport::new(target);
        let root = match target.install_root(request.kind) {
            Ok(root) => root,
            Err(err) => {
                report.errors.push(err.to_string());
                return report;
            }
        };

        let mut state = match self.load_state(target, &root) {
            Ok(state) => state,
            Err(err) => {
                report.errors.push(err.to_string());
                return report;
            }
        };
        if let Err(err) = self.materialize_baseline(&root, &mut state) {
            report.errors.push(err.to_string());
            return report;
        }

        StateStore::reconcile(&mut state, self.catalog);

        // Resolve the desired selection into canonical composite ids. An
        // unknown source-qualified id is skipped with a warning; a bare name
        // that is absent or ambiguous is a rejection.
        let mut desired = Vec::new();
        for raw in &request.selection {
            let selection = Selection::parse(raw);
            match selection.resolve(self.catalog) {
                Ok(id) => desired.push(id),
                Err(err) => match selection {
                    Selection::Qualified { .. } => {
                        report.skipped_ids.push(raw.clone());
                        report.warn("UNKNOWN_ID", err.to_string());
                    }
                    Selection::Bare { .. } => report.errors.push(err.to_string()),
                },
            }
        }

        let plan = planner::delta(&desired, &state.managed_ids(), request.remove_unselected);
        debug!(target = %report.target, ?plan, "planned delta");

        // Removals precede installs so a reinstall-in-place inside one sync
        // cannot race its own prior copy.
        for id in &plan.to_remove {
            match self.remove_entity(&mut state, &root, id) {
                Ok(()) => report.removed_ids.push(id.clone()),
                Err(err) => report.errors.push(format!("{id}: {err}")),
            }
        }

        report
            .skipped_ids
            .extend(plan.already_installed.iter().cloned());

        let mut installed_names: Vec<(String, String)> = state
            .managed_entities
            .iter()
            .map(|e| (e.name.clone(), e.composite_id.clone()))
            .collect();

        for id in &plan.to_install {
            let Some(entry) = self.catalog.get(id) else {
                report.skipped_ids.push(id.clone());
                report.warn("UNKNOWN_ID", format!("{id} is not in the current catalog"));
                continue;
            };

            // Same bare name from another source in this same run: skip
            // rather than silently last-write-win.
            if let Some((_, winner)) = installed_names
                .iter()
                .find(|(name, cid)| *name == entry.name && *cid != entry.composite_id)
            {
                report.skipped_ids.push(id.clone());
                report.warn(
                    "NAME_COLLISION",
                    format!("{id} collides with {winner} on name `{}`", entry.name),
                );
                continue;
            }

            match self.install_entity(request, &root, entry, &mut report) {
                Ok(entity) => {
                    installed_names.push((entity.name.clone(), entity.composite_id.clone()));
                    state.upsert_entity(entity);
                    report.applied_ids.push(id.clone());
                }
                Err(err) => {
                    report.errors.push(format!("{id}: {err}"));
                }
            }
        }

        state.push_history(
            request.operation.as_str(),
            report.applied_ids.clone(),
            report.removed_ids.clone(),
            report.warnings.len(),
        );
        if let Err(err) = StateStore::save(&root, &mut state) {
            report.errors.push(format!("persist state: {err}"));
        }

        info!(
            target = %report.target,
            applied = report.applied_ids.len(),
            removed = report.removed_ids.len(),
            skipped = report.skipped_ids.len(),
            "target processed"
        );
        report
    }

    fn load_state(&self, target: &Target, root: &Path) -> Result<InstallState> {
        Ok(StateStore::load(root)?.unwrap_or_else(|| {
            InstallState::new(
                target.label(),
                target.scope.as_str().to_string(),
                target.project_path.clone(),
            )
        }))
    }

    /// Create the install root chain idempotently, recording directories we
    /// actually created as baseline paths.
    fn materialize_baseline(&self, root: &Path, state: &mut InstallState) -> Result<()> {
        let created = !root.exists();
        ensure_dir(root)?;
        if created && !state.managed_baseline_paths.contains(&root.to_path_buf()) {
            state.managed_baseline_paths.push(root.to_path_buf());
        }
        Ok(())
    }

    /// Verify, materialize, and record one entity.
    fn install_entity(
        &self,
        request: &ExecRequest,
        root: &Path,
        entry: &CatalogEntry,
        report: &mut TargetReport,
    ) -> Result<ManagedEntity> {
        validate_destination_component(&entry.name)?;
        let dest = root.join(&entry.name);
        contain(&dest, root)?;

        if !entry.source_path.is_dir() {
            return Err(PackError::EntryNotFound(format!(
                "bundle content missing at {}",
                entry.source_path.display()
            )));
        }

        // Source bundle bytes must match the catalog-declared digest before
        // anything reaches the target.
        let computed = digest_dir(&entry.source_path)?;
        let expected = match &entry.content_digest {
            Some(declared) => {
                if *declared != computed {
                    return Err(PackError::Integrity(format!(
                        "declared {declared} but source tree is {computed}"
                    )));
                }
                declared.clone()
            }
            None => {
                report.warn(
                    "DIGEST_TRUSTED_LOCAL",
                    format!(
                        "{} declares no digest; trusting locally computed {computed}",
                        entry.composite_id
                    ),
                );
                computed
            }
        };

        if dest.exists() || dest.is_symlink() {
            contain(&dest, root)?;
            remove_path(&dest)?;
        }

        let mut effective = request.mode;
        match request.mode {
            InstallMode::Symlink => {
                if let Err(err) = make_symlink(&entry.source_path, &dest) {
                    report.warn(
                        "SYMLINK_FALLBACK",
                        format!("{}: symlink failed ({err}), copying instead", entry.composite_id),
                    );
                    effective = InstallMode::Copy;
                    copy_dir_recursive(&entry.source_path, &dest)?;
                }
            }
            InstallMode::Copy => {
                copy_dir_recursive(&entry.source_path, &dest)?;
            }
        }

        // Copies are re-verified after the write; a symlink points at the
        // already-verified source tree.
        if effective == InstallMode::Copy {
            let installed = digest_dir(&dest)?;
            if installed != expected {
                remove_path(&dest)?;
                return Err(PackError::Integrity(format!(
                    "installed tree is {installed}, expected {expected}"
                )));
            }
        }

        Ok(ManagedEntity {
            name: entry.name.clone(),
            composite_id: entry.composite_id.clone(),
            source_id: entry.source_id.clone(),
            source_url: entry.source_url.clone(),
            source_revision: self
                .catalog
                .sources
                .iter()
                .find(|s| s.id == entry.source_id)
                .and_then(|s| s.revision.clone()),
            source_content_digest: Some(expected),
            orphaned: false,
            install_mode: request.mode,
            effective_mode: effective,
            destination_path: dest,
            source_path: entry.source_path.clone(),
        })
    }

    /// Delete one recorded entity after containment re-validation.
    fn remove_entity(&self, state: &mut InstallState, root: &Path, id: &str) -> Result<()> {
        let Some(entity) = state.entity(id).cloned() else {
            return Ok(());
        };
        contain(&entity.destination_path, root)?;
        if entity.destination_path.exists() || entity.destination_path.is_symlink() {
            remove_path(&entity.destination_path)?;
        }
        state.remove_entity(id);
        Ok(())
    }

    // -----------------------------------------------------------------
    // uninstall
    // -----------------------------------------------------------------

    fn uninstall_target(&self, request: &ExecRequest, target: &Target) -> TargetReport {
        let mut report = TargetReport::new(target);
        let root = match target.install_root(request.kind) {
            Ok(root) => root,
            Err(err) => {
                report.errors.push(err.to_string());
                return report;
            }
        };

        if request.force {
            // Force removes the entire install root, managed or not.
            let removed: Vec<String> = StateStore::load(&root)
                .ok()
                .flatten()
                .map(|state| state.managed_ids())
                .unwrap_or_default();
            if root.exists() {
                if let Err(err) = remove_path(&root) {
                    report.errors.push(format!("remove {}: {err}", root.display()));
                    return report;
                }
            }
            report.removed_ids = removed;
            return report;
        }

        let mut state = match StateStore::load(&root) {
            Ok(Some(state)) => state,
            Ok(None) => return report,
            Err(err) => {
                report.errors.push(err.to_string());
                return report;
            }
        };

        // No selection means every managed entity.
        let selected: Vec<String> = if request.selection.is_empty() {
            state.managed_ids()
        } else {
            let mut ids = Vec::new();
            for raw in &request.selection {
                match resolve_against_state(&state, raw) {
                    Some(id) => ids.push(id),
                    None => {
                        report.skipped_ids.push(raw.clone());
                        report.warn("UNKNOWN_ID", format!("{raw} is not managed here"));
                    }
                }
            }
            ids
        };

        for id in &selected {
            match self.remove_entity(&mut state, &root, id) {
                Ok(()) => report.removed_ids.push(id.clone()),
                Err(err) => report.errors.push(format!("{id}: {err}")),
            }
        }

        if state.managed_entities.is_empty() {
            if let Err(err) = StateStore::delete(&root) {
                report.errors.push(format!("delete state: {err}"));
            }
        } else {
            state.push_history(
                request.operation.as_str(),
                Vec::new(),
                report.removed_ids.clone(),
                report.warnings.len(),
            );
            if let Err(err) = StateStore::save(&root, &mut state) {
                report.errors.push(format!("persist state: {err}"));
            }
        }

        report
    }
}

/// Uninstall selections resolve against recorded state, not the catalog:
/// an orphaned entity must stay removable.
fn resolve_against_state(state: &InstallState, raw: &str) -> Option<String> {
    if let Some(entity) = state.entity(raw) {
        return Some(entity.composite_id.clone());
    }
    let matches: Vec<&ManagedEntity> = state
        .managed_entities
        .iter()
        .filter(|e| e.name == raw)
        .collect();
    if matches.len() == 1 {
        return Some(matches[0].composite_id.clone());
    }
    None
}

fn make_symlink(source: &Path, dest: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(source, dest)
    }
    #[cfg(not(unix))]
    {
        let _ = (source, dest);
        Err(std::io::Error::other("symlinks unsupported on this platform"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_qualified_and_bare_selections() {
        assert_eq!(
            Selection::parse("acme/developer"),
            Selection::Qualified {
                source: "acme".into(),
                name: "developer".into()
            }
        );
        assert_eq!(
            Selection::parse("developer"),
            Selection::Bare {
                name: "developer".into()
            }
        );
        // Degenerate separators fall back to bare.
        assert_eq!(
            Selection::parse("/developer"),
            Selection::Bare {
                name: "/developer".into()
            }
        );
    }
}
