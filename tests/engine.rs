//! End-to-end engine tests: plan, install, verify, uninstall against real
//! temp directories, with a fabricated catalog standing in for synced
//! sources.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use tempfile::TempDir;

use agentpack::bundle::BundleKind;
use agentpack::catalog::digest::digest_dir;
use agentpack::catalog::{Catalog, CatalogEntry, CatalogProvenance, CATALOG_VERSION};
use agentpack::executor::{ExecRequest, Executor, Operation, Selection};
use agentpack::sources::{Source, Transport};
use agentpack::state::{InstallMode, StateStore};
use agentpack::targets::{Agent, Scope, Target};

struct Fixture {
    root: TempDir,
    catalog: Catalog,
    project: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dirs = TempDir::new().unwrap();
        let project = dirs.path().join("project");
        fs::create_dir_all(&project).unwrap();
        Self {
            catalog: Catalog {
                generated_at: Utc::now(),
                source: "test".to_string(),
                version: CATALOG_VERSION,
                sources: Vec::new(),
                entries: Vec::new(),
                stale: false,
                catalog_source: CatalogProvenance::Live,
                stale_reason: None,
                cache_age_seconds: None,
            },
            project,
            root: dirs,
        }
    }

    fn add_source(&mut self, id: &str, official: bool) {
        self.catalog.sources.push(Source {
            id: id.to_string(),
            name: id.to_string(),
            repo_url: format!("https://example.com/{id}.git"),
            transport: Transport::Https,
            official,
            enabled: true,
            root_path: "/skills".to_string(),
            removable: true,
            last_sync_at: None,
            last_error: None,
            local_repo_path: None,
            local_extracted_path: None,
            revision: Some("deadbeef".to_string()),
        });
    }

    /// Create bundle content on disk and a catalog entry pointing at it.
    fn add_bundle(&mut self, source_id: &str, name: &str, body: &str) -> PathBuf {
        let dir = self
            .root
            .path()
            .join("extracted")
            .join(source_id)
            .join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {name}\ndescription: {body}\n---\n# {name}\n{body}\n"),
        )
        .unwrap();
        let digest = digest_dir(&dir).unwrap();
        self.catalog.entries.push(CatalogEntry {
            composite_id: format!("{source_id}/{name}"),
            source_id: source_id.to_string(),
            source_name: source_id.to_string(),
            source_url: format!("https://example.com/{source_id}.git"),
            name: name.to_string(),
            description: body.to_string(),
            category: "test".to_string(),
            resources: Vec::new(),
            source_path: dir.clone(),
            content_digest: Some(digest),
            version: None,
            updated_at: Utc::now(),
        });
        dir
    }

    fn target(&self) -> Target {
        Target {
            agent: Agent::Claude,
            scope: Scope::Project,
            project_path: Some(self.project.clone()),
        }
    }

    fn install_root(&self) -> PathBuf {
        self.target().install_root(BundleKind::Skill).unwrap()
    }

    fn request(&self, operation: Operation, selection: &[&str]) -> ExecRequest {
        ExecRequest {
            operation,
            kind: BundleKind::Skill,
            targets: vec![self.target()],
            mode: InstallMode::Copy,
            selection: selection.iter().map(ToString::to_string).collect(),
            remove_unselected: matches!(operation, Operation::Sync),
            force: false,
        }
    }
}

#[test]
fn install_is_idempotent() {
    let mut fx = Fixture::new();
    fx.add_source("official", true);
    fx.add_bundle("official", "developer", "dev workflow");

    let request = fx.request(Operation::Install, &["official/developer"]);
    let executor = Executor::new(&fx.catalog);

    let first = executor.execute(&request);
    assert!(first.ok(), "{:?}", first.targets[0].errors);
    assert_eq!(first.targets[0].applied_ids, vec!["official/developer"]);

    let dest = fx.install_root().join("developer");
    let digest_after_first = digest_dir(&dest).unwrap();

    let second = executor.execute(&request);
    assert!(second.ok());
    assert!(second.targets[0].applied_ids.is_empty());
    assert_eq!(second.targets[0].skipped_ids, vec!["official/developer"]);
    assert_eq!(digest_dir(&dest).unwrap(), digest_after_first);
}

#[test]
fn install_then_uninstall_round_trips() {
    let mut fx = Fixture::new();
    fx.add_source("official", true);
    fx.add_bundle("official", "developer", "dev");
    fx.add_bundle("official", "reviewer", "review");

    let executor = Executor::new(&fx.catalog);
    let report = executor.execute(&fx.request(
        Operation::Install,
        &["official/developer", "official/reviewer"],
    ));
    assert!(report.ok());

    // Unmanaged content a user dropped into the root must survive.
    let root = fx.install_root();
    fs::write(root.join("user-notes.md"), "mine").unwrap();

    let report = executor.execute(&fx.request(Operation::Uninstall, &["official/developer"]));
    assert!(report.ok());
    assert_eq!(report.targets[0].removed_ids, vec!["official/developer"]);
    assert!(!root.join("developer").exists());
    assert!(root.join("reviewer").exists());
    assert!(root.join("user-notes.md").exists());

    let state = StateStore::load(&root).unwrap().unwrap();
    assert_eq!(state.managed_entities.len(), 1);
    assert_eq!(state.managed_entities[0].name, "reviewer");
}

#[test]
fn sync_with_empty_selection_removes_everything() {
    let mut fx = Fixture::new();
    fx.add_source("official", true);
    fx.add_bundle("official", "a", "a");
    fx.add_bundle("official", "b", "b");
    fx.add_bundle("official", "c", "c");

    let executor = Executor::new(&fx.catalog);
    let report = executor.execute(&fx.request(
        Operation::Install,
        &["official/a", "official/b", "official/c"],
    ));
    assert!(report.ok());

    let report = executor.execute(&fx.request(Operation::Sync, &[]));
    assert!(report.ok());
    assert_eq!(report.targets[0].removed_ids.len(), 3);

    let root = fx.install_root();
    assert!(!root.join("a").exists());
    assert!(!root.join("b").exists());
    assert!(!root.join("c").exists());

    let state = StateStore::load(&root).unwrap();
    assert!(state.map_or(true, |s| s.managed_entities.is_empty()));
}

#[test]
fn integrity_failure_is_scoped_to_one_entity() {
    let mut fx = Fixture::new();
    fx.add_source("official", true);
    fx.add_bundle("official", "good", "fine");
    let tampered = fx.add_bundle("official", "bad", "will drift");
    // Mutate the source tree after its digest was declared.
    fs::write(tampered.join("SKILL.md"), "tampered bytes").unwrap();

    let executor = Executor::new(&fx.catalog);
    let report =
        executor.execute(&fx.request(Operation::Install, &["official/good", "official/bad"]));

    let target = &report.targets[0];
    assert_eq!(target.applied_ids, vec!["official/good"]);
    assert_eq!(target.errors.len(), 1);
    assert!(target.errors[0].contains("official/bad"));
    assert!(fx.install_root().join("good").exists());
    assert!(!fx.install_root().join("bad").exists());
}

#[test]
fn missing_declared_digest_installs_with_warning() {
    let mut fx = Fixture::new();
    fx.add_source("official", true);
    fx.add_bundle("official", "undeclared", "no digest");
    fx.catalog.entries[0].content_digest = None;

    let executor = Executor::new(&fx.catalog);
    let report = executor.execute(&fx.request(Operation::Install, &["official/undeclared"]));

    let target = &report.targets[0];
    assert!(target.ok());
    assert_eq!(target.applied_ids.len(), 1);
    assert!(target
        .warnings
        .iter()
        .any(|w| w.code == "DIGEST_TRUSTED_LOCAL"));

    // The computed digest became the recorded baseline.
    let state = StateStore::load(&fx.install_root()).unwrap().unwrap();
    assert!(state.managed_entities[0].source_content_digest.is_some());
}

#[test]
fn bare_name_resolution_follows_official_sources() {
    let mut fx = Fixture::new();
    fx.add_source("alpha", false);
    fx.add_source("beta", false);
    fx.add_bundle("alpha", "developer", "from alpha");
    fx.add_bundle("beta", "developer", "from beta");

    // Two non-official publishers: bare name is ambiguous.
    let err = Selection::parse("developer")
        .resolve(&fx.catalog)
        .unwrap_err();
    assert!(err.to_string().contains("<source>/developer"));

    // An official source disambiguates.
    let mut fx = Fixture::new();
    fx.add_source("official", true);
    fx.add_source("beta", false);
    fx.add_bundle("official", "developer", "official dev");
    fx.add_bundle("beta", "developer", "community dev");
    let resolved = Selection::parse("developer").resolve(&fx.catalog).unwrap();
    assert_eq!(resolved, "official/developer");
}

#[test]
fn same_run_name_collision_is_skipped_not_overwritten() {
    let mut fx = Fixture::new();
    fx.add_source("alpha", false);
    fx.add_source("beta", false);
    fx.add_bundle("alpha", "developer", "from alpha");
    fx.add_bundle("beta", "developer", "from beta");

    let executor = Executor::new(&fx.catalog);
    let report = executor.execute(&fx.request(
        Operation::Install,
        &["alpha/developer", "beta/developer"],
    ));

    let target = &report.targets[0];
    assert_eq!(target.applied_ids.len(), 1);
    assert_eq!(target.skipped_ids.len(), 1);
    assert!(target.warnings.iter().any(|w| w.code == "NAME_COLLISION"));
    // Exactly one content won; nothing was silently overwritten.
    let state = StateStore::load(&fx.install_root()).unwrap().unwrap();
    assert_eq!(state.managed_entities.len(), 1);
}

#[test]
fn unknown_qualified_id_is_skipped_with_warning() {
    let mut fx = Fixture::new();
    fx.add_source("official", true);
    fx.add_bundle("official", "developer", "dev");

    let executor = Executor::new(&fx.catalog);
    let report = executor.execute(&fx.request(
        Operation::Install,
        &["official/developer", "official/ghost"],
    ));

    let target = &report.targets[0];
    assert!(target.ok(), "{:?}", target.errors);
    assert_eq!(target.applied_ids, vec!["official/developer"]);
    assert!(target.skipped_ids.contains(&"official/ghost".to_string()));
    assert!(target.warnings.iter().any(|w| w.code == "UNKNOWN_ID"));
}

#[test]
fn tampered_state_cannot_delete_outside_root() {
    let mut fx = Fixture::new();
    fx.add_source("official", true);
    fx.add_bundle("official", "developer", "dev");

    let executor = Executor::new(&fx.catalog);
    let report = executor.execute(&fx.request(Operation::Install, &["official/developer"]));
    assert!(report.ok());

    // A victim file outside the install root.
    let victim = fx.project.join("precious.txt");
    fs::write(&victim, "do not delete").unwrap();

    // Tamper with the recorded destination path.
    let root = fx.install_root();
    let state_path = StateStore::path(&root);
    let raw = fs::read_to_string(&state_path).unwrap();
    let tampered = raw.replace(
        &root.join("developer").display().to_string(),
        &victim.display().to_string(),
    );
    assert_ne!(raw, tampered, "state file should embed the destination path");
    fs::write(&state_path, tampered).unwrap();

    let report = executor.execute(&fx.request(Operation::Sync, &[]));
    let target = &report.targets[0];
    assert!(!target.ok());
    assert!(target.errors[0].contains("outside install root"));
    assert!(victim.exists());
}

#[test]
fn force_uninstall_removes_the_entire_root() {
    let mut fx = Fixture::new();
    fx.add_source("official", true);
    fx.add_bundle("official", "developer", "dev");

    let executor = Executor::new(&fx.catalog);
    executor.execute(&fx.request(Operation::Install, &["official/developer"]));
    let root = fx.install_root();
    fs::write(root.join("unmanaged.txt"), "extra").unwrap();

    let mut request = fx.request(Operation::Uninstall, &[]);
    request.force = true;
    let report = executor.execute(&request);
    assert!(report.ok());
    assert!(!root.exists());
}

#[cfg(unix)]
#[test]
fn symlink_mode_links_and_uninstall_unlinks() {
    let mut fx = Fixture::new();
    fx.add_source("official", true);
    let source_dir = fx.add_bundle("official", "developer", "dev");

    let mut request = fx.request(Operation::Install, &["official/developer"]);
    request.mode = InstallMode::Symlink;
    let executor = Executor::new(&fx.catalog);
    let report = executor.execute(&request);
    assert!(report.ok());

    let dest = fx.install_root().join("developer");
    assert!(dest.is_symlink());
    assert_eq!(fs::read_link(&dest).unwrap(), source_dir);

    let report = executor.execute(&fx.request(Operation::Uninstall, &["official/developer"]));
    assert!(report.ok());
    assert!(!dest.exists() && !dest.is_symlink());
    // The linked-to source tree is untouched.
    assert!(source_dir.join("SKILL.md").exists());
}

#[test]
fn reinstall_in_place_replaces_prior_copy() {
    let mut fx = Fixture::new();
    fx.add_source("official", true);
    let source_dir = fx.add_bundle("official", "developer", "v1");

    let executor = Executor::new(&fx.catalog);
    assert!(executor
        .execute(&fx.request(Operation::Install, &["official/developer"]))
        .ok());

    // Upstream content changes; the catalog entry is rebuilt with a new
    // digest, and the managed id must be reinstalled by a sync that drops
    // and re-adds it.
    fs::write(source_dir.join("SKILL.md"), "---\nname: developer\n---\nv2").unwrap();
    fx.catalog.entries[0].content_digest = Some(digest_dir(&source_dir).unwrap());

    let root = fx.install_root();
    let executor = Executor::new(&fx.catalog);
    let report = executor.execute(&fx.request(Operation::Sync, &[]));
    assert!(report.ok());
    let report = executor.execute(&fx.request(Operation::Install, &["official/developer"]));
    assert!(report.ok(), "{:?}", report.targets[0].errors);
    let installed = fs::read_to_string(root.join("developer/SKILL.md")).unwrap();
    assert!(installed.contains("v2"));
}

#[test]
fn per_target_failures_do_not_abort_other_targets(){
    let mut fx = Fixture::new();
    fx.add_source("official", true);
    fx.add_bundle("official", "developer", "dev");

    // First target is broken (project scope without a path), second is fine.
    let broken = Target {
        agent: Agent::Codex,
        scope: Scope::Project,
        project_path: None,
    };
    let request = ExecRequest {
        operation: Operation::Install,
        kind: BundleKind::Skill,
        targets: vec![broken, fx.target()],
        mode: InstallMode::Copy,
        selection: vec!["official/developer".to_string()],
        remove_unselected: false,
        force: false,
    };
    let report = Executor::new(&fx.catalog).execute(&request);
    assert_eq!(report.targets.len(), 2);
    assert!(!report.targets[0].ok());
    assert!(report.targets[1].ok());
    assert_eq!(report.targets[1].applied_ids.len(), 1);
}
