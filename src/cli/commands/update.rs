//! agentpack update - synchronize sources and rebuild catalogs

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::bundle::BundleKind;
use crate::catalog::CatalogProvenance;
use crate::cli::output::{emit_robot, robot_ok};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Only update one bundle kind
    #[arg(long, value_enum)]
    pub kind: Option<BundleKind>,
}

pub fn run(ctx: &AppContext, args: &UpdateArgs) -> Result<()> {
    let kinds: Vec<BundleKind> = match args.kind {
        Some(kind) => vec![kind],
        None => vec![BundleKind::Skill, BundleKind::Hook],
    };

    let mut summaries = Vec::new();
    for kind in kinds {
        let catalog = ctx.catalog_builder(kind)?.build(true)?;
        if ctx.robot_mode {
            summaries.push(serde_json::json!({
                "kind": kind.dir_name(),
                "entries": catalog.entries.len(),
                "sources": catalog.sources.len(),
                "catalogSource": catalog.catalog_source,
                "stale": catalog.stale,
            }));
        } else {
            let provenance = match catalog.catalog_source {
                CatalogProvenance::Live => "live".green(),
                CatalogProvenance::Cache => "cache".yellow(),
                CatalogProvenance::Snapshot => "snapshot".red(),
            };
            println!(
                "{kind}: {} entries from {} sources ({provenance})",
                catalog.entries.len(),
                catalog.sources.iter().filter(|s| s.enabled).count(),
            );
            if let Some(reason) = &catalog.stale_reason {
                println!("  {} {reason}", "stale:".yellow());
            }
            for source in catalog.sources.iter().filter(|s| s.last_error.is_some()) {
                println!(
                    "  {} {}: {}",
                    "failed".red(),
                    source.id,
                    source.last_error.as_deref().unwrap_or_default()
                );
            }
        }
    }

    if ctx.robot_mode {
        emit_robot(&robot_ok(summaries))?;
    }
    Ok(())
}
