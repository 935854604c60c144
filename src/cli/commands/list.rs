//! agentpack list - list catalog entries

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::bundle::BundleKind;
use crate::cli::output::{emit_robot, robot_ok};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Bundle kind to list
    #[arg(long, value_enum, default_value = "skill")]
    pub kind: BundleKind,

    /// Force a fresh sync before listing
    #[arg(long)]
    pub refresh: bool,

    /// Filter by category
    #[arg(long)]
    pub category: Option<String>,
}

pub fn run(ctx: &AppContext, args: &ListArgs) -> Result<()> {
    let catalog = ctx.catalog_builder(args.kind)?.build(args.refresh)?;

    let entries: Vec<_> = catalog
        .entries
        .iter()
        .filter(|entry| {
            args.category
                .as_ref()
                .is_none_or(|category| entry.category == *category)
        })
        .collect();

    if ctx.robot_mode {
        emit_robot(&robot_ok(serde_json::json!({
            "catalogSource": catalog.catalog_source,
            "stale": catalog.stale,
            "cacheAgeSeconds": catalog.cache_age_seconds,
            "entries": entries,
        })))?;
        return Ok(());
    }

    if catalog.stale {
        println!(
            "{} catalog is stale ({})",
            "warning:".yellow(),
            catalog.stale_reason.as_deref().unwrap_or("unknown reason")
        );
    }
    for entry in entries {
        println!(
            "{:<40} {:<12} {}",
            entry.composite_id.bold(),
            entry.category,
            entry.description
        );
    }
    Ok(())
}
