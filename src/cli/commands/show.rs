//! agentpack show - show one catalog entry

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::bundle::BundleKind;
use crate::cli::output::{emit_robot, robot_ok};
use crate::error::Result;
use crate::executor::Selection;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Bundle selection (`name` or `source/name`)
    pub selection: String,

    /// Bundle kind
    #[arg(long, value_enum, default_value = "skill")]
    pub kind: BundleKind,
}

pub fn run(ctx: &AppContext, args: &ShowArgs) -> Result<()> {
    let catalog = ctx.catalog_builder(args.kind)?.build(false)?;
    let composite_id = Selection::parse(&args.selection).resolve(&catalog)?;
    let entry = catalog
        .get(&composite_id)
        .ok_or_else(|| crate::error::PackError::EntryNotFound(composite_id.clone()))?;

    if ctx.robot_mode {
        emit_robot(&robot_ok(entry))?;
        return Ok(());
    }

    println!("{}", entry.composite_id.bold());
    println!("  source:      {} ({})", entry.source_name, entry.source_url);
    println!("  description: {}", entry.description);
    if !entry.category.is_empty() {
        println!("  category:    {}", entry.category);
    }
    if let Some(version) = &entry.version {
        println!("  version:     {version}");
    }
    if let Some(digest) = &entry.content_digest {
        println!("  digest:      {digest}");
    }
    if !entry.resources.is_empty() {
        println!("  resources:   {}", entry.resources.join(", "));
    }
    Ok(())
}
