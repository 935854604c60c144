//! agentpack uninstall - remove managed bundles from targets

use clap::Args;

use super::install::{emit_report, TargetOpts};
use crate::app::AppContext;
use crate::error::Result;
use crate::executor::{ExecRequest, Executor, Operation};

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Bundles to remove; all managed bundles when omitted
    pub selection: Vec<String>,

    #[command(flatten)]
    pub common: TargetOpts,

    /// Delete the entire install root, managed or not
    #[arg(long)]
    pub force: bool,
}

pub fn run(ctx: &AppContext, args: &UninstallArgs) -> Result<()> {
    let request = ExecRequest {
        operation: Operation::Uninstall,
        kind: args.common.kind,
        targets: args.common.targets(),
        mode: args
            .common
            .mode
            .unwrap_or(ctx.config.install.default_mode),
        selection: args.selection.clone(),
        remove_unselected: false,
        force: args.force,
    };

    // Uninstall acts on recorded state; a cached or snapshot catalog is
    // sufficient, so no refresh is forced here.
    let catalog = ctx.catalog_builder(request.kind)?.build(false)?;
    let report = Executor::new(&catalog).execute(&request);
    emit_report(ctx, &report)
}
