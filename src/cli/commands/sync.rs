//! agentpack sync - make targets match the selection exactly

use clap::Args;

use super::install::{execute_and_report, TargetOpts};
use crate::app::AppContext;
use crate::error::Result;
use crate::executor::{ExecRequest, Operation};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Desired bundle set; everything else managed is removed
    pub selection: Vec<String>,

    #[command(flatten)]
    pub common: TargetOpts,
}

pub fn run(ctx: &AppContext, args: &SyncArgs) -> Result<()> {
    let request = ExecRequest {
        operation: Operation::Sync,
        kind: args.common.kind,
        targets: args.common.targets(),
        mode: args
            .common
            .mode
            .unwrap_or(ctx.config.install.default_mode),
        selection: args.selection.clone(),
        remove_unselected: true,
        force: false,
    };
    execute_and_report(ctx, &request)
}
