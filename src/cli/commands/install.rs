//! agentpack install - install selected bundles into targets

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::bundle::BundleKind;
use crate::cli::output::{emit_robot, robot_ok, robot_partial};
use crate::error::Result;
use crate::executor::{ExecReport, ExecRequest, Executor, Operation, Selection};
use crate::planner;
use crate::state::{InstallMode, StateStore};
use crate::targets::{Agent, Scope, Target};

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Bundles to install (`name` or `source/name`)
    #[arg(required = true)]
    pub selection: Vec<String>,

    #[command(flatten)]
    pub common: TargetOpts,

    /// Plan only; do not touch the filesystem
    #[arg(long)]
    pub dry_run: bool,
}

/// Target options shared by install/sync/uninstall.
#[derive(Args, Debug)]
pub struct TargetOpts {
    /// Agents to install into (repeatable)
    #[arg(long = "agent", value_enum, default_values = ["claude"])]
    pub agents: Vec<Agent>,

    /// Install scope
    #[arg(long, value_enum, default_value = "user")]
    pub scope: Scope,

    /// Project root (required for project scope)
    #[arg(long)]
    pub project: Option<PathBuf>,

    /// Install mode
    #[arg(long, value_enum)]
    pub mode: Option<InstallMode>,

    /// Bundle kind
    #[arg(long, value_enum, default_value = "skill")]
    pub kind: BundleKind,
}

impl TargetOpts {
    pub fn targets(&self) -> Vec<Target> {
        self.agents
            .iter()
            .map(|agent| Target {
                agent: *agent,
                scope: self.scope,
                project_path: self.project.clone(),
            })
            .collect()
    }
}

pub fn run(ctx: &AppContext, args: &InstallArgs) -> Result<()> {
    let request = ExecRequest {
        operation: Operation::Install,
        kind: args.common.kind,
        targets: args.common.targets(),
        mode: args
            .common
            .mode
            .unwrap_or(ctx.config.install.default_mode),
        selection: args.selection.clone(),
        remove_unselected: false,
        force: false,
    };
    if args.dry_run {
        return dry_run(ctx, &request);
    }
    execute_and_report(ctx, &request)
}

/// Run a request and print the per-target reports.
pub fn execute_and_report(ctx: &AppContext, request: &ExecRequest) -> Result<()> {
    let catalog = ctx.catalog_builder(request.kind)?.build(false)?;
    let report = Executor::new(&catalog).execute(request);
    emit_report(ctx, &report)
}

pub fn emit_report(ctx: &AppContext, report: &ExecReport) -> Result<()> {
    if ctx.robot_mode {
        let failed = report.targets.iter().filter(|t| !t.ok()).count();
        if failed == 0 {
            emit_robot(&robot_ok(report))?;
        } else {
            emit_robot(&robot_partial(
                report,
                report.targets.len() - failed,
                failed,
            ))?;
        }
        return Ok(());
    }

    for target in &report.targets {
        println!("{}", target.target.bold());
        for id in &target.applied_ids {
            println!("  {} {id}", "installed".green());
        }
        for id in &target.removed_ids {
            println!("  {} {id}", "removed".yellow());
        }
        for id in &target.skipped_ids {
            println!("  {} {id}", "skipped".dimmed());
        }
        for warning in &target.warnings {
            println!("  {} [{}] {}", "warning".yellow(), warning.code, warning.message);
        }
        for error in &target.errors {
            println!("  {} {error}", "error".red());
        }
    }
    Ok(())
}

/// Print the planned delta without executing it.
fn dry_run(ctx: &AppContext, request: &ExecRequest) -> Result<()> {
    let catalog = ctx.catalog_builder(request.kind)?.build(false)?;
    let mut desired = Vec::new();
    for raw in &request.selection {
        desired.push(Selection::parse(raw).resolve(&catalog)?);
    }

    let mut plans = Vec::new();
    for target in &request.targets {
        let root = target.install_root(request.kind)?;
        let managed = StateStore::load(&root)?
            .map(|state| state.managed_ids())
            .unwrap_or_default();
        let plan = planner::delta(&desired, &managed, request.remove_unselected);
        plans.push((target.label(), plan));
    }

    if ctx.robot_mode {
        let data: Vec<_> = plans
            .iter()
            .map(|(label, plan)| {
                serde_json::json!({
                    "target": label,
                    "toInstall": plan.to_install.clone(),
                    "toRemove": plan.to_remove.clone(),
                    "alreadyInstalled": plan.already_installed.clone(),
                })
            })
            .collect();
        emit_robot(&robot_ok(data))?;
        return Ok(());
    }

    for (label, plan) in plans {
        println!("{}", label.bold());
        for id in &plan.to_install {
            println!("  {} {id}", "would install".green());
        }
        for id in &plan.to_remove {
            println!("  {} {id}", "would remove".yellow());
        }
        for id in &plan.already_installed {
            println!("  {} {id}", "unchanged".dimmed());
        }
    }
    Ok(())
}
