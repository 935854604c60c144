//! agentpack doctor - health checks and repairs

use clap::Args;
use colored::Colorize;
use serde::Serialize;

use crate::app::AppContext;
use crate::bundle::BundleKind;
use crate::cli::output::{emit_robot, robot_ok};
use crate::error::Result;
use crate::utils::fs::ensure_dir;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Attempt to fix issues automatically
    #[arg(long)]
    pub fix: bool,
}

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    ok: bool,
    detail: String,
}

pub fn run(ctx: &AppContext, args: &DoctorArgs) -> Result<()> {
    let mut checks = Vec::new();

    checks.push(match which::which("git") {
        Ok(path) => Check {
            name: "git",
            ok: true,
            detail: path.display().to_string(),
        },
        Err(err) => Check {
            name: "git",
            ok: false,
            detail: err.to_string(),
        },
    });

    let data_ok = ctx.data_dir.is_dir();
    if !data_ok && args.fix {
        ensure_dir(&ctx.data_dir)?;
    }
    checks.push(Check {
        name: "data directory",
        ok: data_ok || args.fix,
        detail: ctx.data_dir.display().to_string(),
    });

    for kind in [BundleKind::Skill, BundleKind::Hook] {
        let registry = ctx.registry(kind);
        checks.push(match registry.load() {
            Ok(sources) => Check {
                name: match kind {
                    BundleKind::Skill => "skill sources",
                    BundleKind::Hook => "hook sources",
                },
                ok: true,
                detail: format!("{} configured", sources.len()),
            },
            Err(err) => Check {
                name: match kind {
                    BundleKind::Skill => "skill sources",
                    BundleKind::Hook => "hook sources",
                },
                ok: false,
                detail: err.to_string(),
            },
        });
    }

    // Probe the credential chain end to end with a throwaway entry.
    let probe = ctx
        .credentials
        .store("agentpack-doctor-probe", "probe")
        .and_then(|()| {
            ctx.credentials.delete("agentpack-doctor-probe")
        });
    checks.push(match probe {
        Ok(()) => Check {
            name: "credential store",
            ok: true,
            detail: "store/delete round trip".to_string(),
        },
        Err(err) => Check {
            name: "credential store",
            ok: false,
            detail: err.to_string(),
        },
    });

    if ctx.robot_mode {
        emit_robot(&robot_ok(&checks))?;
        return Ok(());
    }
    for check in &checks {
        let status = if check.ok {
            "ok".green()
        } else {
            "fail".red()
        };
        println!("{status:>6}  {:<18} {}", check.name, check.detail);
    }
    Ok(())
}
