//! agentpack source - manage bundle sources

use clap::{Args, Subcommand};
use colored::Colorize;

use crate::app::AppContext;
use crate::bundle::BundleKind;
use crate::cli::output::{emit_robot, robot_ok};
use crate::error::Result;
use crate::sources::{slugify, Source, Transport};

#[derive(Args, Debug)]
pub struct SourceArgs {
    #[command(subcommand)]
    pub command: SourceCommand,

    /// Bundle kind the source provides
    #[arg(long, value_enum, default_value = "skill", global = true)]
    pub kind: BundleKind,
}

#[derive(Subcommand, Debug)]
pub enum SourceCommand {
    /// Register a new source
    Add {
        /// Source id (slugified)
        id: String,
        /// Git repository URL
        url: String,
        /// Display name (defaults to the id)
        #[arg(long)]
        name: Option<String>,
        /// Subtree containing bundles, e.g. /skills
        #[arg(long)]
        root_path: Option<String>,
    },
    /// List configured sources
    List,
    /// Remove a source
    Remove { id: String },
    /// Enable a source
    Enable { id: String },
    /// Disable a source without removing it
    Disable { id: String },
}

pub fn run(ctx: &AppContext, args: &SourceArgs) -> Result<()> {
    let registry = ctx.registry(args.kind);
    match &args.command {
        SourceCommand::Add {
            id,
            url,
            name,
            root_path,
        } => {
            let source = registry.add(Source {
                id: slugify(id),
                name: name.clone().unwrap_or_else(|| id.clone()),
                repo_url: url.clone(),
                transport: Transport::infer(url),
                official: false,
                enabled: true,
                root_path: root_path
                    .clone()
                    .unwrap_or_else(|| args.kind.default_root_path().to_string()),
                removable: true,
                last_sync_at: None,
                last_error: None,
                local_repo_path: None,
                local_extracted_path: None,
                revision: None,
            })?;
            if ctx.robot_mode {
                emit_robot(&robot_ok(&source))?;
            } else {
                println!("{} source {}", "added".green(), source.id.bold());
            }
        }
        SourceCommand::List => {
            let sources = registry.load()?;
            if ctx.robot_mode {
                emit_robot(&robot_ok(&sources))?;
            } else {
                for source in &sources {
                    let flags = match (source.official, source.enabled) {
                        (true, true) => "official".cyan().to_string(),
                        (_, false) => "disabled".yellow().to_string(),
                        _ => String::new(),
                    };
                    println!(
                        "{:<20} {:<50} {}",
                        source.id.bold(),
                        source.repo_url,
                        flags
                    );
                    if let Some(err) = &source.last_error {
                        println!("  {} {err}", "last error:".red());
                    }
                }
            }
        }
        SourceCommand::Remove { id } => {
            registry.remove(id)?;
            if ctx.robot_mode {
                emit_robot(&robot_ok(serde_json::json!({ "removed": id })))?;
            } else {
                println!("{} source {id}", "removed".green());
            }
        }
        SourceCommand::Enable { id } => {
            let source = registry.update(id, |s| s.enabled = true)?;
            if ctx.robot_mode {
                emit_robot(&robot_ok(&source))?;
            } else {
                println!("{} source {id}", "enabled".green());
            }
        }
        SourceCommand::Disable { id } => {
            let source = registry.update(id, |s| s.enabled = false)?;
            if ctx.robot_mode {
                emit_robot(&robot_ok(&source))?;
            } else {
                println!("{} source {id}", "disabled".yellow());
            }
        }
    }
    Ok(())
}
