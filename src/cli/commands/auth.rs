//! agentpack auth - manage source credentials

use std::io::{BufRead, IsTerminal, Write};

use clap::{Args, Subcommand};
use colored::Colorize;

use crate::app::AppContext;
use crate::bundle::BundleKind;
use crate::cli::output::{emit_robot, robot_ok};
use crate::error::{PackError, Result};

#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Store a bearer token for a source
    Set {
        /// Source id
        source_id: String,
        /// Token value; read from stdin when omitted
        #[arg(long)]
        token: Option<String>,
    },
    /// Remove a stored token
    Remove {
        /// Source id
        source_id: String,
    },
}

pub fn run(ctx: &AppContext, args: &AuthArgs) -> Result<()> {
    match &args.command {
        AuthCommand::Set { source_id, token } => {
            // The id must exist in at least one registry before a secret is
            // accepted for it.
            let known = [BundleKind::Skill, BundleKind::Hook]
                .iter()
                .any(|kind| ctx.registry(*kind).get(source_id).is_ok());
            if !known {
                return Err(PackError::SourceNotFound(source_id.clone()));
            }

            let token = match token {
                Some(token) => token.clone(),
                None => prompt_token(source_id)?,
            };
            if token.is_empty() {
                return Err(PackError::Validation("empty token".to_string()));
            }
            ctx.credentials.store(source_id, &token)?;
            if ctx.robot_mode {
                emit_robot(&robot_ok(serde_json::json!({ "stored": source_id })))?;
            } else {
                println!("{} credential for {source_id}", "stored".green());
            }
        }
        AuthCommand::Remove { source_id } => {
            ctx.credentials.delete(source_id)?;
            if ctx.robot_mode {
                emit_robot(&robot_ok(serde_json::json!({ "removed": source_id })))?;
            } else {
                println!("{} credential for {source_id}", "removed".green());
            }
        }
    }
    Ok(())
}

fn prompt_token(source_id: &str) -> Result<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        print!("token for {source_id}: ");
        std::io::stdout().flush()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
