//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - run() function to execute the command

use clap::Subcommand;

pub mod auth;
pub mod doctor;
pub mod install;
pub mod list;
pub mod show;
pub mod source;
pub mod sync;
pub mod uninstall;
pub mod update;

use crate::app::AppContext;
use crate::error::Result;

pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Source(args) => source::run(ctx, args),
        Commands::Update(args) => update::run(ctx, args),
        Commands::List(args) => list::run(ctx, args),
        Commands::Show(args) => show::run(ctx, args),
        Commands::Install(args) => install::run(ctx, args),
        Commands::Sync(args) => sync::run(ctx, args),
        Commands::Uninstall(args) => uninstall::run(ctx, args),
        Commands::Auth(args) => auth::run(ctx, args),
        Commands::Doctor(args) => doctor::run(ctx, args),
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage bundle sources
    Source(source::SourceArgs),

    /// Synchronize sources and rebuild the catalog
    Update(update::UpdateArgs),

    /// List catalog entries
    List(list::ListArgs),

    /// Show one catalog entry
    Show(show::ShowArgs),

    /// Install selected bundles into targets (additive)
    Install(install::InstallArgs),

    /// Make targets match the selection exactly
    Sync(sync::SyncArgs),

    /// Remove managed bundles from targets
    Uninstall(uninstall::UninstallArgs),

    /// Manage source credentials
    Auth(auth::AuthArgs),

    /// Health checks for the local installation
    Doctor(doctor::DoctorArgs),
}
