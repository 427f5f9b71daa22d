use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{
    cache::CacheCommand, check::CheckCommand, list::ListCommand, open::OpenCommand,
    track::TrackCommand, track::UntrackCommand, update::UpdateAllCommand,
    update::UpdateCommand,
};

#[derive(Parser)]
#[command(name = "ghstore")]
#[command(about = "Install and update apps from their GitHub releases")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global_args: GlobalArgs,
}

#[derive(clap::Args, Clone)]
pub struct GlobalArgs {
    /// Use a different location for ghstore's data, where the app list and downloads are kept (useful for testing)
    #[arg(long, global = true)]
    pub datadir: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List tracked apps
    #[command(alias = "ls")]
    List(ListCommand),

    /// Start tracking an app's GitHub releases
    #[command(alias = "add")]
    Track(TrackCommand),

    /// Stop tracking an app
    #[command(alias = "remove")]
    Untrack(UntrackCommand),

    /// Check every tracked app for a newer release
    #[command(alias = "fetch")]
    Check(CheckCommand),

    /// Download and install the latest release of one app
    Update(UpdateCommand),

    /// Update every app with a newer release, one at a time
    UpdateAll(UpdateAllCommand),

    /// Launch an app, or show its repository
    Open(OpenCommand),

    /// Manage downloaded release assets
    Cache(CacheCommand),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::List(cmd) => cmd.run(self.global_args).await,
            Commands::Track(cmd) => cmd.run(self.global_args).await,
            Commands::Untrack(cmd) => cmd.run(self.global_args).await,
            Commands::Check(cmd) => cmd.run(self.global_args).await,
            Commands::Update(cmd) => cmd.run(self.global_args).await,
            Commands::UpdateAll(cmd) => cmd.run(self.global_args).await,
            Commands::Open(cmd) => cmd.run(self.global_args).await,
            Commands::Cache(cmd) => cmd.run(self.global_args).await,
        }
    }
}
