use crate::cli::GlobalArgs;
use crate::ui;
use anyhow::Result;
use clap::{Args, Subcommand};
use ghstore_lib::config::Config;
use indicatif::HumanBytes;
use std::fs;
use std::path::PathBuf;
use walkdir::WalkDir;

#[derive(Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub action: Option<CacheAction>,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show download cache size and location
    Info,
    /// Delete all downloaded release assets
    Clear,
}

impl CacheCommand {
    pub async fn run(self, global_args: GlobalArgs) -> Result<()> {
        let config = Config::setup(global_args.datadir.as_deref())?;

        match self.action {
            Some(CacheAction::Clear) => clear_cache(&config)?,
            Some(CacheAction::Info) | None => show_cache_info(&config)?,
        }

        Ok(())
    }
}

fn clear_cache(config: &Config) -> Result<()> {
    let files = cached_files(config);
    if files.is_empty() {
        ui::success("Cache is already empty");
        return Ok(());
    }

    let size: u64 = files.iter().map(|(_, size)| size).sum();
    ui::info(&format!("Clearing cache ({})...", HumanBytes(size)));
    for (path, _) in &files {
        fs::remove_file(path)?;
    }
    ui::success("Cache cleared successfully");
    Ok(())
}

fn show_cache_info(config: &Config) -> Result<()> {
    ui::info(&format!("Cache location: {}", config.downloads_dir.display()));

    let files = cached_files(config);
    if files.is_empty() {
        ui::info("Cache is empty");
        return Ok(());
    }

    let size: u64 = files.iter().map(|(_, size)| size).sum();
    ui::info(&format!("Cache size: {}", HumanBytes(size)));
    ui::info(&format!("Cached files: {}", files.len()));
    ui::tip("Run `ghstore cache clear` to free up space");
    Ok(())
}

/// Downloaded files with their sizes. Unreadable entries are skipped.
fn cached_files(config: &Config) -> Vec<(PathBuf, u64)> {
    WalkDir::new(&config.downloads_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let size = entry.metadata().ok()?.len();
            Some((entry.into_path(), size))
        })
        .collect()
}
