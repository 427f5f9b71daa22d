use crate::cli::GlobalArgs;
use crate::commands::Session;
use crate::ui;
use anyhow::{Context, Result, anyhow};
use clap::Args;
use ghstore_lib::download_client::Downloader;
use ghstore_lib::models::InstalledApp;
use ghstore_lib::package_monitor::{PackageMonitor, SystemPackageMonitor};
use ghstore_lib::repository::InstalledAppsRepository;

#[derive(Args)]
pub struct TrackCommand {
    /// GitHub repository publishing the app, as owner/name
    pub repository: String,

    /// Package name the operating system knows the app by
    pub package: String,

    /// Display name (defaults to the repository name)
    #[arg(long)]
    pub name: Option<String>,

    /// Installed version (detected from the system when omitted)
    #[arg(long)]
    pub installed: Option<String>,

    /// Don't look up the latest release right away
    #[arg(long)]
    pub no_check: bool,
}

impl TrackCommand {
    pub async fn run(self, global_args: GlobalArgs) -> Result<()> {
        let (owner, repo) = parse_repository(&self.repository)?;
        let session = Session::open(&global_args)?;

        let installed_version = match self.installed.clone() {
            Some(version) => version,
            None => SystemPackageMonitor::new(session.config.platform)
                .get_installed_package_info(&self.package)
                .await
                .map(|info| info.version_name)
                .unwrap_or_default(),
        };

        let app = InstalledApp {
            installed_version,
            ..InstalledApp::new(
                &self.package,
                self.name.as_deref().unwrap_or(repo),
                owner,
                repo,
            )
        };
        let name = app.app_name.clone();
        session.store.add_app(app).await?;
        ui::success(&format!("Tracking {name} from {owner}/{repo}"));

        if !self.no_check {
            match session.store.check_for_updates(&self.package).await {
                Ok(true) => ui::tip(&format!(
                    "An update is available. Run `ghstore update {}` to install it",
                    self.package
                )),
                Ok(false) => ui::info("Already up to date"),
                Err(e) => ui::warning(&format!("Couldn't check for updates: {e:#}")),
            }
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct UntrackCommand {
    /// Package name of the app
    pub package: String,
}

impl UntrackCommand {
    pub async fn run(self, global_args: GlobalArgs) -> Result<()> {
        let session = Session::open(&global_args)?;
        let app = session
            .store
            .remove_app(&self.package)
            .await
            .context(format!("Failed to untrack {}", self.package))?;

        if let Some(asset_name) = &app.latest_asset_name
            && session.client.cancel_download(asset_name).await
        {
            tracing::debug!("Removed downloaded {asset_name}");
        }
        ui::success(&format!("Stopped tracking {}", app.app_name));
        Ok(())
    }
}

fn parse_repository(repository: &str) -> Result<(&str, &str)> {
    let repository = repository
        .trim_start_matches("https://github.com/")
        .trim_end_matches('/');
    match repository.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(anyhow!(
            "Invalid repository '{repository}', expected owner/name"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repository() {
        assert_eq!(parse_repository("owner/tool").unwrap(), ("owner", "tool"));
        assert_eq!(
            parse_repository("https://github.com/owner/tool/").unwrap(),
            ("owner", "tool")
        );
        assert!(parse_repository("owner").is_err());
        assert!(parse_repository("/tool").is_err());
        assert!(parse_repository("a/b/c").is_err());
    }
}
