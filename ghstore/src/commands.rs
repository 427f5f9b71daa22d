pub mod cache;
pub mod check;
pub mod list;
pub mod open;
pub mod track;
pub mod update;

use crate::cli::GlobalArgs;
use crate::ui;
use anyhow::{Result, bail};
use ghstore_lib::apps::{AppsEvent, AppsState, AppsViewModel, Collaborators};
use ghstore_lib::config::Config;
use ghstore_lib::github::GitHubClient;
use ghstore_lib::installer::SystemInstaller;
use ghstore_lib::package_monitor::SystemPackageMonitor;
use ghstore_lib::repository::JsonAppStore;
use std::sync::Arc;

pub type Store = JsonAppStore<Arc<GitHubClient>>;

pub type ViewModel =
    AppsViewModel<Arc<GitHubClient>, SystemInstaller, Arc<Store>, SystemPackageMonitor>;

/// The configured collaborators every command works with.
pub struct Session {
    pub config: Config,
    pub client: Arc<GitHubClient>,
    pub store: Arc<Store>,
}

impl Session {
    pub fn open(global_args: &GlobalArgs) -> Result<Self> {
        let config = Config::setup(global_args.datadir.as_deref())?;
        let client = Arc::new(GitHubClient::new(&config)?);
        let store = Arc::new(JsonAppStore::open(
            &config.store_file,
            config.platform,
            client.clone(),
        )?);
        Ok(Self {
            config,
            client,
            store,
        })
    }

    pub fn view_model(&self) -> ViewModel {
        AppsViewModel::new(
            Collaborators {
                downloader: self.client.clone(),
                installer: SystemInstaller::new(self.config.platform),
                repository: self.store.clone(),
                monitor: SystemPackageMonitor::new(self.config.platform),
            },
            self.config.timings,
        )
    }
}

/// Waits for the first app list. Fails if loading failed.
pub async fn loaded(view_model: &ViewModel) -> Result<AppsState> {
    let mut receiver = view_model.subscribe();
    let state = receiver.wait_for(|s| !s.is_loading).await?.clone();
    if let Some(error) = &state.error {
        bail!("Failed to load apps: {error}");
    }
    Ok(state)
}

pub fn print_event(event: AppsEvent) {
    match event {
        AppsEvent::ShowSuccess(message) => ui::success(&message),
        AppsEvent::ShowError(message) => ui::error(&message),
        AppsEvent::NavigateToRepository { owner, name } => {
            ui::info(&format!("https://github.com/{owner}/{name}"))
        }
        AppsEvent::NavigateBack => {}
    }
}
