use crate::download_client::ReleaseClient;
use crate::error::GitHubError;
use crate::models::InstalledApp;
use crate::platform::Platform;
use anyhow::{Context, Result, anyhow, bail};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

/// Live list of tracked apps. Emits the current list first, then every change.
pub type AppsStream = BoxStream<'static, Result<Vec<InstalledApp>>>;

pub trait AppsRepository: Send + Sync {
    fn get_apps(&self) -> AppsStream;

    /// Launches the app; `on_cant_launch` runs when that is not possible.
    fn open_app<F>(&self, app: &InstalledApp, on_cant_launch: F) -> impl Future<Output = ()> + Send
    where
        F: FnOnce() + Send + 'static;
}

/// Persistence of installed-app records.
pub trait InstalledAppsRepository: Send + Sync {
    fn update_pending_status(
        &self,
        package_name: &str,
        pending: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    fn update_app_version(
        &self,
        package_name: &str,
        version: &str,
        asset_name: &str,
        asset_url: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Refreshes the latest-release metadata of one app. Returns whether an update is available.
    fn check_for_updates(&self, package_name: &str) -> impl Future<Output = Result<bool>> + Send;
}

impl<T: AppsRepository> AppsRepository for Arc<T> {
    fn get_apps(&self) -> AppsStream {
        (**self).get_apps()
    }

    fn open_app<F>(&self, app: &InstalledApp, on_cant_launch: F) -> impl Future<Output = ()> + Send
    where
        F: FnOnce() + Send + 'static,
    {
        (**self).open_app(app, on_cant_launch)
    }
}

impl<T: InstalledAppsRepository> InstalledAppsRepository for Arc<T> {
    fn update_pending_status(
        &self,
        package_name: &str,
        pending: bool,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).update_pending_status(package_name, pending)
    }

    fn update_app_version(
        &self,
        package_name: &str,
        version: &str,
        asset_name: &str,
        asset_url: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).update_app_version(package_name, version, asset_name, asset_url)
    }

    fn check_for_updates(&self, package_name: &str) -> impl Future<Output = Result<bool>> + Send {
        (**self).check_for_updates(package_name)
    }
}

/// Tracked apps kept in a JSON file, refreshed from GitHub releases.
pub struct JsonAppStore<C> {
    path: PathBuf,
    platform: Platform,
    arch: String,
    releases: C,
    apps: watch::Sender<Vec<InstalledApp>>,
    /// Serialises read-modify-write cycles so the file matches the published list.
    write_lock: Mutex<()>,
}

impl<C: ReleaseClient> JsonAppStore<C> {
    /// Opens the store at `path`, starting empty when the file doesn't exist yet.
    pub fn open(path: &Path, platform: Platform, releases: C) -> Result<Self> {
        let apps = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<Vec<InstalledApp>>(&content)
                .context(format!("Failed to parse app store file {}", path.display()))?
        } else {
            Vec::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            platform,
            arch: std::env::consts::ARCH.to_string(),
            releases,
            apps: watch::Sender::new(apps),
            write_lock: Mutex::new(()),
        })
    }

    pub fn apps(&self) -> Vec<InstalledApp> {
        self.apps.borrow().clone()
    }

    pub fn find(&self, package_name: &str) -> Option<InstalledApp> {
        self.apps
            .borrow()
            .iter()
            .find(|app| app.package_name == package_name)
            .cloned()
    }

    /// Starts tracking an app. Fails if the package is already tracked.
    pub async fn add_app(&self, app: InstalledApp) -> Result<()> {
        self.modify(|apps| {
            if apps.iter().any(|a| a.package_name == app.package_name) {
                bail!("{} is already tracked", app.package_name);
            }
            apps.push(app);
            Ok(())
        })
        .await
    }

    pub async fn remove_app(&self, package_name: &str) -> Result<InstalledApp> {
        self.modify(|apps| {
            let index = apps
                .iter()
                .position(|a| a.package_name == package_name)
                .ok_or_else(|| anyhow!("{package_name} is not tracked"))?;
            Ok(apps.remove(index))
        })
        .await
    }

    async fn modify_app(
        &self,
        package_name: &str,
        f: impl FnOnce(&mut InstalledApp),
    ) -> Result<()> {
        self.modify(|apps| {
            let app = apps
                .iter_mut()
                .find(|a| a.package_name == package_name)
                .ok_or_else(|| anyhow!("{package_name} is not tracked"))?;
            f(app);
            Ok(())
        })
        .await
    }

    /// Applies `f` to a copy of the list, saves it, then publishes it.
    /// Nothing changes when `f` or the save fails.
    async fn modify<T>(&self, f: impl FnOnce(&mut Vec<InstalledApp>) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock().await;

        let mut apps = self.apps.borrow().clone();
        let result = f(&mut apps)?;
        self.save(&apps).await?;
        self.apps.send_replace(apps);
        Ok(result)
    }

    async fn save(&self, apps: &[InstalledApp]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(apps)?;
        tokio::fs::write(&self.path, content)
            .await
            .context(format!("Failed to write app store file {}", self.path.display()))?;
        Ok(())
    }
}

impl<C: ReleaseClient> AppsRepository for JsonAppStore<C> {
    fn get_apps(&self) -> AppsStream {
        let receiver = self.apps.subscribe();
        stream::unfold((receiver, true), |(mut receiver, first)| async move {
            if !first && receiver.changed().await.is_err() {
                return None;
            }
            let apps = receiver.borrow_and_update().clone();
            Some((Ok(apps), (receiver, false)))
        })
        .boxed()
    }

    async fn open_app<F>(&self, app: &InstalledApp, on_cant_launch: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = launch(self.platform, &app.package_name).await {
            tracing::warn!("Can't launch {}: {:#}", app.package_name, e);
            on_cant_launch();
        }
    }
}

impl<C: ReleaseClient> InstalledAppsRepository for JsonAppStore<C> {
    async fn update_pending_status(&self, package_name: &str, pending: bool) -> Result<()> {
        self.modify_app(package_name, |app| app.is_pending_install = pending)
            .await
    }

    async fn update_app_version(
        &self,
        package_name: &str,
        version: &str,
        asset_name: &str,
        asset_url: &str,
    ) -> Result<()> {
        self.modify_app(package_name, |app| {
            app.installed_version = version.to_string();
            app.latest_asset_name = Some(asset_name.to_string());
            app.latest_asset_url = Some(asset_url.to_string());
        })
        .await
    }

    async fn check_for_updates(&self, package_name: &str) -> Result<bool> {
        let app = self
            .find(package_name)
            .ok_or_else(|| anyhow!("{package_name} is not tracked"))?;

        let release = self
            .releases
            .latest_release(&app.repo_owner, &app.repo_name)
            .await
            .context(format!("Failed to fetch latest release of {}", app.repo_full_name()))?;
        let asset = release
            .find_installable_asset(self.platform, &self.arch)
            .map_err(|e| {
                tracing::debug!("{e:#}");
                GitHubError::NoInstallableAsset {
                    repo: app.repo_full_name(),
                    tag: release.tag_name.clone(),
                    platform: self.platform.to_string(),
                }
            })?;

        let checked_at = chrono::Utc::now();
        let mut has_update = false;
        self.modify_app(package_name, |app| {
            app.latest_version = Some(release.version.clone());
            app.latest_asset_name = Some(asset.name.clone());
            app.latest_asset_url = Some(asset.browser_download_url.clone());
            app.latest_asset_size = Some(asset.size);
            app.last_checked_at = Some(checked_at);
            has_update = app.has_update();
        })
        .await?;

        tracing::debug!(
            "{package_name}: latest {} (update available: {has_update})",
            release.version
        );
        Ok(has_update)
    }
}

async fn launch(platform: Platform, package_name: &str) -> Result<()> {
    let mut command = match platform {
        Platform::MacOs => {
            let mut command = tokio::process::Command::new("open");
            command.args(["-b", package_name]);
            command
        }
        Platform::Windows => {
            let mut command = tokio::process::Command::new("cmd");
            command.args(["/C", "start", "", package_name]);
            command
        }
        Platform::Linux => {
            let mut command = tokio::process::Command::new("gtk-launch");
            command.arg(package_name);
            command
        }
        Platform::Android => bail!("Launching apps is not supported on this build"),
    };

    let status = command
        .status()
        .await
        .context(format!("Failed to launch {package_name}"))?;
    if !status.success() {
        bail!("Launcher exited with {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::mock_release_client::MockReleaseClient;
    use tempfile::TempDir;

    fn tracked_app(package_name: &str) -> InstalledApp {
        InstalledApp {
            installed_version: "1.0.0".to_string(),
            ..InstalledApp::new(package_name, "Tool", "example", "tool")
        }
    }

    fn open_store(dir: &TempDir) -> Result<JsonAppStore<MockReleaseClient>> {
        JsonAppStore::open(
            &dir.path().join("apps.json"),
            Platform::Linux,
            MockReleaseClient::with_release("v2.0.0", &["tool_2.0.0_amd64.deb"]),
        )
    }

    #[tokio::test]
    async fn test_add_and_remove_persist() -> Result<()> {
        let tmp_dir = TempDir::new()?;
        let store = open_store(&tmp_dir)?;
        store.add_app(tracked_app("com.example.tool")).await?;
        assert!(store.add_app(tracked_app("com.example.tool")).await.is_err());

        let reopened = open_store(&tmp_dir)?;
        assert_eq!(reopened.apps().len(), 1);

        reopened.remove_app("com.example.tool").await?;
        assert!(reopened.remove_app("com.example.tool").await.is_err());
        assert!(open_store(&tmp_dir)?.apps().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_apps_emits_current_then_changes() -> Result<()> {
        let tmp_dir = TempDir::new()?;
        let store = open_store(&tmp_dir)?;
        let mut apps = store.get_apps();

        let first = apps.next().await.unwrap()?;
        assert!(first.is_empty());

        store.add_app(tracked_app("com.example.tool")).await?;
        let second = apps.next().await.unwrap()?;
        assert_eq!(second.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_check_for_updates() -> Result<()> {
        let tmp_dir = TempDir::new()?;
        let store = open_store(&tmp_dir)?;
        store.add_app(tracked_app("com.example.tool")).await?;

        assert!(store.check_for_updates("com.example.tool").await?);
        let app = store.find("com.example.tool").unwrap();
        assert_eq!(app.latest_version.as_deref(), Some("2.0.0"));
        assert_eq!(app.latest_asset_name.as_deref(), Some("tool_2.0.0_amd64.deb"));
        assert!(app.last_checked_at.is_some());

        assert!(store.check_for_updates("com.example.unknown").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_version_and_pending_updates() -> Result<()> {
        let tmp_dir = TempDir::new()?;
        let store = open_store(&tmp_dir)?;
        store.add_app(tracked_app("com.example.tool")).await?;

        store
            .update_app_version(
                "com.example.tool",
                "2.0.0",
                "tool.deb",
                "https://example.com/tool.deb",
            )
            .await?;
        store.update_pending_status("com.example.tool", true).await?;

        let app = open_store(&tmp_dir)?.find("com.example.tool").unwrap();
        assert_eq!(app.installed_version, "2.0.0");
        assert!(app.is_pending_install);
        assert!(
            store
                .update_pending_status("com.example.other", false)
                .await
                .is_err()
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_check_without_releases_leaves_record() -> Result<()> {
        let tmp_dir = TempDir::new()?;
        let store = JsonAppStore::open(
            &tmp_dir.path().join("apps.json"),
            Platform::Linux,
            MockReleaseClient::without_releases(),
        )?;
        store.add_app(tracked_app("com.example.tool")).await?;

        assert!(store.check_for_updates("com.example.tool").await.is_err());
        let app = store.find("com.example.tool").unwrap();
        assert_eq!(app.latest_version, None);
        assert_eq!(app.last_checked_at, None);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_writes_are_all_kept() -> Result<()> {
        let tmp_dir = TempDir::new()?;
        let store = Arc::new(open_store(&tmp_dir)?);
        store.add_app(tracked_app("com.example.tool")).await?;
        store.add_app(tracked_app("com.example.other")).await?;
        store.add_app(tracked_app("com.example.extra")).await?;

        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.update_pending_status("com.example.tool", true).await }
        });
        let version = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .update_app_version(
                        "com.example.other",
                        "3.0.0",
                        "other.deb",
                        "https://example.com/other.deb",
                    )
                    .await
            }
        });
        store.remove_app("com.example.extra").await?;
        pending.await??;
        version.await??;

        let reopened = open_store(&tmp_dir)?;
        assert_eq!(reopened.apps(), store.apps());
        assert_eq!(reopened.apps().len(), 2);
        assert!(reopened.find("com.example.tool").unwrap().is_pending_install);
        assert_eq!(
            reopened.find("com.example.other").unwrap().installed_version,
            "3.0.0"
        );
        Ok(())
    }

    #[test]
    fn test_corrupt_store_file() -> Result<()> {
        let tmp_dir = TempDir::new()?;
        std::fs::write(tmp_dir.path().join("apps.json"), "not json")?;
        assert!(open_store(&tmp_dir).is_err());
        Ok(())
    }
}
