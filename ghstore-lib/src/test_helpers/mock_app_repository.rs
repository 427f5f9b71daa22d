use super::MOCK_LATENCY;
use crate::models::InstalledApp;
use crate::repository::{AppsRepository, AppsStream, InstalledAppsRepository};
use anyhow::{Result, anyhow, bail};
use futures_util::{StreamExt, stream};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// In-memory app records that publish every change like the JSON store does.
pub struct MockAppRepository {
    apps: watch::Sender<Vec<InstalledApp>>,
    load_error: Option<String>,
    failing_checks: Mutex<HashSet<String>>,
    checked: Mutex<Vec<String>>,
    pending_history: Mutex<Vec<(String, bool)>>,
    launchable: AtomicBool,
}

impl MockAppRepository {
    pub fn new(apps: Vec<InstalledApp>) -> Self {
        Self {
            apps: watch::Sender::new(apps),
            load_error: None,
            failing_checks: Mutex::new(HashSet::new()),
            checked: Mutex::new(vec![]),
            pending_history: Mutex::new(vec![]),
            launchable: AtomicBool::new(true),
        }
    }

    /// A repository whose app stream fails immediately.
    pub fn failing(message: &str) -> Self {
        Self {
            load_error: Some(message.to_string()),
            ..Self::new(vec![])
        }
    }

    /// Replaces the stored list, as another writer would.
    pub fn push(&self, apps: Vec<InstalledApp>) {
        self.apps.send_replace(apps);
    }

    pub fn app(&self, package_name: &str) -> Option<InstalledApp> {
        self.apps
            .borrow()
            .iter()
            .find(|a| a.package_name == package_name)
            .cloned()
    }

    /// Every pending flag written for the package, in order.
    pub fn pending_history(&self, package_name: &str) -> Vec<bool> {
        self.pending_history
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == package_name)
            .map(|(_, pending)| *pending)
            .collect()
    }

    pub fn fail_check(&self, package_name: &str) {
        self.failing_checks
            .lock()
            .unwrap()
            .insert(package_name.to_string());
    }

    pub fn checked(&self) -> Vec<String> {
        self.checked.lock().unwrap().clone()
    }

    pub fn refuse_launch(&self) {
        self.launchable.store(false, Ordering::SeqCst);
    }

    fn modify_app(&self, package_name: &str, f: impl FnOnce(&mut InstalledApp)) -> Result<()> {
        let mut result = Err(anyhow!("{package_name} is not tracked"));
        self.apps.send_if_modified(|apps| {
            match apps.iter_mut().find(|a| a.package_name == package_name) {
                Some(app) => {
                    f(app);
                    result = Ok(());
                    true
                }
                None => false,
            }
        });
        result
    }
}

impl AppsRepository for MockAppRepository {
    fn get_apps(&self) -> AppsStream {
        if let Some(message) = self.load_error.clone() {
            return stream::once(async move { Err(anyhow!(message)) }).boxed();
        }

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

    async fn open_app<F>(&self, _app: &InstalledApp, on_cant_launch: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.launchable.load(Ordering::SeqCst) {
            on_cant_launch();
        }
    }
}

impl InstalledAppsRepository for MockAppRepository {
    async fn update_pending_status(&self, package_name: &str, pending: bool) -> Result<()> {
        tokio::time::sleep(MOCK_LATENCY).await;
        self.pending_history
            .lock()
            .unwrap()
            .push((package_name.to_string(), pending));
        self.modify_app(package_name, |app| app.is_pending_install = pending)
    }

    async fn update_app_version(
        &self,
        package_name: &str,
        version: &str,
        asset_name: &str,
        asset_url: &str,
    ) -> Result<()> {
        tokio::time::sleep(MOCK_LATENCY).await;
        self.modify_app(package_name, |app| {
            app.installed_version = version.to_string();
            app.latest_asset_name = Some(asset_name.to_string());
            app.latest_asset_url = Some(asset_url.to_string());
        })
    }

    async fn check_for_updates(&self, package_name: &str) -> Result<bool> {
        tokio::time::sleep(MOCK_LATENCY).await;
        self.checked.lock().unwrap().push(package_name.to_string());
        if self.failing_checks.lock().unwrap().contains(package_name) {
            bail!("GitHub API error: rate limited");
        }
        let app = self
            .app(package_name)
            .ok_or_else(|| anyhow!("{package_name} is not tracked"))?;
        Ok(app.has_update())
    }
}
