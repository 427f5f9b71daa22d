use super::MOCK_LATENCY;
use super::mock_package_monitor::MockPackageMonitor;
use crate::installer::Installer;
use anyhow::{Result, bail};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

enum Outcome {
    Installs { package_name: String, version: String },
    Nothing,
    Fails,
}

/// Installs by registering packages with a [`MockPackageMonitor`]. Assets
/// with no configured outcome install nothing.
pub struct MockInstaller {
    monitor: Arc<MockPackageMonitor>,
    outcomes: Mutex<HashMap<String, Outcome>>,
    denied_extensions: Mutex<Vec<String>>,
    installed: Mutex<Vec<String>>,
}

impl MockInstaller {
    pub fn new(monitor: Arc<MockPackageMonitor>) -> Self {
        Self {
            monitor,
            outcomes: Mutex::new(HashMap::new()),
            denied_extensions: Mutex::new(vec![]),
            installed: Mutex::new(vec![]),
        }
    }

    /// Installing `asset_name` makes the monitor report `package_name` at `version`.
    pub fn installs_as(&self, asset_name: &str, package_name: &str, version: &str) {
        self.set_outcome(
            asset_name,
            Outcome::Installs {
                package_name: package_name.to_string(),
                version: version.to_string(),
            },
        );
    }

    /// Installing `asset_name` succeeds but the OS never reports a change.
    pub fn installs_nothing(&self, asset_name: &str) {
        self.set_outcome(asset_name, Outcome::Nothing);
    }

    pub fn fail_install(&self, asset_name: &str) {
        self.set_outcome(asset_name, Outcome::Fails);
    }

    pub fn deny(&self, extension: &str) {
        self.denied_extensions
            .lock()
            .unwrap()
            .push(extension.to_string());
    }

    pub fn install_count(&self) -> usize {
        self.installed.lock().unwrap().len()
    }

    /// Asset file names passed to `install`, in call order.
    pub fn installed_assets(&self) -> Vec<String> {
        self.installed.lock().unwrap().clone()
    }

    fn set_outcome(&self, asset_name: &str, outcome: Outcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(asset_name.to_string(), outcome);
    }
}

impl Installer for MockInstaller {
    async fn ensure_permissions_or_throw(&self, extension: &str) -> Result<()> {
        tokio::time::sleep(MOCK_LATENCY).await;
        if self
            .denied_extensions
            .lock()
            .unwrap()
            .iter()
            .any(|e| e == extension)
        {
            bail!("Installing {extension} files is not allowed");
        }
        Ok(())
    }

    async fn install(&self, path: &Path, _extension: &str) -> Result<()> {
        tokio::time::sleep(MOCK_LATENCY).await;
        let asset_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        self.installed.lock().unwrap().push(asset_name.clone());

        match self.outcomes.lock().unwrap().get(&asset_name) {
            Some(Outcome::Installs {
                package_name,
                version,
            }) => self.monitor.set_installed(package_name, version),
            Some(Outcome::Fails) => bail!("Installer exited with status 1"),
            Some(Outcome::Nothing) | None => {}
        }
        Ok(())
    }
}
