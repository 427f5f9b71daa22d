use crate::models::InstalledPackageInfo;
use crate::package_monitor::PackageMonitor;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An in-memory package registry.
#[derive(Default)]
pub struct MockPackageMonitor {
    installed: Mutex<HashMap<String, String>>,
    queries: AtomicUsize,
}

impl MockPackageMonitor {
    pub fn set_installed(&self, package_name: &str, version: &str) {
        self.installed
            .lock()
            .unwrap()
            .insert(package_name.to_string(), version.to_string());
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl PackageMonitor for MockPackageMonitor {
    async fn is_package_installed(&self, package_name: &str) -> bool {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.installed.lock().unwrap().contains_key(package_name)
    }

    async fn get_installed_package_info(&self, package_name: &str) -> Option<InstalledPackageInfo> {
        let installed = self.installed.lock().unwrap();
        installed.get(package_name).map(|version| InstalledPackageInfo {
            package_name: package_name.to_string(),
            version_name: version.clone(),
            version_code: None,
        })
    }
}
