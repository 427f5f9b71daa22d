use crate::version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An application tracked by the store. The package name is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledApp {
    pub package_name: String,
    pub app_name: String,
    /// GitHub repository the releases come from.
    pub repo_owner: String,
    pub repo_name: String,
    pub installed_version: String,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub latest_asset_name: Option<String>,
    #[serde(default)]
    pub latest_asset_url: Option<String>,
    #[serde(default)]
    pub latest_asset_size: Option<u64>,
    #[serde(default)]
    pub is_pending_install: bool,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl InstalledApp {
    pub fn new(package_name: &str, app_name: &str, repo_owner: &str, repo_name: &str) -> Self {
        Self {
            package_name: package_name.to_string(),
            app_name: app_name.to_string(),
            repo_owner: repo_owner.to_string(),
            repo_name: repo_name.to_string(),
            installed_version: String::new(),
            latest_version: None,
            latest_asset_name: None,
            latest_asset_url: None,
            latest_asset_size: None,
            is_pending_install: false,
            last_checked_at: None,
        }
    }

    pub fn repo_full_name(&self) -> String {
        format!("{}/{}", self.repo_owner, self.repo_name)
    }

    /// True when a newer release with a downloadable asset is known.
    pub fn has_update(&self) -> bool {
        match (&self.latest_version, &self.latest_asset_url) {
            (Some(latest), Some(_)) => {
                self.installed_version.is_empty()
                    || version::is_newer(latest, &self.installed_version)
            }
            _ => false,
        }
    }
}

/// Progress of one app update as shown in the list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UpdateState {
    #[default]
    Idle,
    CheckingUpdate,
    Downloading,
    Installing,
    Success,
    Error(String),
}

impl UpdateState {
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            UpdateState::CheckingUpdate | UpdateState::Downloading | UpdateState::Installing
        )
    }

    /// Idle and Success need no cleanup when an update is torn down.
    pub fn is_settled(&self) -> bool {
        matches!(self, UpdateState::Idle | UpdateState::Success)
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateState::Idle => write!(f, "idle"),
            UpdateState::CheckingUpdate => write!(f, "checking"),
            UpdateState::Downloading => write!(f, "downloading"),
            UpdateState::Installing => write!(f, "installing"),
            UpdateState::Success => write!(f, "updated"),
            UpdateState::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// An `InstalledApp` paired with the transient state of its update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppItem {
    pub app: InstalledApp,
    pub update_state: UpdateState,
    /// Download progress in percent, set only while downloading.
    pub download_progress: Option<u8>,
    pub error: Option<String>,
}

impl AppItem {
    pub fn new(app: InstalledApp) -> Self {
        Self {
            app,
            update_state: UpdateState::Idle,
            download_progress: None,
            error: None,
        }
    }

    /// Rebuilds the item around a fresh record, keeping the transient state of `previous`.
    pub fn carry_over(app: InstalledApp, previous: Option<&AppItem>) -> Self {
        match previous {
            Some(previous) => Self {
                app,
                update_state: previous.update_state.clone(),
                download_progress: previous.download_progress,
                error: previous.error.clone(),
            },
            None => Self::new(app),
        }
    }

    pub fn package_name(&self) -> &str {
        &self.app.package_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateAllProgress {
    /// 1-based position of the app being updated.
    pub current: usize,
    pub total: usize,
    pub current_app_name: String,
}

/// What the operating system reports about an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackageInfo {
    pub package_name: String,
    pub version_name: String,
    pub version_code: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(installed: &str, latest: Option<&str>) -> InstalledApp {
        InstalledApp {
            installed_version: installed.to_string(),
            latest_version: latest.map(str::to_string),
            latest_asset_name: latest.map(|_| "app.deb".to_string()),
            latest_asset_url: latest.map(|_| "https://example.com/app.deb".to_string()),
            ..InstalledApp::new("com.example.app", "Example", "example", "app")
        }
    }

    #[test]
    fn test_has_update() {
        assert!(app("1.0", Some("2.0")).has_update());
        assert!(app("", Some("2.0")).has_update());
        assert!(!app("2.0", Some("2.0")).has_update());
        assert!(!app("2.1", Some("v2.0")).has_update());
        assert!(!app("1.0", None).has_update());

        let mut no_asset = app("1.0", Some("2.0"));
        no_asset.latest_asset_url = None;
        assert!(!no_asset.has_update());
    }

    #[test]
    fn test_carry_over_preserves_transient_state() {
        let mut previous = AppItem::new(app("1.0", Some("2.0")));
        previous.update_state = UpdateState::Downloading;
        previous.download_progress = Some(40);

        let refreshed = AppItem::carry_over(app("1.0", Some("2.1")), Some(&previous));
        assert_eq!(refreshed.update_state, UpdateState::Downloading);
        assert_eq!(refreshed.download_progress, Some(40));
        assert_eq!(refreshed.app.latest_version.as_deref(), Some("2.1"));

        let fresh = AppItem::carry_over(app("1.0", None), None);
        assert_eq!(fresh.update_state, UpdateState::Idle);
        assert_eq!(fresh.download_progress, None);
    }

    #[test]
    fn test_update_state_classification() {
        assert!(UpdateState::Downloading.is_in_progress());
        assert!(!UpdateState::Error("x".into()).is_in_progress());
        assert!(UpdateState::Idle.is_settled());
        assert!(UpdateState::Success.is_settled());
        assert!(!UpdateState::Error("x".into()).is_settled());
        assert!(!UpdateState::Installing.is_settled());
    }

    #[test]
    fn test_installed_app_json_defaults() {
        let json = r#"{
            "package_name": "com.example.app",
            "app_name": "Example",
            "repo_owner": "example",
            "repo_name": "app",
            "installed_version": "1.0"
        }"#;
        let app: InstalledApp = serde_json::from_str(json).unwrap();
        assert!(!app.is_pending_install);
        assert_eq!(app.latest_version, None);
        assert_eq!(app.repo_full_name(), "example/app");
    }
}
