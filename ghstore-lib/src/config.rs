use crate::platform::Platform;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_FILE_NAME: &str = "ghstore.toml";

#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for ghstore data (store file, downloads, settings)
    pub data_dir: PathBuf,

    /// Directory where release assets are downloaded to
    pub downloads_dir: PathBuf,

    /// JSON file holding the tracked apps
    pub store_file: PathBuf,

    /// Optional user settings overlay
    pub settings_file: PathBuf,

    /// Host platform, used to pick installable assets.
    pub platform: Platform,

    pub timings: UpdateTimings,

    /// Personal access token sent to the GitHub API, raises the rate limit.
    pub github_token: Option<String>,
}

/// Delays used by the update orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateTimings {
    /// Wait after handing the asset to the installer before polling the OS.
    pub install_grace: Duration,
    pub verify_poll_interval: Duration,
    /// Upper bound on waiting for the OS to report the package installed.
    pub install_timeout: Duration,
    /// How long the success state is shown before returning to idle.
    pub success_hold: Duration,
    /// Pause between two apps of an "update all" run.
    pub bulk_pacing: Duration,
}

impl Default for UpdateTimings {
    fn default() -> Self {
        Self {
            install_grace: Duration::from_secs(2),
            verify_poll_interval: Duration::from_secs(1),
            install_timeout: Duration::from_secs(30),
            success_hold: Duration::from_secs(2),
            bulk_pacing: Duration::from_secs(1),
        }
    }
}

/// `ghstore.toml` file specification. Durations are in milliseconds.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct SettingsToml {
    pub github_token: Option<String>,
    pub downloads_dir: Option<PathBuf>,
    pub updates: Option<UpdateTimingsToml>,
}

/// `[updates]` toml section.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct UpdateTimingsToml {
    pub install_grace_ms: Option<u64>,
    pub verify_poll_interval_ms: Option<u64>,
    pub install_timeout_ms: Option<u64>,
    pub success_hold_ms: Option<u64>,
    pub bulk_pacing_ms: Option<u64>,
}

impl UpdateTimingsToml {
    fn apply(&self, timings: &mut UpdateTimings) {
        let ms = Duration::from_millis;
        if let Some(v) = self.install_grace_ms {
            timings.install_grace = ms(v);
        }
        if let Some(v) = self.verify_poll_interval_ms {
            timings.verify_poll_interval = ms(v);
        }
        if let Some(v) = self.install_timeout_ms {
            timings.install_timeout = ms(v);
        }
        if let Some(v) = self.success_hold_ms {
            timings.success_hold = ms(v);
        }
        if let Some(v) = self.bulk_pacing_ms {
            timings.bulk_pacing = ms(v);
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new_for_path(&Self::default_data_dir())
    }
}

impl Config {
    pub fn new_for_path(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            downloads_dir: data_dir.join("downloads"),
            store_file: data_dir.join("apps.json"),
            settings_file: data_dir.join(SETTINGS_FILE_NAME),
            platform: Platform::current(),
            timings: UpdateTimings::default(),
            github_token: None,
        }
    }

    /// Sets up a new Config for the given data directory, applying
    /// `ghstore.toml` when present. See also [Self::default_data_dir].
    pub fn setup(data_dir: Option<&Path>) -> Result<Self> {
        let data_dir = data_dir
            .map(|d| d.to_path_buf())
            .unwrap_or_else(Self::default_data_dir);
        let mut config = Self::new_for_path(&data_dir);

        if config.settings_file.exists() {
            let content = std::fs::read_to_string(&config.settings_file)?;
            let settings = toml::from_str::<SettingsToml>(&content).context(format!(
                "Failed to parse settings file: {}",
                config.settings_file.display()
            ))?;
            config.apply(settings);
        }

        // Ensure directories exist
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.downloads_dir)?;

        Ok(config)
    }

    fn apply(&mut self, settings: SettingsToml) {
        if let Some(token) = settings.github_token.filter(|t| !t.is_empty()) {
            self.github_token = Some(token);
        }
        if let Some(dir) = settings.downloads_dir {
            self.downloads_dir = dir;
        }
        if let Some(updates) = settings.updates {
            updates.apply(&mut self.timings);
        }
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"))
            .join("ghstore")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_setup_creates_directories() -> Result<()> {
        let tmp_dir = TempDir::new()?;
        let config = Config::setup(Some(tmp_dir.path()))?;

        assert!(config.downloads_dir.is_dir());
        assert_eq!(config.store_file, tmp_dir.path().join("apps.json"));
        assert_eq!(config.timings, UpdateTimings::default());
        assert_eq!(config.github_token, None);
        Ok(())
    }

    #[test]
    fn test_settings_overlay() -> Result<()> {
        let tmp_dir = TempDir::new()?;
        std::fs::write(
            tmp_dir.path().join(SETTINGS_FILE_NAME),
            r#"
github_token = "ghp_test"

[updates]
install_timeout_ms = 60000
bulk_pacing_ms = 0
"#,
        )?;

        let config = Config::setup(Some(tmp_dir.path()))?;
        assert_eq!(config.github_token.as_deref(), Some("ghp_test"));
        assert_eq!(config.timings.install_timeout, Duration::from_secs(60));
        assert_eq!(config.timings.bulk_pacing, Duration::ZERO);
        assert_eq!(config.timings.install_grace, Duration::from_secs(2));
        Ok(())
    }

    #[test]
    fn test_invalid_settings_file() -> Result<()> {
        let tmp_dir = TempDir::new()?;
        std::fs::write(tmp_dir.path().join(SETTINGS_FILE_NAME), "updates = 3")?;
        assert!(Config::setup(Some(tmp_dir.path())).is_err());
        Ok(())
    }
}
