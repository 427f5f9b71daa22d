use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

static CURRENT: Lazy<Platform> = Lazy::new(Platform::detect);

/// Operating system family of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Android,
}

impl Platform {
    /// The platform of the running process. Resolved once.
    pub fn current() -> Platform {
        *CURRENT
    }

    #[cfg(target_os = "android")]
    fn detect() -> Platform {
        Platform::Android
    }

    #[cfg(not(target_os = "android"))]
    fn detect() -> Platform {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Classify an OS name as reported by the runtime environment.
    /// Unknown names fall back to Linux.
    pub fn from_os_name(os: &str) -> Platform {
        let os = os.to_lowercase();
        if os.contains("android") {
            Platform::Android
        } else if os.contains("win") && !os.contains("darwin") {
            Platform::Windows
        } else if os.contains("mac") || os.contains("darwin") || os == "ios" {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Asset file extensions this platform can install, in order of preference.
    pub fn installable_extensions(&self) -> &'static [&'static str] {
        match self {
            Platform::Android => &["apk"],
            Platform::Windows => &["msi", "exe"],
            Platform::MacOs => &["dmg", "pkg"],
            Platform::Linux => &["deb", "rpm", "appimage"],
        }
    }

    pub fn can_install(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.installable_extensions().contains(&extension.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
            Platform::Android => "Android",
        };
        write!(f, "{name}")
    }
}

/// Lower-cased extension of an asset file name, without the dot.
pub fn file_extension(asset_name: &str) -> String {
    asset_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_os_name() {
        assert_eq!(Platform::from_os_name("windows"), Platform::Windows);
        assert_eq!(Platform::from_os_name("Windows 11"), Platform::Windows);
        assert_eq!(Platform::from_os_name("macos"), Platform::MacOs);
        assert_eq!(Platform::from_os_name("Mac OS X"), Platform::MacOs);
        assert_eq!(Platform::from_os_name("Darwin"), Platform::MacOs);
        assert_eq!(Platform::from_os_name("linux"), Platform::Linux);
        assert_eq!(Platform::from_os_name("android"), Platform::Android);
        assert_eq!(Platform::from_os_name("freebsd"), Platform::Linux);
    }

    #[test]
    fn test_current_is_stable() {
        assert_eq!(Platform::current(), Platform::current());
    }

    #[test]
    fn test_installable_extensions() {
        assert!(Platform::Linux.can_install("deb"));
        assert!(Platform::Linux.can_install("AppImage"));
        assert!(!Platform::Linux.can_install("apk"));
        assert!(Platform::Android.can_install("apk"));
        assert!(Platform::Windows.can_install("MSI"));
        assert!(!Platform::MacOs.can_install("exe"));
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("app-2.0.apk"), "apk");
        assert_eq!(file_extension("Tool-x86_64.AppImage"), "appimage");
        assert_eq!(file_extension("setup.tar.gz"), "gz");
        assert_eq!(file_extension("README"), "");
    }
}
