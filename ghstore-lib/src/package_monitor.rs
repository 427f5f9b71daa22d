use crate::installer::find_in_path;
use crate::models::InstalledPackageInfo;
use crate::platform::Platform;
use std::sync::Arc;
use tokio::process::Command;

/// Read access to the operating system's package registry.
pub trait PackageMonitor: Send + Sync {
    fn is_package_installed(&self, package_name: &str) -> impl Future<Output = bool> + Send;

    fn get_installed_package_info(
        &self,
        package_name: &str,
    ) -> impl Future<Output = Option<InstalledPackageInfo>> + Send;
}

impl<T: PackageMonitor> PackageMonitor for Arc<T> {
    fn is_package_installed(&self, package_name: &str) -> impl Future<Output = bool> + Send {
        (**self).is_package_installed(package_name)
    }

    fn get_installed_package_info(
        &self,
        package_name: &str,
    ) -> impl Future<Output = Option<InstalledPackageInfo>> + Send {
        (**self).get_installed_package_info(package_name)
    }
}

/// Queries the native package tools: dpkg or rpm on Linux, Spotlight and
/// bundle metadata on macOS, the PowerShell package provider on Windows.
pub struct SystemPackageMonitor {
    platform: Platform,
}

impl SystemPackageMonitor {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    async fn installed_version(&self, package_name: &str) -> Option<String> {
        if !is_valid_package_name(package_name) {
            tracing::warn!("Refusing to query invalid package name '{package_name}'");
            return None;
        }

        match self.platform {
            Platform::Linux => {
                if find_in_path("dpkg-query").is_some()
                    && let Some(version) = query(
                        "dpkg-query",
                        &["-W", "-f=${Version}", package_name],
                    )
                    .await
                {
                    return Some(version);
                }
                if find_in_path("rpm").is_some() {
                    return query("rpm", &["-q", "--queryformat", "%{VERSION}", package_name])
                        .await;
                }
                None
            }
            Platform::MacOs => {
                let filter = format!("kMDItemCFBundleIdentifier == '{package_name}'");
                let bundle = query("mdfind", &[filter.as_str()]).await?;
                let bundle = bundle.lines().next()?.to_string();
                let info_plist = format!("{bundle}/Contents/Info");
                query(
                    "defaults",
                    &["read", info_plist.as_str(), "CFBundleShortVersionString"],
                )
                .await
            }
            Platform::Windows => {
                let script = format!(
                    "(Get-Package -Name '{package_name}' -ErrorAction SilentlyContinue | Select-Object -First 1).Version"
                );
                query("powershell", &["-NoProfile", "-Command", script.as_str()]).await
            }
            Platform::Android => None,
        }
    }
}

impl PackageMonitor for SystemPackageMonitor {
    async fn is_package_installed(&self, package_name: &str) -> bool {
        self.installed_version(package_name).await.is_some()
    }

    async fn get_installed_package_info(&self, package_name: &str) -> Option<InstalledPackageInfo> {
        let version_name = self.installed_version(package_name).await?;
        Some(InstalledPackageInfo {
            package_name: package_name.to_string(),
            version_name,
            version_code: None,
        })
    }
}

/// Package names end up inside shell-like queries, so only a conservative
/// character set is accepted.
fn is_valid_package_name(package_name: &str) -> bool {
    !package_name.is_empty()
        && package_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+'))
}

/// Runs a query command, returning trimmed stdout on success.
async fn query(program: &str, args: &[&str]) -> Option<String> {
    let output = match Command::new(program).args(args).output().await {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!("Failed to execute {program}: {e}");
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!stdout.is_empty()).then_some(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_name_validation() {
        assert!(is_valid_package_name("com.example.app"));
        assert!(is_valid_package_name("libfoo-dev"));
        assert!(is_valid_package_name("g++"));
        assert!(!is_valid_package_name(""));
        assert!(!is_valid_package_name("app'; rm -rf /"));
        assert!(!is_valid_package_name("two words"));
    }

    #[tokio::test]
    async fn test_android_reports_nothing() {
        let monitor = SystemPackageMonitor::new(Platform::Android);
        assert!(!monitor.is_package_installed("com.example.app").await);
        assert!(
            monitor
                .get_installed_package_info("com.example.app")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_invalid_name_is_not_installed() {
        let monitor = SystemPackageMonitor::new(Platform::Linux);
        assert!(!monitor.is_package_installed("bad name").await);
    }

    #[tokio::test]
    async fn test_query_missing_program() {
        assert_eq!(query("definitely-not-a-real-program-ghstore", &[]).await, None);
    }
}
