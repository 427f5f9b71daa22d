use crate::platform::Platform;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::instrument;

/// Hands downloaded assets to the operating system's installer.
pub trait Installer: Send + Sync {
    /// Fails when assets with this extension can't be installed here, e.g.
    /// because the required system tool or permission is missing.
    fn ensure_permissions_or_throw(&self, extension: &str)
    -> impl Future<Output = Result<()>> + Send;

    /// Starts installing the asset. The OS may finish asynchronously.
    fn install(&self, path: &Path, extension: &str) -> impl Future<Output = Result<()>> + Send;
}

impl<T: Installer> Installer for Arc<T> {
    fn ensure_permissions_or_throw(&self, extension: &str)
    -> impl Future<Output = Result<()>> + Send {
        (**self).ensure_permissions_or_throw(extension)
    }

    fn install(&self, path: &Path, extension: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).install(path, extension)
    }
}

/// Desktop installer driving the platform's package tools.
pub struct SystemInstaller {
    platform: Platform,
    /// Where AppImages are placed; they have no system package manager.
    appimage_dir: PathBuf,
}

impl SystemInstaller {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            appimage_dir: dirs::home_dir().unwrap_or_default().join("Applications"),
        }
    }

    /// System programs an extension needs on this platform.
    fn required_tools(&self, extension: &str) -> &'static [&'static str] {
        match (self.platform, extension) {
            (Platform::Linux, "deb") => &["pkexec", "dpkg"],
            (Platform::Linux, "rpm") => &["pkexec", "rpm"],
            (Platform::MacOs, _) => &["open"],
            (Platform::Windows, "msi") => &["msiexec"],
            _ => &[],
        }
    }
}

impl Installer for SystemInstaller {
    async fn ensure_permissions_or_throw(&self, extension: &str) -> Result<()> {
        let extension = extension.to_lowercase();
        if !self.platform.can_install(&extension) {
            bail!(
                "{} files can't be installed on {}",
                extension.to_uppercase(),
                self.platform
            );
        }

        for tool in self.required_tools(&extension) {
            if find_in_path(tool).is_none() {
                bail!("Installing {extension} files requires `{tool}`, which was not found in PATH");
            }
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn install(&self, path: &Path, extension: &str) -> Result<()> {
        let extension = extension.to_lowercase();
        match (self.platform, extension.as_str()) {
            (Platform::Linux, "deb") => run("pkexec", &["dpkg", "-i"], path).await,
            (Platform::Linux, "rpm") => run("pkexec", &["rpm", "-U", "--replacepkgs"], path).await,
            (Platform::Linux, "appimage") => install_appimage(path, &self.appimage_dir),
            (Platform::MacOs, "dmg" | "pkg") => run("open", &[], path).await,
            (Platform::Windows, "msi") => run("msiexec", &["/i"], path).await,
            (Platform::Windows, "exe") => {
                Command::new(path)
                    .spawn()
                    .context(format!("Failed to launch installer {}", path.display()))?;
                Ok(())
            }
            (platform, extension) => bail!("Installing {extension} files is not supported on {platform}"),
        }
    }
}

async fn run(program: &str, args: &[&str], path: &Path) -> Result<()> {
    tracing::debug!("Running {program} {args:?} {}", path.display());
    let output = Command::new(program)
        .args(args)
        .arg(path)
        .output()
        .await
        .context(format!("Failed to execute {program}"))?;

    if !output.status.success() {
        bail!(
            "{program} failed for {:?}. Reason: {}",
            path,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}

fn install_appimage(path: &Path, destination_dir: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .context(format!("Invalid AppImage path: {}", path.display()))?;
    std::fs::create_dir_all(destination_dir)?;
    let destination = destination_dir.join(file_name);
    std::fs::copy(path, &destination)?;

    #[cfg(unix)]
    make_executable(&destination)?;

    tracing::debug!("AppImage installed to {}", destination.display());
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755); // Add execute permissions
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

/// Locates an executable on PATH.
pub(crate) fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}
