use std::time::Duration;
use thiserror::Error;

/// Why a single app update failed. Cancellation is not an error and has no variant here.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Update information not available")]
    NoUpdateInfo,

    #[error("Missing permission to install {extension} files: {reason}")]
    PermissionDenied { extension: String, reason: String },

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Downloaded file not found")]
    DownloadedFileNotFound,

    #[error("Installation failed: {0}")]
    InstallFailed(String),

    #[error(
        "Installation verification failed: package was not reported as installed within {}s",
        .timeout.as_secs()
    )]
    VerificationTimedOut { timeout: Duration },
}

#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("Repository '{0}' has no published releases")]
    NoReleases(String),

    #[error("No installable asset for {platform} in release {tag} of '{repo}'")]
    NoInstallableAsset {
        repo: String,
        tag: String,
        platform: String,
    },

    #[error("GitHub API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
