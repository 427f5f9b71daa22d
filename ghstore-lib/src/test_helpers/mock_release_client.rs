use crate::download_client::ReleaseClient;
use crate::github::{GitHubAsset, GitHubRelease};
use crate::version::normalize_tag;
use anyhow::{Result, bail};

/// Serves one fixed release for every repository.
pub struct MockReleaseClient {
    release: Option<GitHubRelease>,
}

impl MockReleaseClient {
    pub fn with_release(tag_name: &str, asset_names: &[&str]) -> Self {
        let assets = asset_names
            .iter()
            .map(|name| GitHubAsset {
                name: name.to_string(),
                browser_download_url: format!("https://example.com/download/{tag_name}/{name}"),
                size: 1000,
            })
            .collect();
        Self {
            release: Some(GitHubRelease {
                tag_name: tag_name.to_string(),
                version: normalize_tag(tag_name),
                assets,
            }),
        }
    }

    pub fn without_releases() -> Self {
        Self { release: None }
    }
}

impl ReleaseClient for MockReleaseClient {
    async fn latest_release(&self, owner: &str, repo: &str) -> Result<GitHubRelease> {
        match &self.release {
            Some(release) => Ok(release.clone()),
            None => bail!("Repository '{owner}/{repo}' has no published releases"),
        }
    }
}
