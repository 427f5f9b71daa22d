use crate::config::Config;
use crate::download_client::{Downloader, ProgressStream, ReleaseClient};
use crate::error::GitHubError;
use crate::platform::{Platform, file_extension};
use crate::version::{compare, normalize_tag};
use anyhow::{Context, Result, bail};
use futures_util::{StreamExt, TryStreamExt, stream};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::instrument;

const API_BASE: &str = "https://api.github.com";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GitHubRelease {
    pub tag_name: String,
    /// Tag with the usual `v` prefix removed.
    pub version: String,
    pub assets: Vec<GitHubAsset>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
    pub size: u64,
}

/// Matches the GitHub API JSON response for a single release
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
struct GitHubReleaseJson {
    pub tag_name: String,
    #[serde(default)]
    pub draft: bool,
    pub assets: Vec<GitHubAssetJson>,
}

/// Matches the GitHub API JSON response for a single release asset
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
struct GitHubAssetJson {
    pub name: String,
    pub browser_download_url: String,
    pub size: u64,
}

impl GitHubRelease {
    /// Find an installable asset for the given platform. Extensions are tried
    /// in the platform's order of preference; within one extension an asset
    /// naming the host architecture wins.
    pub fn find_installable_asset(&self, platform: Platform, arch: &str) -> Result<&GitHubAsset> {
        if self.assets.is_empty() {
            bail!("There are no assets available to search for.");
        }

        let arch_hints = arch_patterns(arch);

        for extension in platform.installable_extensions() {
            let candidates: Vec<&GitHubAsset> = self
                .assets
                .iter()
                .filter(|asset| file_extension(&asset.name) == *extension)
                .collect();

            let by_arch = arch_hints.iter().find_map(|hint| {
                candidates
                    .iter()
                    .find(|asset| asset.name.to_lowercase().contains(hint))
            });

            if let Some(asset) = by_arch.or(candidates.first()) {
                return Ok(*asset);
            }
        }

        bail!(
            "No installable asset found for the current platform: OS={}, ARCH={}",
            platform,
            arch
        );
    }

    fn from_json_struct(json: GitHubReleaseJson) -> Self {
        let assets = json
            .assets
            .into_iter()
            .map(|a| GitHubAsset {
                name: a.name,
                browser_download_url: a.browser_download_url,
                size: a.size,
            })
            .collect();
        GitHubRelease {
            version: normalize_tag(&json.tag_name),
            tag_name: json.tag_name,
            assets,
        }
    }
}

/// Name fragments identifying builds for an architecture, most specific first.
fn arch_patterns(arch: &str) -> Vec<&'static str> {
    match arch {
        "x86_64" => vec!["x86_64", "amd64", "x64"],
        "aarch64" => vec!["aarch64", "arm64"],
        "x86" => vec!["i686", "i386", "x86"],
        "arm" => vec!["armv7", "armhf", "arm32"],
        _ => vec![],
    }
}

pub struct GitHubClient {
    config: Config,
    client: Client,
}

impl ReleaseClient for GitHubClient {
    #[instrument(skip(self))]
    async fn latest_release(&self, owner: &str, repo: &str) -> Result<GitHubRelease> {
        let url = format!("{API_BASE}/repos/{owner}/{repo}/releases/latest");
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(GitHubError::NoReleases(format!("{owner}/{repo}")).into());
            }
            status if !status.is_success() => {
                return Err(GitHubError::Api(format!("{status} for {owner}/{repo}")).into());
            }
            _ => {}
        }

        let json: GitHubReleaseJson = response
            .json()
            .await
            .map_err(GitHubError::from)
            .context("Failed to parse release from GitHub API response")?;
        if json.draft {
            return Err(GitHubError::NoReleases(format!("{owner}/{repo}")).into());
        }

        tracing::debug!("Latest release of {owner}/{repo} is {}", json.tag_name);
        Ok(GitHubRelease::from_json_struct(json))
    }
}

impl Downloader for GitHubClient {
    fn download(&self, url: &str, file_name: &str) -> ProgressStream {
        let request = self.client.get(url);
        let target = self.config.downloads_dir.join(file_name);

        let start = async move {
            let response = request.send().await?;
            if !response.status().is_success() {
                bail!("Download failed: {}", response.status());
            }
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = tokio::fs::File::create(&target)
                .await
                .context(format!("Failed to create {}", target.display()))?;
            tracing::debug!("Downloading to {}", target.display());
            Ok::<_, anyhow::Error>(Transfer {
                total: response.content_length(),
                response,
                file,
                downloaded: 0,
                last_percent: None,
                finished: false,
            })
        };

        stream::once(start)
            .map_ok(|transfer| stream::try_unfold(transfer, Transfer::next_progress))
            .try_flatten()
            .boxed()
    }

    async fn downloaded_file_path(&self, file_name: &str) -> Option<PathBuf> {
        let path = self.config.downloads_dir.join(file_name);
        tokio::fs::try_exists(&path)
            .await
            .ok()
            .filter(|exists| *exists)
            .map(|_| path)
    }

    async fn cancel_download(&self, file_name: &str) -> bool {
        remove_download(&self.config.downloads_dir.join(file_name)).await
    }
}

/// An in-flight asset transfer, advanced one reported percentage at a time.
struct Transfer {
    response: Response,
    file: tokio::fs::File,
    total: Option<u64>,
    downloaded: u64,
    last_percent: Option<u8>,
    finished: bool,
}

impl Transfer {
    async fn next_progress(mut self) -> Result<Option<(u8, Self)>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            match self.response.chunk().await? {
                Some(chunk) => {
                    self.file.write_all(&chunk).await?;
                    self.downloaded += chunk.len() as u64;
                    let percent = self.percent();
                    if self.last_percent != Some(percent) {
                        self.last_percent = Some(percent);
                        return Ok(Some((percent, self)));
                    }
                }
                None => {
                    self.file.flush().await?;
                    self.finished = true;
                    if self.last_percent == Some(100) {
                        return Ok(None);
                    }
                    self.last_percent = Some(100);
                    return Ok(Some((100, self)));
                }
            }
        }
    }

    fn percent(&self) -> u8 {
        match self.total {
            Some(total) if total > 0 => (self.downloaded.saturating_mul(100) / total).min(100) as u8,
            _ => 0,
        }
    }
}

async fn remove_download(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!("Removed download {}", path.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!("Failed to remove download {}: {}", path.display(), e);
            false
        }
    }
}

impl GitHubClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = &config.github_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("GitHub token contains invalid characters")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(concat!("ghstore/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            config: config.clone(),
            client,
        })
    }
}

impl Ord for GitHubRelease {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.version, &other.version)
    }
}

impl PartialOrd for GitHubRelease {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
