use crate::github::GitHubRelease;
use anyhow::Result;
use futures_util::stream::BoxStream;
use std::path::PathBuf;
use std::sync::Arc;

/// Download progress in percent (0 to 100). The stream ends when the file is complete.
pub type ProgressStream = BoxStream<'static, Result<u8>>;

/// Fetches release assets into the local downloads directory.
pub trait Downloader: Send + Sync {
    /// Starts downloading `url` to a file called `file_name`. Dropping the
    /// stream stops the transfer at the next chunk.
    fn download(&self, url: &str, file_name: &str) -> ProgressStream;

    /// Location of a completed download, if the file exists.
    fn downloaded_file_path(&self, file_name: &str)
    -> impl Future<Output = Option<PathBuf>> + Send;

    /// Deletes a (possibly partial) download. Returns whether a file was removed.
    fn cancel_download(&self, file_name: &str) -> impl Future<Output = bool> + Send;
}

/// Looks up release metadata for a repository.
pub trait ReleaseClient: Send + Sync {
    fn latest_release(
        &self,
        owner: &str,
        repo: &str,
    ) -> impl Future<Output = Result<GitHubRelease>> + Send;
}

impl<T: Downloader> Downloader for Arc<T> {
    fn download(&self, url: &str, file_name: &str) -> ProgressStream {
        (**self).download(url, file_name)
    }

    fn downloaded_file_path(&self, file_name: &str)
    -> impl Future<Output = Option<PathBuf>> + Send {
        (**self).downloaded_file_path(file_name)
    }

    fn cancel_download(&self, file_name: &str) -> impl Future<Output = bool> + Send {
        (**self).cancel_download(file_name)
    }
}

impl<T: ReleaseClient> ReleaseClient for Arc<T> {
    fn latest_release(
        &self,
        owner: &str,
        repo: &str,
    ) -> impl Future<Output = Result<GitHubRelease>> + Send {
        (**self).latest_release(owner, repo)
    }
}
