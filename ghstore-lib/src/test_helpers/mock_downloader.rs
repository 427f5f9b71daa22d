use super::MOCK_LATENCY;
use crate::download_client::{Downloader, ProgressStream};
use anyhow::anyhow;
use futures_util::{StreamExt, stream};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const PROGRESS_STEPS: [u8; 4] = [25, 50, 75, 100];

#[derive(Default)]
struct Behaviour {
    hang_after: Option<usize>,
    fail_after: Option<(usize, String)>,
    skip_file_creation: bool,
}

/// Writes empty files into a temporary directory and reports canned progress.
pub struct MockDownloader {
    dir: TempDir,
    behaviour: Mutex<Behaviour>,
    downloads: AtomicUsize,
    cancelled: Mutex<Vec<String>>,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create download dir"),
            behaviour: Mutex::new(Behaviour::default()),
            downloads: AtomicUsize::new(0),
            cancelled: Mutex::new(vec![]),
        }
    }

    /// Reports `steps` progress values, then never finishes.
    pub fn hang_after(&self, steps: usize) {
        self.behaviour.lock().unwrap().hang_after = Some(steps);
    }

    pub fn fail_after(&self, steps: usize, message: &str) {
        self.behaviour.lock().unwrap().fail_after = Some((steps, message.to_string()));
    }

    /// Completes downloads without leaving a file behind.
    pub fn skip_file_creation(&self) {
        self.behaviour.lock().unwrap().skip_file_creation = true;
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// File names passed to `cancel_download`, in call order.
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn file_exists(&self, file_name: &str) -> bool {
        self.dir.path().join(file_name).exists()
    }
}

impl Downloader for MockDownloader {
    fn download(&self, _url: &str, file_name: &str) -> ProgressStream {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.behaviour.lock().unwrap();
        if !behaviour.skip_file_creation {
            std::fs::write(self.dir.path().join(file_name), b"").unwrap();
        }

        let step_count = behaviour
            .hang_after
            .or(behaviour.fail_after.as_ref().map(|(steps, _)| *steps))
            .unwrap_or(PROGRESS_STEPS.len());
        let steps = stream::iter(PROGRESS_STEPS.into_iter().take(step_count)).then(|percent| async move {
            tokio::time::sleep(MOCK_LATENCY).await;
            Ok::<u8, anyhow::Error>(percent)
        });

        if behaviour.hang_after.is_some() {
            steps.chain(stream::pending()).boxed()
        } else if let Some((_, message)) = behaviour.fail_after.clone() {
            steps
                .chain(stream::once(async move { Err(anyhow!(message)) }))
                .boxed()
        } else {
            steps.boxed()
        }
    }

    async fn downloaded_file_path(&self, file_name: &str) -> Option<PathBuf> {
        tokio::time::sleep(MOCK_LATENCY).await;
        let path = self.dir.path().join(file_name);
        path.exists().then_some(path)
    }

    async fn cancel_download(&self, file_name: &str) -> bool {
        self.cancelled.lock().unwrap().push(file_name.to_string());
        std::fs::remove_file(self.dir.path().join(file_name)).is_ok()
    }
}
