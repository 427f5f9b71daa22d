//! Update orchestration for the installed-apps view.
//!
//! [`AppsViewModel`] owns an observable [`AppsState`] and a one-shot
//! [`AppsEvent`] queue. It runs one update job per package on tokio tasks,
//! keeps them in a registry keyed by package name, and serialises "update
//! all" runs so only one bulk-driven job is active at a time.
//!
//! Jobs never clean up after themselves when cancelled: whoever cancels a
//! job waits for it to stop, then deletes its partial download and resets
//! the app. Failed jobs clean up on their own.

use crate::config::UpdateTimings;
use crate::download_client::Downloader;
use crate::error::UpdateError;
use crate::installer::Installer;
use crate::models::{AppItem, InstalledApp, InstalledPackageInfo, UpdateAllProgress, UpdateState};
use crate::package_monitor::PackageMonitor;
use crate::platform::file_extension;
use crate::repository::{AppsRepository, InstalledAppsRepository};
use crate::state::{EventSender, StateContainer, event_queue};
use crate::version::normalize_tag;
use futures_util::{FutureExt, StreamExt};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub const NO_UPDATES_AVAILABLE: &str = "No updates available";
pub const ALL_APPS_UPDATED: &str = "All apps updated successfully";
pub const UPDATE_ALL_FAILED: &str = "Failed to update all apps";

/// Everything the apps view renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppsState {
    pub apps: Vec<AppItem>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub search_query: String,
    pub is_updating_all: bool,
    pub update_all_progress: Option<UpdateAllProgress>,
    /// True iff at least one app has an update available.
    pub is_update_all_enabled: bool,
}

impl AppsState {
    pub fn item(&self, package_name: &str) -> Option<&AppItem> {
        self.apps.iter().find(|i| i.package_name() == package_name)
    }

    fn item_mut(&mut self, package_name: &str) -> Option<&mut AppItem> {
        self.apps.iter_mut().find(|i| i.package_name() == package_name)
    }

    /// Items matching the search query by app or package name, case insensitive.
    pub fn filtered_apps(&self) -> Vec<&AppItem> {
        let query = self.search_query.trim().to_lowercase();
        self.apps
            .iter()
            .filter(|item| {
                query.is_empty()
                    || item.app.app_name.to_lowercase().contains(&query)
                    || item.app.package_name.to_lowercase().contains(&query)
            })
            .collect()
    }

    pub fn updates_available(&self) -> usize {
        self.apps.iter().filter(|i| i.app.has_update()).count()
    }

    /// Rebuilds the items from a fresh app list, keeping the transient
    /// update state of packages that were already listed.
    fn replace_apps(&mut self, apps: Vec<InstalledApp>) {
        let mut previous: HashMap<String, AppItem> = std::mem::take(&mut self.apps)
            .into_iter()
            .map(|item| (item.app.package_name.clone(), item))
            .collect();

        self.apps = apps
            .into_iter()
            .map(|app| {
                let prior = previous.remove(&app.package_name);
                AppItem::carry_over(app, prior.as_ref())
            })
            .collect();
        self.is_update_all_enabled = self.apps.iter().any(|i| i.app.has_update());
        self.is_loading = false;
        self.error = None;
    }

    fn clear_update_all(&mut self) {
        self.is_updating_all = false;
        self.update_all_progress = None;
    }
}

/// One-shot notifications for the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppsEvent {
    NavigateBack,
    NavigateToRepository { owner: String, name: String },
    ShowSuccess(String),
    ShowError(String),
}

/// User intents the view forwards to the view-model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppsAction {
    NavigateBack,
    SearchChanged(String),
    OpenApp(String),
    OpenRepository(String),
    UpdateApp(String),
    CancelUpdate(String),
    UpdateAll,
    CancelUpdateAll,
    CheckAllForUpdates,
}

/// External collaborators the view-model drives.
pub struct Collaborators<D, I, R, M> {
    pub downloader: D,
    pub installer: I,
    pub repository: R,
    pub monitor: M,
}

#[derive(Debug, Clone)]
struct UpdateJob {
    id: u64,
    cancel: CancellationToken,
    /// Cancelled when the job's task has stopped, whatever the reason.
    finished: CancellationToken,
}

impl UpdateJob {
    fn new(id: u64) -> Self {
        Self {
            id,
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    /// An entry with no task behind it. Holds a package's slot in the
    /// registry while its files are being removed.
    fn stopped(id: u64) -> Self {
        let job = Self::new(id);
        job.cancel.cancel();
        job.finished.cancel();
        job
    }
}

enum BulkOutcome {
    NothingToUpdate,
    Completed { total: usize, failed: usize },
    Cancelled,
}

pub struct AppsViewModel<D, I, R, M>
where
    D: Downloader + 'static,
    I: Installer + 'static,
    R: AppsRepository + InstalledAppsRepository + 'static,
    M: PackageMonitor + 'static,
{
    inner: Arc<Inner<D, I, R, M>>,
}

struct Inner<D, I, R, M> {
    downloader: D,
    installer: I,
    repository: R,
    monitor: M,
    timings: UpdateTimings,
    state: StateContainer<AppsState>,
    events: EventSender<AppsEvent>,
    event_receiver: Mutex<Option<mpsc::UnboundedReceiver<AppsEvent>>>,
    jobs: Mutex<HashMap<String, UpdateJob>>,
    update_all_job: Mutex<Option<UpdateJob>>,
    next_job_id: AtomicU64,
    started: AtomicBool,
    closed: AtomicBool,
    /// Stops background work that isn't an update job (loading, checks).
    shutdown: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<D, I, R, M> AppsViewModel<D, I, R, M>
where
    D: Downloader + 'static,
    I: Installer + 'static,
    R: AppsRepository + InstalledAppsRepository + 'static,
    M: PackageMonitor + 'static,
{
    pub fn new(collaborators: Collaborators<D, I, R, M>, timings: UpdateTimings) -> Self {
        let (events, event_receiver) = event_queue();
        let inner = Inner {
            downloader: collaborators.downloader,
            installer: collaborators.installer,
            repository: collaborators.repository,
            monitor: collaborators.monitor,
            timings,
            state: StateContainer::new(AppsState::default()),
            events,
            event_receiver: Mutex::new(Some(event_receiver)),
            jobs: Mutex::new(HashMap::new()),
            update_all_job: Mutex::new(None),
            next_job_id: AtomicU64::new(0),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Observes the state. The first call starts loading the app list.
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self) -> watch::Receiver<AppsState> {
        let receiver = self.inner.state.subscribe();
        if !self.inner.started.swap(true, Ordering::SeqCst) {
            self.inner.start_loading();
        }
        receiver
    }

    pub fn snapshot(&self) -> AppsState {
        self.inner.state.snapshot()
    }

    /// Takes the event queue. There is a single consumer; later calls return `None`.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AppsEvent>> {
        lock(&self.inner.event_receiver).take()
    }

    /// Packages with an update job in flight.
    pub fn active_updates(&self) -> Vec<String> {
        let mut packages: Vec<String> = lock(&self.inner.jobs).keys().cloned().collect();
        packages.sort();
        packages
    }

    pub async fn on_action(&self, action: AppsAction) {
        match action {
            AppsAction::NavigateBack => self.on_navigate_back(),
            AppsAction::SearchChanged(query) => self.on_search_query_change(&query),
            AppsAction::OpenApp(package) => self.open_app(&package).await,
            AppsAction::OpenRepository(package) => self.on_open_repository(&package),
            AppsAction::UpdateApp(package) => {
                self.update_app(&package);
            }
            AppsAction::CancelUpdate(package) => {
                self.cancel_update(&package).await;
            }
            AppsAction::UpdateAll => {
                self.update_all();
            }
            AppsAction::CancelUpdateAll => self.cancel_all_updates().await,
            AppsAction::CheckAllForUpdates => self.check_all_for_updates().await,
        }
    }

    pub fn on_navigate_back(&self) {
        self.inner.events.emit(AppsEvent::NavigateBack);
    }

    pub fn on_search_query_change(&self, query: &str) {
        self.inner
            .state
            .update(|state| state.search_query = query.to_string());
    }

    pub fn on_open_repository(&self, package_name: &str) {
        let repo = self.inner.state.read(|state| {
            state
                .item(package_name)
                .map(|i| (i.app.repo_owner.clone(), i.app.repo_name.clone()))
        });
        match repo {
            Some((owner, name)) => self
                .inner
                .events
                .emit(AppsEvent::NavigateToRepository { owner, name }),
            None => tracing::warn!("Can't open repository of unknown package {package_name}"),
        }
    }

    pub async fn open_app(&self, package_name: &str) {
        let Some(app) = self.inner.app(package_name) else {
            tracing::warn!("Can't open unknown package {package_name}");
            return;
        };
        let events = self.inner.events.clone();
        let app_name = app.app_name.clone();
        self.inner
            .repository
            .open_app(&app, move || {
                events.emit(AppsEvent::ShowError(format!("Can't launch {app_name}")));
            })
            .await;
    }

    /// Starts updating one app. Returns false when an update for the
    /// package is already running or the view-model is closed.
    pub fn update_app(&self, package_name: &str) -> bool {
        self.inner.launch_update(package_name).is_some()
    }

    /// Cancels one app's update, deletes its partial download and resets it to idle.
    /// Returns false when no update was running for the package.
    pub async fn cancel_update(&self, package_name: &str) -> bool {
        let job = {
            let jobs = lock(&self.inner.jobs);
            match jobs.get(package_name) {
                Some(job) if !job.cancel.is_cancelled() => {
                    job.cancel.cancel();
                    Some(job.clone())
                }
                _ => None,
            }
        };
        let Some(job) = job else {
            tracing::debug!("No update in progress for {package_name}");
            return false;
        };

        self.inner.settle_cancelled(package_name, &job).await;
        tracing::info!("Update of {package_name} cancelled");
        true
    }

    /// Updates every app with an available update, one after the other.
    /// Returns false when a run is already in progress.
    pub fn update_all(&self) -> bool {
        self.inner.launch_update_all()
    }

    /// Cancels the bulk run and every per-app update, cleaning up all apps
    /// that were mid-update.
    pub async fn cancel_all_updates(&self) {
        self.inner.cancel_everything().await;
        self.inner.state.update(AppsState::clear_update_all);
    }

    /// Refreshes update availability of every tracked app. Failures are logged per app.
    pub async fn check_all_for_updates(&self) {
        let packages: Vec<String> = self.inner.state.read(|state| {
            state
                .apps
                .iter()
                .map(|i| i.package_name().to_string())
                .collect()
        });

        let checks = async {
            for package in &packages {
                if let Err(e) = self.inner.repository.check_for_updates(package).await {
                    tracing::warn!("Failed to check {package} for updates: {e:#}");
                }
            }
        };

        tokio::select! {
            _ = self.inner.shutdown.cancelled() => {}
            _ = checks => {}
        }
    }

    /// Tears down: cancels all work and cleans up every app that was
    /// mid-update. Later calls do nothing.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.cancel_everything().await;
        self.inner.state.update(AppsState::clear_update_all);
    }
}

impl<D, I, R, M> Drop for AppsViewModel<D, I, R, M>
where
    D: Downloader + 'static,
    I: Installer + 'static,
    R: AppsRepository + InstalledAppsRepository + 'static,
    M: PackageMonitor + 'static,
{
    fn drop(&mut self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.cancel();

        let bulk = lock(&self.inner.update_all_job).take();
        let jobs: Vec<UpdateJob> = lock(&self.inner.jobs).drain().map(|(_, job)| job).collect();
        for job in bulk.iter().chain(jobs.iter()) {
            job.cancel.cancel();
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = self.inner.clone();
                handle.spawn(async move {
                    for job in bulk.iter().chain(jobs.iter()) {
                        job.finished.cancelled().await;
                    }
                    inner.cleanup_unsettled().await;
                });
            }
            Err(_) => tracing::warn!("No runtime while dropping the apps view-model, skipping cleanup"),
        }
    }
}

impl<D, I, R, M> Inner<D, I, R, M>
where
    D: Downloader + 'static,
    I: Installer + 'static,
    R: AppsRepository + InstalledAppsRepository + 'static,
    M: PackageMonitor + 'static,
{
    fn start_loading(self: &Arc<Self>) {
        self.state.update(|state| {
            state.is_loading = true;
            state.error = None;
        });

        let inner = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.shutdown.cancelled() => {}
                _ = inner.observe_apps() => {}
            }
        });
    }

    async fn observe_apps(&self) {
        let mut apps = self.repository.get_apps();
        while let Some(result) = apps.next().await {
            match result {
                Ok(apps) => self.state.update(|state| state.replace_apps(apps)),
                Err(e) => {
                    tracing::error!("Failed to load apps: {e:#}");
                    let message = e.to_string();
                    self.state.update(|state| {
                        state.is_loading = false;
                        state.error = Some(message);
                    });
                    return;
                }
            }
        }
    }

    fn app(&self, package_name: &str) -> Option<InstalledApp> {
        self.state
            .read(|state| state.item(package_name).map(|i| i.app.clone()))
    }

    fn update_item(&self, package_name: &str, f: impl FnOnce(&mut AppItem)) {
        self.state.update_if(|state| match state.item_mut(package_name) {
            Some(item) => {
                f(item);
                true
            }
            None => false,
        });
    }

    /// Moves an app to `update_state`. Progress survives only while downloading,
    /// the error message only in the error state.
    fn set_update_state(&self, package_name: &str, update_state: UpdateState) {
        self.update_item(package_name, |item| {
            if update_state != UpdateState::Downloading {
                item.download_progress = None;
            }
            item.error = match &update_state {
                UpdateState::Error(message) => Some(message.clone()),
                _ => None,
            };
            item.update_state = update_state;
        });
    }

    /// Registers and spawns an update job. Returns its completion token,
    /// or `None` if the package already has a job or we are closed.
    fn launch_update(self: &Arc<Self>, package_name: &str) -> Option<CancellationToken> {
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!("Not updating {package_name}, view-model is closed");
            return None;
        }

        let job = {
            let mut jobs = lock(&self.jobs);
            if jobs.contains_key(package_name) {
                tracing::info!("Update already in progress for {package_name}");
                return None;
            }
            let job = UpdateJob::new(self.next_job_id());
            jobs.insert(package_name.to_string(), job.clone());
            job
        };

        let finished = job.finished.clone();
        let inner = self.clone();
        let package_name = package_name.to_string();
        tokio::spawn(async move {
            let _finished = job.finished.clone().drop_guard();
            inner.run_update_job(&package_name, &job).await;
        });
        Some(finished)
    }

    #[instrument(skip(self, job), fields(job_id = job.id))]
    async fn run_update_job(&self, package_name: &str, job: &UpdateJob) {
        let result = tokio::select! {
            biased;
            _ = job.cancel.cancelled() => None,
            result = self.perform_update(package_name) => Some(result),
        };

        match result {
            // The canceller owns cleanup.
            None => tracing::debug!("Update job for {package_name} stopped"),
            Some(Ok(())) => tracing::info!("Updated {package_name}"),
            Some(Err(e)) => {
                tracing::error!("Failed to update {package_name}: {e}");
                self.cleanup(package_name).await;
                let message = e.to_string();
                let app_name = self
                    .app(package_name)
                    .map(|app| app.app_name)
                    .unwrap_or_else(|| package_name.to_string());
                self.set_update_state(package_name, UpdateState::Error(message.clone()));
                self.events.emit(AppsEvent::ShowError(format!(
                    "Failed to update {app_name}: {message}"
                )));
            }
        }

        // A cancelled job stays registered until its canceller has cleaned up.
        // Both sides decide under the registry lock.
        let mut jobs = lock(&self.jobs);
        if !job.cancel.is_cancelled() && jobs.get(package_name).is_some_and(|j| j.id == job.id) {
            jobs.remove(package_name);
        }
    }

    fn next_job_id(&self) -> u64 {
        self.next_job_id.fetch_add(1, Ordering::Relaxed)
    }

    fn release_job(&self, package_name: &str, job_id: u64) {
        let mut jobs = lock(&self.jobs);
        if jobs.get(package_name).is_some_and(|j| j.id == job_id) {
            jobs.remove(package_name);
        }
    }

    /// Waits for a cancelled job to stop, cleans up after it and only then
    /// frees the package for a new update.
    async fn settle_cancelled(&self, package_name: &str, job: &UpdateJob) {
        job.finished.cancelled().await;
        self.cleanup(package_name).await;
        self.set_update_state(package_name, UpdateState::Idle);
        self.release_job(package_name, job.id);
    }

    async fn perform_update(&self, package_name: &str) -> Result<(), UpdateError> {
        self.set_update_state(package_name, UpdateState::CheckingUpdate);

        let app = self.app(package_name).ok_or(UpdateError::NoUpdateInfo)?;
        let (Some(asset_url), Some(asset_name), Some(version)) = (
            app.latest_asset_url.clone(),
            app.latest_asset_name.clone(),
            app.latest_version.clone(),
        ) else {
            return Err(UpdateError::NoUpdateInfo);
        };
        let extension = file_extension(&asset_name);

        self.installer
            .ensure_permissions_or_throw(&extension)
            .await
            .map_err(|e| UpdateError::PermissionDenied {
                extension: extension.clone(),
                reason: format!("{e:#}"),
            })?;

        self.set_update_state(package_name, UpdateState::Downloading);
        self.update_item(package_name, |item| item.download_progress = Some(0));
        let mut progress = self.downloader.download(&asset_url, &asset_name);
        while let Some(percent) = progress.next().await {
            let percent = percent.map_err(|e| UpdateError::DownloadFailed(format!("{e:#}")))?;
            self.update_item(package_name, |item| {
                item.download_progress = Some(percent.min(100));
            });
        }
        drop(progress);

        let path = self
            .downloader
            .downloaded_file_path(&asset_name)
            .await
            .ok_or(UpdateError::DownloadedFileNotFound)?;

        self.set_update_state(package_name, UpdateState::Installing);
        self.record_pending_install(package_name, &version, &asset_name, &asset_url)
            .await;

        self.installer
            .install(&path, &extension)
            .await
            .map_err(|e| UpdateError::InstallFailed(format!("{e:#}")))?;

        let info = self
            .wait_for_installation(package_name, &app.installed_version)
            .await?;
        self.record_installed(package_name, &info, &asset_name, &asset_url)
            .await;

        self.set_update_state(package_name, UpdateState::Success);
        tokio::time::sleep(self.timings.success_hold).await;
        self.set_update_state(package_name, UpdateState::Idle);
        Ok(())
    }

    /// Waits for the OS to report the package at a version other than
    /// `previous_version`, polling until the install timeout runs out.
    async fn wait_for_installation(
        &self,
        package_name: &str,
        previous_version: &str,
    ) -> Result<InstalledPackageInfo, UpdateError> {
        tokio::time::sleep(self.timings.install_grace).await;

        let previous = normalize_tag(previous_version);
        let deadline = Instant::now() + self.timings.install_timeout;
        loop {
            if self.monitor.is_package_installed(package_name).await
                && let Some(info) = self.monitor.get_installed_package_info(package_name).await
            {
                if previous.is_empty() || normalize_tag(&info.version_name) != previous {
                    return Ok(info);
                }
                tracing::debug!(
                    "{package_name} still reported at {}, waiting",
                    info.version_name
                );
            }

            if Instant::now() >= deadline {
                return Err(UpdateError::VerificationTimedOut {
                    timeout: self.timings.install_timeout,
                });
            }
            tokio::time::sleep(self.timings.verify_poll_interval).await;
        }
    }

    /// Records the version being installed and marks it pending, so an
    /// interrupted install leaves a recoverable record. Best effort.
    async fn record_pending_install(
        &self,
        package_name: &str,
        version: &str,
        asset_name: &str,
        asset_url: &str,
    ) {
        if let Err(e) = self
            .repository
            .update_app_version(package_name, version, asset_name, asset_url)
            .await
        {
            tracing::warn!("Failed to record version {version} of {package_name}: {e:#}");
        }
        if let Err(e) = self
            .repository
            .update_pending_status(package_name, true)
            .await
        {
            tracing::warn!("Failed to mark {package_name} as pending: {e:#}");
        }
    }

    /// Clears the pending flag and stores the version the OS reports. Best effort.
    async fn record_installed(
        &self,
        package_name: &str,
        info: &InstalledPackageInfo,
        asset_name: &str,
        asset_url: &str,
    ) {
        if let Err(e) = self
            .repository
            .update_pending_status(package_name, false)
            .await
        {
            tracing::warn!("Failed to clear pending status of {package_name}: {e:#}");
        }
        if let Err(e) = self
            .repository
            .update_app_version(package_name, &info.version_name, asset_name, asset_url)
            .await
        {
            tracing::warn!(
                "Failed to record installed version {} of {package_name}: {e:#}",
                info.version_name
            );
        }
    }

    /// Deletes the app's downloaded asset, if any.
    async fn cleanup(&self, package_name: &str) {
        let asset_name = self
            .app(package_name)
            .and_then(|app| app.latest_asset_name);
        let Some(asset_name) = asset_name else {
            return;
        };
        if self.downloader.cancel_download(&asset_name).await {
            tracing::debug!("Deleted download {asset_name} of {package_name}");
        }
    }

    /// Cleans up and resets every app that is neither idle nor updated.
    /// Apps with a registered job belong to that job's canceller.
    async fn cleanup_unsettled(&self) {
        let reserved: Vec<(String, u64)> = {
            let mut jobs = lock(&self.jobs);
            let unsettled: Vec<String> = self.state.read(|state| {
                state
                    .apps
                    .iter()
                    .filter(|i| !i.update_state.is_settled())
                    .map(|i| i.package_name().to_string())
                    .filter(|package_name| !jobs.contains_key(package_name))
                    .collect()
            });
            unsettled
                .into_iter()
                .map(|package_name| {
                    let marker = UpdateJob::stopped(self.next_job_id());
                    let id = marker.id;
                    jobs.insert(package_name.clone(), marker);
                    (package_name, id)
                })
                .collect()
        };

        for (package_name, id) in reserved {
            self.cleanup(&package_name).await;
            self.set_update_state(&package_name, UpdateState::Idle);
            self.release_job(&package_name, id);
        }
    }

    /// Cancels the bulk run first, so it can't start another job, then every
    /// per-app job; waits for all of them before cleaning up.
    async fn cancel_everything(&self) {
        let bulk = lock(&self.update_all_job).take();
        if let Some(bulk) = bulk {
            bulk.cancel.cancel();
            bulk.finished.cancelled().await;
        }

        // Jobs already being cancelled are settled by whoever cancelled them.
        let jobs: Vec<(String, UpdateJob)> = lock(&self.jobs)
            .iter()
            .filter(|(_, job)| !job.cancel.is_cancelled())
            .map(|(package_name, job)| {
                job.cancel.cancel();
                (package_name.clone(), job.clone())
            })
            .collect();
        for (package_name, job) in &jobs {
            self.settle_cancelled(package_name, job).await;
        }

        self.cleanup_unsettled().await;
    }

    fn launch_update_all(self: &Arc<Self>) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }

        let job = {
            let mut slot = lock(&self.update_all_job);
            if slot.is_some() || self.state.read(|state| state.is_updating_all) {
                tracing::info!("Update all is already running");
                return false;
            }
            let job = UpdateJob::new(self.next_job_id());
            *slot = Some(job.clone());
            job
        };

        self.state.update(|state| {
            state.is_updating_all = true;
            state.update_all_progress = None;
        });

        let inner = self.clone();
        tokio::spawn(async move {
            let _finished = job.finished.clone().drop_guard();
            let outcome = AssertUnwindSafe(inner.run_update_all(&job.cancel))
                .catch_unwind()
                .await;

            match outcome {
                Ok(BulkOutcome::NothingToUpdate) => inner
                    .events
                    .emit(AppsEvent::ShowError(NO_UPDATES_AVAILABLE.to_string())),
                Ok(BulkOutcome::Completed { failed: 0, total }) => {
                    tracing::info!("Updated {total} apps");
                    inner
                        .events
                        .emit(AppsEvent::ShowSuccess(ALL_APPS_UPDATED.to_string()));
                }
                Ok(BulkOutcome::Completed { failed, total }) => {
                    inner.events.emit(AppsEvent::ShowError(format!(
                        "{failed} of {total} updates failed"
                    )));
                }
                Ok(BulkOutcome::Cancelled) => tracing::info!("Update all cancelled"),
                Err(_) => {
                    tracing::error!("Update all aborted unexpectedly");
                    inner
                        .events
                        .emit(AppsEvent::ShowError(UPDATE_ALL_FAILED.to_string()));
                }
            }

            inner.finish_update_all(job.id);
        });
        true
    }

    async fn run_update_all(self: &Arc<Self>, cancel: &CancellationToken) -> BulkOutcome {
        let candidates: Vec<(String, String)> = self.state.read(|state| {
            state
                .apps
                .iter()
                .filter(|i| i.app.has_update() && i.update_state != UpdateState::Success)
                .map(|i| (i.app.package_name.clone(), i.app.app_name.clone()))
                .collect()
        });

        if candidates.is_empty() {
            return BulkOutcome::NothingToUpdate;
        }

        let total = candidates.len();
        let mut failed = 0;
        for (index, (package_name, app_name)) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return BulkOutcome::Cancelled;
            }

            self.state.update(|state| {
                state.update_all_progress = Some(UpdateAllProgress {
                    current: index + 1,
                    total,
                    current_app_name: app_name.clone(),
                });
            });

            // An update started by hand for this app counts as the bulk one.
            let finished = self.launch_update(package_name).or_else(|| {
                lock(&self.jobs)
                    .get(package_name)
                    .map(|job| job.finished.clone())
            });
            let Some(finished) = finished else {
                continue;
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return BulkOutcome::Cancelled,
                _ = finished.cancelled() => {}
            }

            let errored = self.state.read(|state| {
                state
                    .item(package_name)
                    .is_some_and(|i| matches!(i.update_state, UpdateState::Error(_)))
            });
            if errored {
                failed += 1;
            }

            if index + 1 < total {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return BulkOutcome::Cancelled,
                    _ = tokio::time::sleep(self.timings.bulk_pacing) => {}
                }
            }
        }

        BulkOutcome::Completed { total, failed }
    }

    /// Clears bulk state unless a newer run has taken over the slot.
    fn finish_update_all(&self, job_id: u64) {
        let mut slot = lock(&self.update_all_job);
        let current = match slot.as_ref() {
            Some(job) if job.id == job_id => {
                *slot = None;
                true
            }
            Some(_) => false,
            None => true,
        };
        drop(slot);
        if current {
            self.state.update(AppsState::clear_update_all);
        }
    }
}
