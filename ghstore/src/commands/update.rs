use crate::cli::GlobalArgs;
use crate::commands::{Session, ViewModel, loaded, print_event};
use crate::ui;
use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use ghstore_lib::apps::{AppsEvent, AppsState};
use ghstore_lib::logging::progress_bar_style;
use ghstore_lib::models::{UpdateAllProgress, UpdateState};
use ghstore_lib::repository::InstalledAppsRepository;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

#[derive(Args)]
pub struct UpdateCommand {
    /// Package name of the app to update
    pub package: String,

    /// Use the release information from the last check instead of asking GitHub again
    #[arg(long)]
    pub no_check: bool,
}

impl UpdateCommand {
    pub async fn run(self, global_args: GlobalArgs) -> Result<()> {
        let session = Session::open(&global_args)?;
        if !self.no_check {
            session
                .store
                .check_for_updates(&self.package)
                .await
                .context(format!("Failed to check {} for updates", self.package))?;
        }

        let view_model = session.view_model();
        let mut events = view_model
            .take_events()
            .context("App events are already being consumed")?;
        let state = loaded(&view_model).await?;
        let item = state
            .item(&self.package)
            .ok_or_else(|| anyhow!("{} is not tracked", self.package))?;
        if !item.app.has_update() {
            ui::success(&format!(
                "{} is up to date ({})",
                item.app.app_name, item.app.installed_version
            ));
            view_model.close().await;
            return Ok(());
        }
        let app_name = item.app.app_name.clone();

        view_model.update_app(&self.package);
        let outcome = follow(&view_model, &mut events, Scope::App(&self.package)).await;
        view_model.close().await;
        let outcome = outcome?;

        if outcome.cancelled {
            ui::warning(&format!("Update of {app_name} cancelled"));
        } else if outcome.failures.is_empty() {
            let version = session
                .store
                .find(&self.package)
                .map(|app| app.installed_version)
                .unwrap_or_default();
            ui::success(&format!("Updated {app_name} to {version}"));
        } else {
            bail!("Update of {app_name} failed");
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct UpdateAllCommand {
    /// Use the release information from the last check instead of asking GitHub again
    #[arg(long)]
    pub no_check: bool,
}

impl UpdateAllCommand {
    pub async fn run(self, global_args: GlobalArgs) -> Result<()> {
        let session = Session::open(&global_args)?;
        let view_model = session.view_model();
        let mut events = view_model
            .take_events()
            .context("App events are already being consumed")?;
        loaded(&view_model).await?;

        if !self.no_check {
            ui::info("Checking for updates...");
            view_model.check_all_for_updates().await;
            let mut state = view_model.subscribe();
            let expected = session.store.apps();
            // Let the refreshed records reach the view before picking candidates.
            state
                .wait_for(|s| {
                    s.apps.len() == expected.len()
                        && s.apps.iter().zip(&expected).all(|(item, app)| item.app == *app)
                })
                .await?;
        }

        view_model.update_all();
        let outcome = follow(&view_model, &mut events, Scope::All).await;
        view_model.close().await;
        let outcome = outcome?;

        if outcome.cancelled {
            ui::warning("Update all cancelled");
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Scope<'a> {
    App(&'a str),
    All,
}

#[derive(Default)]
struct Outcome {
    cancelled: bool,
    /// App names that ended in an error.
    failures: Vec<String>,
}

/// Renders progress and events until the update(s) finish, or cancels
/// them on Ctrl-C.
async fn follow(
    view_model: &ViewModel,
    events: &mut UnboundedReceiver<AppsEvent>,
    scope: Scope<'_>,
) -> Result<Outcome> {
    let mut state = view_model.subscribe();
    let mut bars = ProgressBars::default();
    let mut outcome = Outcome::default();
    let mut last_progress: Option<UpdateAllProgress> = None;
    // Job completion isn't a state change, so poll for it as well.
    let mut tick = tokio::time::interval(Duration::from_millis(250));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let snapshot = state.borrow_and_update().clone();
        bars.render(&snapshot)?;
        record_failures(&snapshot, &mut outcome);
        if let Scope::All = scope
            && snapshot.update_all_progress.is_some()
            && snapshot.update_all_progress != last_progress
        {
            if let Some(progress) = &snapshot.update_all_progress {
                ui::info(&format!(
                    "[{}/{}] Updating {}",
                    progress.current, progress.total, progress.current_app_name
                ));
            }
            last_progress = snapshot.update_all_progress.clone();
        }

        let finished = match scope {
            Scope::App(package) => !view_model.active_updates().iter().any(|p| p == package),
            Scope::All => !snapshot.is_updating_all,
        };
        if finished {
            break;
        }

        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                match scope {
                    Scope::App(package) => {
                        view_model.cancel_update(package).await;
                    }
                    Scope::All => view_model.cancel_all_updates().await,
                }
                outcome.cancelled = true;
                break;
            }
            changed = state.changed() => changed?,
            Some(event) = events.recv() => print_event(event),
            _ = tick.tick() => {}
        }
    }

    bars.clear();
    while let Ok(event) = events.try_recv() {
        print_event(event);
    }
    Ok(outcome)
}

fn record_failures(state: &AppsState, outcome: &mut Outcome) {
    for item in &state.apps {
        if let UpdateState::Error(_) = item.update_state
            && !outcome.failures.contains(&item.app.app_name)
        {
            outcome.failures.push(item.app.app_name.clone());
        }
    }
}

/// One progress bar span per app with an update in flight.
#[derive(Default)]
struct ProgressBars {
    spans: HashMap<String, Span>,
}

impl ProgressBars {
    fn render(&mut self, state: &AppsState) -> Result<()> {
        for item in &state.apps {
            let package = item.package_name();
            if !item.update_state.is_in_progress() {
                self.spans.remove(package);
                continue;
            }

            if !self.spans.contains_key(package) {
                let span = tracing::info_span!("update", package);
                span.pb_set_style(&progress_bar_style()?);
                span.pb_set_length(100);
                // Bars appear once their span has been entered.
                span.in_scope(|| {});
                self.spans.insert(package.to_string(), span);
            }
            let Some(span) = self.spans.get(package) else {
                continue;
            };
            span.pb_set_message(&format!("{} ({})", item.app.app_name, item.update_state));
            span.pb_set_position(u64::from(item.download_progress.unwrap_or(0)));
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.spans.clear();
    }
}
