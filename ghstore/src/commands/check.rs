use crate::cli::GlobalArgs;
use crate::commands::{Session, loaded};
use crate::ui;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use ghstore_lib::logging::spinner_style;
use tracing::Instrument;
use tracing_indicatif::span_ext::IndicatifSpanExt;

#[derive(Args)]
pub struct CheckCommand {}

impl CheckCommand {
    pub async fn run(self, global_args: GlobalArgs) -> Result<()> {
        let session = Session::open(&global_args)?;
        let view_model = session.view_model();
        let state = loaded(&view_model).await?;
        if state.apps.is_empty() {
            ui::info("No apps tracked yet");
            view_model.close().await;
            return Ok(());
        }

        let span = tracing::info_span!("check");
        span.pb_set_style(&spinner_style("{msg}")?);
        span.pb_set_message(&format!("Checking {} app(s) for updates...", state.apps.len()));
        view_model.check_all_for_updates().instrument(span).await;
        view_model.close().await;

        let updates: Vec<_> = session
            .store
            .apps()
            .into_iter()
            .filter(|app| app.has_update())
            .collect();
        if updates.is_empty() {
            ui::success("All apps are up to date");
            return Ok(());
        }

        for app in &updates {
            ui::info(&format!(
                "  {} {} → {}",
                app.app_name.bold(),
                app.installed_version,
                app.latest_version.as_deref().unwrap_or_default().green()
            ));
        }
        ui::tip("Run `ghstore update-all` to install them");
        Ok(())
    }
}
