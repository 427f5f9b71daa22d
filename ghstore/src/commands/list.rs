use crate::cli::GlobalArgs;
use crate::commands::{Session, loaded};
use crate::ui;
use anyhow::Result;
use chrono::Local;
use clap::Args;
use colored::Colorize;
use ghstore_lib::models::AppItem;

#[derive(Args)]
pub struct ListCommand {
    /// Filter apps by name or package name
    pub query: Option<String>,

    /// Only show apps with an update available
    #[arg(long)]
    pub updates: bool,
}

impl ListCommand {
    pub async fn run(self, global_args: GlobalArgs) -> Result<()> {
        let session = Session::open(&global_args)?;
        let view_model = session.view_model();
        loaded(&view_model).await?;

        if let Some(query) = &self.query {
            view_model.on_search_query_change(query);
        }
        let state = view_model.snapshot();
        let apps: Vec<&AppItem> = state
            .filtered_apps()
            .into_iter()
            .filter(|item| !self.updates || item.app.has_update())
            .collect();

        if state.apps.is_empty() {
            ui::info("No apps tracked yet");
            ui::tip("Run `ghstore track <owner/repo> <package>` to add one");
        } else if apps.is_empty() {
            ui::info("No apps match");
        } else {
            for item in apps {
                ui::info(&format_app(item));
            }
        }

        if state.is_update_all_enabled {
            tracing::info!("");
            ui::tip(&format!(
                "{} update(s) available. Run `ghstore update-all` to install them",
                state.updates_available()
            ));
        }

        view_model.close().await;
        Ok(())
    }
}

fn format_app(item: &AppItem) -> String {
    let app = &item.app;
    let installed = if app.installed_version.is_empty() {
        "not installed".to_string()
    } else {
        app.installed_version.clone()
    };

    let mut line = format!(
        "  {} {} {}",
        app.app_name.bold(),
        format!("({})", app.package_name).dimmed(),
        installed
    );
    if app.has_update()
        && let Some(latest) = &app.latest_version
    {
        line.push_str(&format!(" {}", format!("→ {latest}").green()));
    }
    if app.is_pending_install {
        line.push_str(&format!(" {}", "(install pending)".yellow()));
    }
    if let Some(checked) = app.last_checked_at {
        let checked = checked.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        line.push_str(&format!(" {}", format!("checked {checked}").dimmed()));
    }
    line
}
