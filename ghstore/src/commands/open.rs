use crate::cli::GlobalArgs;
use crate::commands::{Session, loaded, print_event};
use anyhow::{Context, Result, bail};
use clap::Args;
use ghstore_lib::apps::AppsEvent;

#[derive(Args)]
pub struct OpenCommand {
    /// Package name of the app
    pub package: String,

    /// Print the app's GitHub repository instead of launching it
    #[arg(long)]
    pub repo: bool,
}

impl OpenCommand {
    pub async fn run(self, global_args: GlobalArgs) -> Result<()> {
        let session = Session::open(&global_args)?;
        let view_model = session.view_model();
        let mut events = view_model
            .take_events()
            .context("App events are already being consumed")?;
        let state = loaded(&view_model).await?;
        if state.item(&self.package).is_none() {
            bail!("{} is not tracked", self.package);
        }

        if self.repo {
            view_model.on_open_repository(&self.package);
        } else {
            view_model.open_app(&self.package).await;
        }
        view_model.close().await;

        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            failed |= matches!(event, AppsEvent::ShowError(_));
            print_event(event);
        }
        if failed {
            bail!("Failed to open {}", self.package);
        }
        Ok(())
    }
}
