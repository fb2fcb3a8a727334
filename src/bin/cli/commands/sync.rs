use anyhow::Result;

use marginalia::session::Action;

use super::print_view;
use crate::app::App;
use crate::OutputFormat;

pub async fn run(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    log::info!("Syncing highlights from {}", app.config.uploads_dir.display());
    let view = app.handle(Action::Sync).await?;
    print_view(&view, format, use_color)
}
