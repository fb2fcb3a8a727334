use anyhow::Result;

use marginalia::session::Action;

use super::print_view;
use crate::app::App;
use crate::OutputFormat;

pub async fn run(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let mut view = app.handle(Action::ListTopics).await?;

    // Topic buttons only make sense interactively
    if matches!(format, OutputFormat::Plain) {
        view.keyboard_options.clear();
    }
    print_view(&view, format, use_color)
}
