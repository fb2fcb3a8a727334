use anyhow::Result;

use marginalia::session::Action;

use super::print_view;
use crate::app::App;
use crate::OutputFormat;

pub async fn run(app: &App, source_query: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let source = app.find_source(source_query)?;
    let view = app.handle(Action::Reset(source.id)).await?;
    print_view(&view, format, use_color)
}
