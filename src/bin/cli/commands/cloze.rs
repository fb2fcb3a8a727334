use anyhow::{Context, Result};

use marginalia::review::ReviewStore;

use crate::app::App;
use crate::OutputFormat;

pub fn run(app: &App, source_query: &str, enabled: bool, format: &OutputFormat) -> Result<()> {
    let source = app.find_source(source_query)?;
    let source = app
        .store
        .set_cloze_enabled(source.id, enabled)
        .context("Failed to update source")?;

    if enabled && app.config.generator.api_key().is_none() {
        log::warn!("Cloze enabled for {} but no generator API key is configured", source.title);
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&source)?);
        }
        OutputFormat::Plain => {
            let state = if source.cloze_enabled { "on" } else { "off" };
            println!("Cloze questions {} for {}", state, source.title);
        }
    }

    Ok(())
}
