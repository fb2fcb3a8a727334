pub mod cloze;
pub mod reset;
pub mod review;
pub mod sync;
pub mod topics;

use anyhow::Result;

use marginalia::session::ViewModel;

use crate::render::{terminal, view_json};
use crate::OutputFormat;

/// Print a view in the requested format
pub fn print_view(view: &ViewModel, format: &OutputFormat, use_color: bool) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view_json(view))?),
        OutputFormat::Plain => println!("{}", terminal::render_view(view, use_color)),
    }
    Ok(())
}
