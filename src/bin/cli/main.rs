mod app;
mod commands;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "marginalia-cli", about = "Spaced review of reading highlights", version)]
struct Cli {
    /// Path to config.toml (default: <config dir>/marginalia/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
enum Command {
    /// Import the newest highlight upload
    Sync,

    /// List sources with their note and due counts
    Topics,

    /// Review the due notes of one source
    Review {
        /// Source id or title (case-insensitive prefix match)
        source: String,
    },

    /// Daily review of everything due across sources
    Scheduled,

    /// Clear the review progress of a source
    Reset {
        /// Source id or title (case-insensitive prefix match)
        source: String,
    },

    /// Turn cloze questions on or off for a source
    Cloze {
        /// Source id or title (case-insensitive prefix match)
        source: String,
        state: Toggle,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && std::io::stdout().is_terminal();

    let app = app::App::new(cli.config.as_deref())?;

    match cli.command {
        Command::Sync => commands::sync::run(&app, &cli.format, use_color).await?,
        Command::Topics => commands::topics::run(&app, &cli.format, use_color).await?,
        Command::Review { source } => {
            commands::review::run(&app, &source, &cli.format, use_color).await?
        }
        Command::Scheduled => commands::review::run_scheduled(&app, &cli.format, use_color).await?,
        Command::Reset { source } => {
            commands::reset::run(&app, &source, &cli.format, use_color).await?
        }
        Command::Cloze { source, state } => {
            commands::cloze::run(&app, &source, matches!(state, Toggle::On), &cli.format)?
        }
    }

    Ok(())
}
