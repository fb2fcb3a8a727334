use std::io::{self, BufRead, Write};

use anyhow::Result;

use marginalia::session::{Action, ViewModel};

use super::print_view;
use crate::app::App;
use crate::render::terminal;
use crate::OutputFormat;

/// Select a source and walk through its due notes
pub async fn run(app: &App, source_query: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let source = app.find_source(source_query)?;
    let view = app.handle(Action::SelectSource(source.id)).await?;
    interact(app, view, format, use_color).await
}

/// Show the daily prompt and review everything due across sources
pub async fn run_scheduled(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    interact(app, app.manager.scheduled_prompt(), format, use_color).await
}

/// Read choices from stdin until the review completes or input ends.
///
/// A number picks the matching option, `r` resumes the current note, `q`
/// quits; anything else is decoded as a raw action payload.
async fn interact(app: &App, mut view: ViewModel, format: &OutputFormat, use_color: bool) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print_view(&view, format, use_color)?;
        if view.is_complete || view.keyboard_options.is_empty() {
            return Ok(());
        }

        print!("{}", terminal::render_prompt(use_color));
        io::stdout().flush()?;

        let Some(line) = lines.next().transpose()? else {
            return Ok(());
        };

        let action = match choose(&view, line.trim()) {
            Choice::Quit => return Ok(()),
            Choice::Action(action) => action,
            Choice::Invalid => {
                println!("Pick an option between 1 and {}", view.keyboard_options.len());
                continue;
            }
        };

        match app.handle(action).await {
            Ok(next) => view = next,
            Err(e) => {
                log::debug!("Action {} failed: {:?}", action, e);
                eprintln!("{}", terminal::render_error(&e, use_color));
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum Choice {
    Quit,
    Action(Action),
    Invalid,
}

fn choose(view: &ViewModel, input: &str) -> Choice {
    match input {
        "q" | "quit" => Choice::Quit,
        "r" => Choice::Action(Action::Resume),
        _ => {
            if let Ok(n) = input.parse::<usize>() {
                return n
                    .checked_sub(1)
                    .and_then(|i| view.keyboard_options.get(i))
                    .map_or(Choice::Invalid, |option| Choice::Action(option.action));
            }
            Action::decode(input).map_or(Choice::Invalid, Choice::Action)
        }
    }
}
