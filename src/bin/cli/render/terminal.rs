use marginalia::session::{ReviewError, ViewModel};

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
}

fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

/// Render a view with its options numbered from 1
pub fn render_view(view: &ViewModel, use_color: bool) -> String {
    let mut lines: Vec<String> = view.display_text.lines().map(str::to_string).collect();

    if let Some(first) = lines.first_mut() {
        *first = paint(first, Color::BOLD, use_color);
    }

    if view.is_complete {
        lines.push(String::new());
        lines.push(paint("✔ done", Color::GREEN, use_color));
    }

    if !view.keyboard_options.is_empty() {
        lines.push(String::new());
        for (i, option) in view.keyboard_options.iter().enumerate() {
            let number = paint(&format!("[{}]", i + 1), Color::CYAN, use_color);
            lines.push(format!("  {} {}", number, option.label));
        }
    }

    lines.join("\n")
}

pub fn render_error(err: &ReviewError, use_color: bool) -> String {
    let mut text = paint(&err.user_message(), Color::RED, use_color);
    if err.is_retryable() {
        text.push_str(&paint(" (r to retry)", Color::DIM, use_color));
    }
    text
}

/// Prompt shown before reading a choice
pub fn render_prompt(use_color: bool) -> String {
    paint("> ", Color::YELLOW, use_color)
}
