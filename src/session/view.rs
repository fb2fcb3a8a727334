//! View models returned to the front end

use super::action::Action;
use crate::highlights::SyncReport;
use crate::review::{Note, NoteId, Source, SourceSummary};

/// Rating buttons shown under every note, best recall first
pub const RATING_BUTTONS: [(&str, i32); 6] = [
    ("Perfect", 5),
    ("Some Hesitation", 4),
    ("With Difficulty", 3),
    ("Wrong Recalled", 2),
    ("Wrong Remembered When Shown", 1),
    ("Complete Blackout", 0),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardOption {
    pub label: String,
    pub action: Action,
}

impl KeyboardOption {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }

    /// Callback payload for this option
    pub fn payload(&self) -> String {
        self.action.encode()
    }
}

/// What the front end renders after each action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewModel {
    pub display_text: String,
    pub keyboard_options: Vec<KeyboardOption>,
    pub is_complete: bool,
}

impl ViewModel {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            display_text: text.into(),
            keyboard_options: Vec::new(),
            is_complete: false,
        }
    }

    fn with_options(mut self, options: Vec<KeyboardOption>) -> Self {
        self.keyboard_options = options;
        self
    }

    pub fn source_selected(source: &Source) -> Self {
        Self::message(format!(
            "📚 Selected Book\n━━━━━━━━━━━━━━\nTitle: {}\nNotes: {}",
            source.title, source.total_notes
        ))
        .with_options(vec![
            KeyboardOption::new("Start Review", Action::ConfirmCloze(false)),
            KeyboardOption::new("Reset", Action::Reset(source.id)),
        ])
    }

    pub fn cloze_prompt(source: &Source) -> Self {
        Self::message(format!(
            "📚 Selected Book\n━━━━━━━━━━━━━━\nTitle: {}\nNotes: {}\n\nReview with cloze questions or plain notes?",
            source.title, source.total_notes
        ))
        .with_options(vec![
            KeyboardOption::new("Cloze Questions", Action::ConfirmCloze(true)),
            KeyboardOption::new("Plain Notes", Action::ConfirmCloze(false)),
            KeyboardOption::new("Reset", Action::Reset(source.id)),
        ])
    }

    /// A note under review; `position` is zero-based
    pub fn note(note: &Note, position: usize, total: usize, source_title: &str, cloze: bool) -> Self {
        let body = match (cloze, note.question.as_deref(), note.answer.as_deref()) {
            (true, Some(question), Some(answer)) => {
                format!("❓ {}\n\n💡 Answer: {}", question, answer)
            }
            _ => note.content.clone(),
        };

        Self::message(format!(
            "📝 Note #{}/{}\n\n{}\n\n📚 From: {}",
            position + 1,
            total,
            body,
            source_title
        ))
        .with_options(rating_options(note.id))
    }

    pub fn complete(reviewed: usize) -> Self {
        let text = if reviewed == 0 {
            "No notes left to review today!".to_string()
        } else {
            format!("Review complete! {} notes reviewed.", reviewed)
        };
        Self {
            display_text: text,
            keyboard_options: Vec::new(),
            is_complete: true,
        }
    }

    pub fn topics(summaries: &[SourceSummary]) -> Self {
        if summaries.is_empty() {
            return Self::message("No topics yet. Sync highlights first.").with_options(vec![
                KeyboardOption::new("Sync", Action::Sync),
            ]);
        }

        let lines: Vec<String> = summaries
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!(
                    "{}) {} ({} notes, {} due)",
                    i + 1,
                    s.source.title,
                    s.source.total_notes,
                    s.due_count
                )
            })
            .collect();

        let options = summaries
            .iter()
            .map(|s| KeyboardOption::new(short_title(&s.source.title), Action::SelectSource(s.source.id)))
            .collect();

        Self::message(format!("Please choose a Title:\n{}", lines.join("\n"))).with_options(options)
    }

    pub fn synced(report: &SyncReport) -> Self {
        let mut text = format!(
            "All notes synced: {} new, {} already known",
            report.inserted, report.skipped
        );
        if report.failed > 0 {
            text.push_str(&format!(", {} failed", report.failed));
        }
        Self::message(text).with_options(vec![KeyboardOption::new("List Topics", Action::ListTopics)])
    }

    pub fn reset_done(source_title: &str, affected: usize) -> Self {
        Self::message(format!(
            "Review progress reset for {} ({} notes)",
            source_title, affected
        ))
    }

    /// Daily prompt sent by an external timer
    pub fn scheduled_prompt() -> Self {
        Self::message("Ready to start today's review?").with_options(vec![KeyboardOption::new(
            "Start Review",
            Action::StartScheduledReview,
        )])
    }
}

pub fn rating_options(note_id: NoteId) -> Vec<KeyboardOption> {
    RATING_BUTTONS
        .iter()
        .map(|(label, score)| {
            KeyboardOption::new(
                *label,
                Action::SubmitRating {
                    note_id,
                    score: *score,
                },
            )
        })
        .collect()
}

/// Kindle titles often carry a subtitle after a colon
fn short_title(title: &str) -> &str {
    title.split(':').next().unwrap_or(title).trim()
}
