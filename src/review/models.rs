//! Data models for notes, sources and imported highlights

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type NoteId = i64;
pub type SourceId = i64;

/// A book or document that highlights were imported from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: SourceId,
    pub title: String,
    /// Where the highlights came from, e.g. "kindle"
    pub origin: String,
    /// Incremented on every note insert
    #[serde(default)]
    pub total_notes: i64,
    /// Whether reviews of this source offer cloze questions
    #[serde(default)]
    pub cloze_enabled: bool,
}

/// A single highlight tracked for spaced review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub source_id: SourceId,
    pub content: String,
    /// Position inside the source, unique per source
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub easiness_factor: Option<f64>,
    /// Absent until the first review; absent means due immediately
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reviewed: Option<DateTime<Utc>>,
    /// Whole days until the next review
    #[serde(default)]
    pub interval: i64,
    #[serde(default)]
    pub review_count: i64,
}

impl Note {
    /// Both halves of the cloze pair are present
    pub fn has_cloze(&self) -> bool {
        matches!(
            (self.question.as_deref(), self.answer.as_deref()),
            (Some(q), Some(a)) if !q.is_empty() && !a.is_empty()
        )
    }

    /// Check if the note is due at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due_date.map_or(true, |due| due <= now)
    }
}

/// Insert payload for a new note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    pub source_id: SourceId,
    pub content: String,
    pub location: String,
}

/// Insert payload for a new source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSource {
    pub title: String,
    pub origin: String,
}

impl NewSource {
    pub fn kindle(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            origin: "kindle".to_string(),
        }
    }
}

/// Partial update applied to a note.
///
/// Outer `None` leaves a column untouched; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteUpdate {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub easiness_factor: Option<Option<f64>>,
    pub next_due_date: Option<Option<DateTime<Utc>>>,
    pub last_reviewed: Option<Option<DateTime<Utc>>>,
    pub interval: Option<i64>,
    pub review_count: Option<i64>,
}

impl NoteUpdate {
    pub fn cloze(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: Some(question.into()),
            answer: Some(answer.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A highlight record produced by an importer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub location: String,
    #[serde(default)]
    pub date_added: Option<DateTime<Utc>>,
    pub content: String,
}

/// Source listing entry with its current due count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    pub source: Source,
    pub due_count: usize,
}
