//! Front-end actions
//!
//! Callback payloads are decoded once into [`Action`] at the boundary; the
//! session manager only ever sees the typed value.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::review::{NoteId, SourceId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed action payload: {0:?}")]
pub struct MalformedAction(pub String);

/// The closed set of things a user can ask the review core to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SelectSource(SourceId),
    /// Start reviewing the selected source, with or without cloze questions
    ConfirmCloze(bool),
    SubmitRating { note_id: NoteId, score: i32 },
    Reset(SourceId),
    Sync,
    ListTopics,
    StartScheduledReview,
    /// Re-render the note at the cursor
    Resume,
}

impl Action {
    /// Decode a compact callback payload such as `review_12_4`
    pub fn decode(payload: &str) -> Result<Self, MalformedAction> {
        let malformed = || MalformedAction(payload.to_string());
        let payload = payload.trim();

        let action = match payload {
            "cloze_on" => Self::ConfirmCloze(true),
            "cloze_off" => Self::ConfirmCloze(false),
            "sync" => Self::Sync,
            "topics" => Self::ListTopics,
            "start_scheduled" => Self::StartScheduledReview,
            "resume" => Self::Resume,
            _ => {
                let (kind, rest) = payload.split_once('_').ok_or_else(malformed)?;
                match kind {
                    "select" => Self::SelectSource(parse_id(rest).ok_or_else(malformed)?),
                    "reset" => Self::Reset(parse_id(rest).ok_or_else(malformed)?),
                    "review" => {
                        let (note, score) = rest.split_once('_').ok_or_else(malformed)?;
                        Self::SubmitRating {
                            note_id: parse_id(note).ok_or_else(malformed)?,
                            score: score.parse().map_err(|_| malformed())?,
                        }
                    }
                    _ => return Err(malformed()),
                }
            }
        };

        Ok(action)
    }

    pub fn encode(&self) -> String {
        match self {
            Self::SelectSource(id) => format!("select_{}", id),
            Self::ConfirmCloze(true) => "cloze_on".to_string(),
            Self::ConfirmCloze(false) => "cloze_off".to_string(),
            Self::SubmitRating { note_id, score } => format!("review_{}_{}", note_id, score),
            Self::Reset(id) => format!("reset_{}", id),
            Self::Sync => "sync".to_string(),
            Self::ListTopics => "topics".to_string(),
            Self::StartScheduledReview => "start_scheduled".to_string(),
            Self::Resume => "resume".to_string(),
        }
    }

    /// Short name used in logs and state errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectSource(_) => "select source",
            Self::ConfirmCloze(_) => "confirm cloze",
            Self::SubmitRating { .. } => "submit rating",
            Self::Reset(_) => "reset",
            Self::Sync => "sync",
            Self::ListTopics => "list topics",
            Self::StartScheduledReview => "start scheduled review",
            Self::Resume => "resume",
        }
    }
}

impl FromStr for Action {
    type Err = MalformedAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Ids are positive integers; anything else is a malformed payload
fn parse_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}
