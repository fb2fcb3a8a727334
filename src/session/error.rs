//! Errors reported back to the front end

use thiserror::Error;

use super::action::MalformedAction;
use crate::cloze::ClozeError;
use crate::highlights::ImportError;
use crate::review::algorithm::ScheduleError;
use crate::review::StoreError;

pub type IdentityId = i64;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid score {0}: expected a value between 0 and 5")]
    InvalidScore(i32),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {message}")]
    ExternalService { message: String, retryable: bool },

    #[error("Cannot {action} while {state}")]
    State {
        action: &'static str,
        state: &'static str,
    },

    #[error("Identity {0} is not authorized")]
    Unauthorized(IdentityId),
}

pub type Result<T> = std::result::Result<T, ReviewError>;

impl ReviewError {
    /// Whether the front end may re-drive the same action
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalService { retryable: true, .. })
    }

    /// Short text suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(what) => format!("Could not find {}", what),
            Self::InvalidScore(_) | Self::InvalidInput(_) => "Got invalid response".to_string(),
            Self::ExternalService { retryable: true, .. } => {
                "Something went wrong, please try again".to_string()
            }
            Self::ExternalService { .. } => "Something went wrong while processing review".to_string(),
            Self::State { .. } => "That action is not available right now, please restart the review".to_string(),
            Self::Unauthorized(_) => "Not authorized".to_string(),
        }
    }
}

impl From<StoreError> for ReviewError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SourceNotFound(id) => Self::NotFound(format!("source {}", id)),
            StoreError::NoteNotFound(id) => Self::NotFound(format!("note {}", id)),
            other => Self::ExternalService {
                message: other.to_string(),
                retryable: true,
            },
        }
    }
}

impl From<ScheduleError> for ReviewError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::InvalidScore(score) => Self::InvalidScore(score),
        }
    }
}

impl From<ClozeError> for ReviewError {
    fn from(err: ClozeError) -> Self {
        match err {
            ClozeError::Store(store) => store.into(),
            other => Self::ExternalService {
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }
}

impl From<ImportError> for ReviewError {
    fn from(err: ImportError) -> Self {
        Self::ExternalService {
            retryable: matches!(err, ImportError::Io(_)),
            message: err.to_string(),
        }
    }
}

impl From<MalformedAction> for ReviewError {
    fn from(err: MalformedAction) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
