//! Cloze cache gate
//!
//! A note's question/answer pair is generated at most once and then stored on
//! the note. Later reviews read the stored pair without calling the generator.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;

use super::generator::{GeneratorError, QuestionGenerator};
use crate::review::{Note, NoteUpdate, ReviewStore, StoreError};

pub const DEFAULT_GENERATOR_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Error, Debug)]
pub enum ClozeError {
    #[error("Question generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Question generation failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl ClozeError {
    /// Whether re-driving the same action may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Store(_) => true,
            Self::Generator(GeneratorError::Http(_)) => true,
            Self::Generator(GeneratorError::Api { status, .. }) => *status == 429 || *status >= 500,
            Self::Generator(_) => false,
        }
    }
}

pub struct ClozeGate<S: ReviewStore + ?Sized, G: QuestionGenerator + ?Sized> {
    store: Arc<S>,
    generator: Arc<G>,
    timeout: Duration,
    /// Serialises fills so two callers never generate for the same note
    fill_lock: Mutex<()>,
}

impl<S: ReviewStore + ?Sized, G: QuestionGenerator + ?Sized> ClozeGate<S, G> {
    pub fn new(store: Arc<S>, generator: Arc<G>, timeout: Duration) -> Self {
        Self {
            store,
            generator,
            timeout,
            fill_lock: Mutex::new(()),
        }
    }

    /// Returns the note with its question/answer pair populated.
    ///
    /// A note that already carries a pair is returned unchanged. Otherwise the
    /// generator runs once under the configured timeout and the pair is
    /// persisted before the updated note is returned. Failures leave the note
    /// untouched.
    pub async fn ensure_cloze(&self, note: Note) -> Result<Note, ClozeError> {
        if note.has_cloze() {
            return Ok(note);
        }

        let _guard = self.fill_lock.lock().await;

        // Another caller may have filled the pair since `note` was read
        let stored = self.store.get_note(note.id)?;
        if stored.has_cloze() {
            log::debug!("Cloze pair for note {} already stored", stored.id);
            return Ok(stored);
        }

        log::info!("Generating cloze pair for note {}", stored.id);
        let qa = tokio::time::timeout(self.timeout, self.generator.generate_cloze(&stored.content))
            .await
            .map_err(|_| {
                log::warn!(
                    "Cloze generation for note {} timed out after {:?}",
                    stored.id,
                    self.timeout
                );
                ClozeError::Timeout(self.timeout)
            })?
            .inspect_err(|e| log::warn!("Cloze generation for note {} failed: {}", stored.id, e))?;

        let updated = self
            .store
            .update_note(stored.id, &NoteUpdate::cloze(qa.question, qa.answer))?;
        Ok(updated)
    }
}
