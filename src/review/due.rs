//! Due note selection
//!
//! Builds the ordered review queue either for one source or across every
//! source. The store does the coarse filtering; the rules are re-applied here
//! so a queue never holds a note that is due strictly after `now`.

use chrono::{DateTime, Utc};

use super::models::{Note, NoteId, SourceId, SourceSummary};
use super::storage::{Result, ReviewStore};

/// Which notes a queue was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueScope {
    Source(SourceId),
    /// Cron-style daily review across all sources
    Global,
}

/// Ordered note ids due for review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueQueue {
    pub scope: DueScope,
    pub note_ids: Vec<NoteId>,
}

impl DueQueue {
    pub fn len(&self) -> usize {
        self.note_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.note_ids.is_empty()
    }
}

/// Notes of `source_id` never reviewed or due at `now`, ascending by id
pub fn due_for_source<S: ReviewStore + ?Sized>(
    store: &S,
    source_id: SourceId,
    now: DateTime<Utc>,
) -> Result<DueQueue> {
    let notes = store.notes_for_source(source_id, now)?;
    let note_ids = ordered_ids(
        notes
            .iter()
            .filter(|note| note.source_id == source_id && note.is_due(now)),
    );

    log::debug!(
        "{} notes due for source {} at {}",
        note_ids.len(),
        source_id,
        now
    );

    Ok(DueQueue {
        scope: DueScope::Source(source_id),
        note_ids,
    })
}

/// Reviewed notes of every source due at `now`, ascending by id.
///
/// Never-reviewed notes are left to source-scoped sessions.
pub fn due_globally<S: ReviewStore + ?Sized>(store: &S, now: DateTime<Utc>) -> Result<DueQueue> {
    let notes = store.pending_notes(now)?;
    let note_ids = ordered_ids(
        notes
            .iter()
            .filter(|note| note.next_due_date.is_some_and(|due| due <= now)),
    );

    log::debug!("{} notes due across all sources at {}", note_ids.len(), now);

    Ok(DueQueue {
        scope: DueScope::Global,
        note_ids,
    })
}

/// Every source with the number of notes a scoped session would queue now
pub fn source_summaries<S: ReviewStore + ?Sized>(
    store: &S,
    now: DateTime<Utc>,
) -> Result<Vec<SourceSummary>> {
    store
        .list_sources()?
        .into_iter()
        .map(|source| {
            let due_count = due_for_source(store, source.id, now)?.len();
            Ok(SourceSummary { source, due_count })
        })
        .collect()
}

fn ordered_ids<'a>(notes: impl Iterator<Item = &'a Note>) -> Vec<NoteId> {
    let mut ids: Vec<NoteId> = notes.map(|note| note.id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
