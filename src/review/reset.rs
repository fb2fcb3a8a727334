//! Bulk reset of a source's review progress

use super::models::{Source, SourceId};
use super::storage::{Result, ReviewStore};

/// Clears due date, last review, interval, easiness and review count on every
/// note of the source.
///
/// Returns the source with the number of notes touched. Running it again on an
/// already reset source touches the same notes and reports the same count.
/// Fails with `SourceNotFound` for an unknown source.
pub fn reset_source<S: ReviewStore + ?Sized>(
    store: &S,
    source_id: SourceId,
) -> Result<(Source, usize)> {
    let source = store.get_source(source_id)?;
    let affected = store.reset_source(source.id)?;

    log::info!(
        "Reset review progress of source {} ({}): {} notes",
        source.id,
        source.title,
        affected
    );

    Ok((source, affected))
}
