//! Highlight ingestion
//!
//! `(title, location)` identifies a highlight. Highlights already stored as a
//! note are skipped; the rest are inserted, creating the source on first sight
//! of its title.

use serde::Serialize;

use super::importer::{HighlightImporter, ImportError};
use crate::review::{Highlight, NewNote, NewSource, ReviewStore, SourceId, StoreError};

/// Outcome of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub sources_created: usize,
}

/// Load highlights from `importer` and ingest them into `store`
pub fn sync_highlights<S, I>(store: &S, importer: &I) -> Result<SyncReport, ImportError>
where
    S: ReviewStore + ?Sized,
    I: HighlightImporter + ?Sized,
{
    let highlights = importer.load_highlights()?;
    Ok(ingest_highlights(store, &highlights))
}

/// Insert every highlight not yet represented by a note.
///
/// A store failure on one highlight is logged and counted; the run continues
/// with the next one.
pub fn ingest_highlights<S: ReviewStore + ?Sized>(store: &S, highlights: &[Highlight]) -> SyncReport {
    let mut report = SyncReport::default();

    for highlight in highlights {
        match ingest_one(store, highlight, &mut report) {
            Ok(true) => report.inserted += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                log::warn!(
                    "Failed to ingest highlight {} from {}: {}",
                    highlight.location,
                    highlight.title,
                    e
                );
                report.failed += 1;
            }
        }
    }

    log::info!(
        "Highlight sync: {} inserted, {} skipped, {} failed, {} new sources",
        report.inserted,
        report.skipped,
        report.failed,
        report.sources_created
    );
    report
}

fn ingest_one<S: ReviewStore + ?Sized>(
    store: &S,
    highlight: &Highlight,
    report: &mut SyncReport,
) -> Result<bool, StoreError> {
    if store.note_exists(&highlight.title, &highlight.location)? {
        return Ok(false);
    }

    let source_id = ensure_source(store, &highlight.title, report)?;
    store.create_note(&NewNote {
        source_id,
        content: highlight.content.clone(),
        location: highlight.location.clone(),
    })?;
    Ok(true)
}

fn ensure_source<S: ReviewStore + ?Sized>(
    store: &S,
    title: &str,
    report: &mut SyncReport,
) -> Result<SourceId, StoreError> {
    if let Some(source) = store.find_source_by_title(title)? {
        return Ok(source.id);
    }

    log::info!("No source titled {:?} found, creating it", title);
    let source = store.create_source(&NewSource::kindle(title))?;
    report.sources_created += 1;
    Ok(source.id)
}
