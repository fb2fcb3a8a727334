//! Highlight import
//!
//! Importers supply highlight records; ingestion turns the unseen ones into
//! notes.

pub mod importer;
pub mod ingest;

pub use importer::{HighlightImporter, ImportError, UploadDirImporter};
pub use ingest::{ingest_highlights, sync_highlights, SyncReport};
