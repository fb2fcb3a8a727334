//! Highlight importers
//!
//! `UploadDirImporter` reads the newest upload from a directory of exported
//! highlight files named `upload_<YYYYMMDDHHMMSS>_<name>.json`, each holding a
//! JSON array of highlights.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use regex::Regex;
use thiserror::Error;

use crate::review::Highlight;

const UPLOAD_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Supplies highlight records to the ingestion path
pub trait HighlightImporter: Send + Sync {
    fn load_highlights(&self) -> Result<Vec<Highlight>, ImportError>;
}

/// Reads the most recent upload file from a directory
pub struct UploadDirImporter {
    uploads_dir: PathBuf,
}

impl UploadDirImporter {
    pub fn new(uploads_dir: PathBuf) -> Self {
        Self { uploads_dir }
    }

    /// Newest file matching the upload naming scheme, if any
    pub fn latest_upload(&self) -> Result<Option<PathBuf>, ImportError> {
        if !self.uploads_dir.exists() {
            log::warn!("Uploads directory {:?} does not exist", self.uploads_dir);
            return Ok(None);
        }

        let mut latest: Option<(NaiveDateTime, PathBuf)> = None;
        for entry in fs::read_dir(&self.uploads_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let Some(stamp) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(upload_timestamp)
            else {
                continue;
            };

            if latest.as_ref().map_or(true, |(best, _)| stamp > *best) {
                latest = Some((stamp, path));
            }
        }

        Ok(latest.map(|(_, path)| path))
    }
}

impl HighlightImporter for UploadDirImporter {
    fn load_highlights(&self) -> Result<Vec<Highlight>, ImportError> {
        let Some(path) = self.latest_upload()? else {
            log::info!("No highlight uploads found in {:?}", self.uploads_dir);
            return Ok(Vec::new());
        };

        let highlights = read_highlights(&path)?;
        log::info!("Loaded {} highlights from {:?}", highlights.len(), path);
        Ok(highlights)
    }
}

/// Parse a JSON array of highlights from `path`
pub fn read_highlights(path: &Path) -> Result<Vec<Highlight>, ImportError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| ImportError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Timestamp encoded in an upload file name
fn upload_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let re = Regex::new(r"^upload_(\d{14})_.+\.json$").ok()?;
    let caps = re.captures(file_name)?;
    NaiveDateTime::parse_from_str(&caps[1], UPLOAD_TIMESTAMP_FORMAT).ok()
}
