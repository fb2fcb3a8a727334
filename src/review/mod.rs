//! Spaced review of imported highlights
//!
//! This module provides:
//! - Note and source models
//! - The review scheduling algorithm
//! - SQLite-backed note/source storage
//! - Due note selection (per source and global)
//! - Bulk reset of a source's review progress

pub mod algorithm;
pub mod due;
pub mod models;
pub mod reset;
pub mod storage;

pub use models::*;
pub use storage::{ReviewStore, SqliteReviewStore, StoreError};
