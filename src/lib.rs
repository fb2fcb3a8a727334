//! Spaced-repetition review of reading highlights.
//!
//! - `review`: notes, sources, scheduling, due selection and the store
//! - `cloze`: fill-in-the-blank questions generated once per note
//! - `highlights`: importing and de-duplicating highlight exports
//! - `session`: the per-identity review state machine driven by front-end actions
//! - `config`: file and environment configuration

pub mod cloze;
pub mod config;
pub mod highlights;
pub mod review;
pub mod session;
