//! Fill-in-the-blank questions for notes
//!
//! - `generator`: the question generation boundary and its HTTP implementation
//! - `gate`: generate-once cache that persists the pair onto the note

pub mod gate;
pub mod generator;

pub use gate::{ClozeError, ClozeGate, DEFAULT_GENERATOR_TIMEOUT};
pub use generator::{ClozeQa, DisabledGenerator, GeneratorError, OpenAiGenerator, QuestionGenerator};
