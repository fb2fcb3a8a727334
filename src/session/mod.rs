//! Review sessions
//!
//! - `action`: typed front-end actions and their callback payload codec
//! - `view`: view models returned for rendering
//! - `manager`: the per-identity review state machine
//! - `error`: the user-facing error taxonomy

pub mod action;
pub mod error;
pub mod manager;
pub mod view;

pub use action::{Action, MalformedAction};
pub use error::{IdentityId, ReviewError};
pub use manager::{SessionManager, SessionState};
pub use view::{KeyboardOption, ViewModel, RATING_BUTTONS};
