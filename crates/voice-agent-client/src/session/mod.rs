//! Session lifecycle
//!
//! [`SessionController`] owns at most one live session. Everything the session
//! acquires (peer link, local audio, event pump) lives in a single resource
//! slot that every exit path releases exactly once.

mod controller;
mod resources;
pub mod state;

pub use controller::SessionController;
pub use state::{ConnectionState, ResourceSummary, SessionSnapshot};
