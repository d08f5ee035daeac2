//! Recording system module
//!
//! The session lifecycle: capture loop, audio task, shared stop signal, and
//! the finalize step that produces the deliverable.

pub mod session;
pub mod sink;
pub mod state;

pub use session::{RecordingSession, SessionError};
pub use state::{OutputPaths, SessionConfig, SessionState, StatusEvent};
