//! Session input and output.

pub mod replay;

pub use replay::{run_session, ReplayOptions, ReplaySummary, Session, SessionEvent, SessionRow};
