//! # Wire Sessions
//!
//! - **transport**: the read/write seams between the socket owner and a session
//! - **manager**: runs a session's read loop and pipeline side by side

pub mod manager;
pub mod transport;

pub use manager::{run_session, SessionReport};
