//! Platform utilities.
//!
//! Icon generation and process shutdown signalling.

pub mod icons;
pub mod signals;

pub use signals::{mark_shutdown_complete, request_shutdown, shutdown_requested};
