//! Core types for covtrace.
//!
//! - [`id`]: Identifier types (`UnitId`, `SessionId`)
//! - [`mode`]: Session modes and trace mode selectors

pub mod id;
pub mod mode;

pub use id::{SessionId, UnitId};
pub use mode::{SessionMode, TraceMode};
