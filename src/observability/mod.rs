//! Collector observability.
//!
//! Covtrace never surfaces recording loss as an error: full buffers, stale
//! remote sections and unknown handles are dropped silently. The counters
//! in [`stats`] make those drops visible to tests and operators without
//! touching the recording hot path.

pub mod stats;

pub use stats::{CollectorStats, StatsSnapshot};
