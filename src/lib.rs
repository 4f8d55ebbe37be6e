//! Covtrace: per-thread edge and comparison coverage collection for coverage-guided fuzzers.
//!
//! # Overview
//!
//! Covtrace records raw execution-coverage traces into a buffer owned by a
//! client. A client opens a [`SessionHandle`], fixes the buffer capacity,
//! maps the buffer, and enables tracing for the calling thread. From then on
//! every instrumented edge or comparison executed by that thread is appended
//! to the buffer by the lock-free entry points in [`record`].
//!
//! Work performed asynchronously on behalf of a client (worker threads,
//! deferred callbacks) is attributed through opaque 64-bit remote handles:
//! the client registers handles with [`SessionHandle::remote_enable`], and any
//! thread running that work brackets it with [`remote_start`] /
//! [`remote_stop`]. Entries recorded in between land in a pooled scratch
//! area and are merged into the client buffer when the section ends.
//!
//! # Core Guarantees
//!
//! - **Lock-free hot path**: recording touches only the calling thread's binding
//! - **Bounded buffers**: entries past capacity are dropped, never wrapped
//! - **Exactly-once teardown**: a session is destroyed by whichever owner releases last
//! - **Stale sections are discarded**: a remote section that outlives its enable epoch never merges
//!
//! # Module Structure
//!
//! - [`types`]: identifiers and tracing modes
//! - [`codec`]: trace buffer layout and client-side decoding
//! - [`area`]: page-aligned trace memory and client mappings
//! - [`unit`]: per-thread execution context binding
//! - [`record`]: recording entry points called from instrumented code
//! - [`session`]: session lifecycle and control handle
//! - [`remote`]: remote handle directory, scratch pool and remote sections
//! - [`merge`]: scratch-to-session merge engine
//! - [`control`]: control-plane request encoding
//! - [`collector`]: process-wide collector state
//! - [`observability`]: collector counters
//! - [`config`]: collector configuration
//! - [`error`](mod@error): error types
//! - [`tracing_compat`]: optional tracing integration (requires `tracing-integration` feature)

// Default to deny for unsafe code - the buffer and binding modules opt in with
// #[allow(unsafe_code)] where they hand out raw trace memory.
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod area;
pub mod codec;
pub mod collector;
pub mod config;
pub mod control;
pub mod error;
pub mod merge;
pub mod observability;
pub mod record;
pub mod remote;
pub mod session;
pub mod tracing_compat;
pub mod types;
pub mod unit;

#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

pub use area::{MapRequest, TraceArea, TraceMapping};
pub use codec::{CmpEntry, CmpTag, OperandWidth};
pub use collector::{Collector, RemoteSectionGuard};
pub use config::CovConfig;
pub use control::{ControlRequest, RemoteArg};
pub use error::{Error, ErrorKind, Result};
pub use observability::StatsSnapshot;
pub use remote::RemoteHandle;
pub use session::SessionHandle;
pub use types::{SessionId, SessionMode, TraceMode, UnitId};

/// Opens a new session on the process-wide collector.
#[must_use]
pub fn open() -> SessionHandle {
    Collector::global().open()
}

/// Starts a remote section for `handle` on the calling thread, using the
/// process-wide collector.
///
/// Unknown handles and already-bound threads are ignored.
pub fn remote_start(handle: u64) {
    Collector::global().remote_start(handle);
}

/// Ends the calling thread's remote section, merging its entries into the
/// owning session when the session is still in the same enable epoch.
pub fn remote_stop() {
    remote::remote_stop();
}
