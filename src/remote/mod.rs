//! Remote attribution.
//!
//! Work done asynchronously on behalf of a client is attributed through
//! remote handles. A client registers handles with
//! [`SessionHandle::remote_enable`](crate::SessionHandle::remote_enable);
//! any thread that later runs work for one of those handles brackets it with
//! a remote section. Inside the section the thread records into a private
//! scratch area taken from the scratch pool; when the section ends the scratch
//! entries are merged into the session buffer, unless the session was reset
//! in the meantime.
//!
//! - [`handle`]: handle encoding
//! - `directory`: handle → session map
//! - `pool`: size-keyed scratch area freelist
//! - `section`: remote start / stop

pub mod handle;

pub(crate) mod directory;
pub(crate) mod pool;
pub(crate) mod section;

pub use handle::{RemoteHandle, Subsystem};

use directory::Directory;
use pool::ScratchPool;

/// State behind the collector's single remote lock.
#[derive(Debug, Default)]
pub(crate) struct RemoteShared {
    pub(crate) directory: Directory,
    pub(crate) pool: ScratchPool,
}

impl RemoteShared {
    pub(crate) fn new() -> Self {
        Self {
            directory: Directory::new(),
            pool: ScratchPool::new(),
        }
    }
}

/// Ends the calling thread's remote section, if it is in one.
///
/// Entries recorded during the section are merged into the owning session
/// when the session is still remote-enabled in the same epoch; otherwise
/// they are discarded. Calling this outside a remote section does nothing.
pub fn remote_stop() {
    section::stop();
}

/// Returns true while the calling thread is inside a remote section.
#[must_use]
pub fn in_remote_section() -> bool {
    crate::unit::with_current(crate::unit::UnitSlot::in_remote_section).unwrap_or(false)
}
