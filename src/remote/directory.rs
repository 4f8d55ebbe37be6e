//! Remote handle directory: handle → session.
//!
//! Each entry also captures the session's tracing mode, scratch size and
//! generation sequence at registration time. Every session reset purges the
//! session's entries while holding the directory lock, so a captured value
//! is always the session's current one for as long as the entry exists and
//! remote starts never need the session lock.

use std::sync::Arc;

use hashbrown::HashMap;

use super::RemoteHandle;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::types::{SessionId, SessionMode};

/// What a remote start needs to know about the target session.
#[derive(Debug, Clone)]
pub(crate) struct RemoteEntry {
    pub(crate) session: Arc<Session>,
    pub(crate) mode: SessionMode,
    pub(crate) remote_words: usize,
    pub(crate) sequence: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Directory {
    entries: HashMap<RemoteHandle, RemoteEntry>,
}

impl Directory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn find(&self, handle: RemoteHandle) -> Option<&RemoteEntry> {
        self.entries.get(&handle)
    }

    pub(crate) fn contains(&self, handle: RemoteHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Registers `handle`. Fails `AlreadyRegistered` on a duplicate and
    /// `ResourceExhausted` if the table cannot grow.
    pub(crate) fn try_insert(&mut self, handle: RemoteHandle, entry: RemoteEntry) -> Result<()> {
        if self.contains(handle) {
            return Err(Error::already_registered(handle.raw()));
        }
        self.entries.try_reserve(1).map_err(|_| {
            Error::resource_exhausted(format!("registering remote handle {handle}"))
        })?;
        self.entries.insert(handle, entry);
        Ok(())
    }

    /// Removes every entry pointing at `session`. Returns how many were removed.
    pub(crate) fn purge(&mut self, session: SessionId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.session.id() != session);
        before - self.entries.len()
    }

    /// Handles currently registered for `session`, sorted.
    pub(crate) fn handles_of(&self, session: SessionId) -> Vec<RemoteHandle> {
        let mut handles: Vec<RemoteHandle> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.session.id() == session)
            .map(|(handle, _)| *handle)
            .collect();
        handles.sort_unstable();
        handles
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
