//! Trace sessions.
//!
//! A session is one client's tracing lifecycle: capacity, buffer, mode,
//! owning unit and generation sequence, protected by a short-held lock.
//!
//! ```text
//! Disabled ──init_trace──▶ Init ──enable / remote_enable──▶ Trace{Edges,Comparisons}
//!                           ▲                                   │
//!                           └──────── disable / unit exit ◀─────┘
//! ```
//!
//! # Ownership
//!
//! A session is reference counted across three owner kinds: the client's
//! [`SessionHandle`], the unit bound by `enable` or `remote_enable`, and
//! every in-flight remote section. Whichever release brings the count to
//! zero tears the session down: its handles are purged from the directory
//! and its buffer is released. Teardown runs exactly once.
//!
//! # Lock order
//!
//! Session lock, then the collector's remote lock. Neither is held while
//! allocating, and neither is held when an owner reference is released.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;

use crate::area::{MapRequest, TraceArea, TraceMapping};
use crate::codec::{MIN_TRACE_WORDS, WORD_BYTES};
use crate::collector::CollectorShared;
use crate::control::ControlRequest;
use crate::error::{Error, ErrorKind, Result};
use crate::merge;
use crate::remote::RemoteHandle;
use crate::remote::directory::RemoteEntry;
use crate::remote::section;
use crate::tracing_compat::{debug, error, trace, warn};
use crate::types::{SessionId, SessionMode, TraceMode, UnitId};
use crate::unit::{self, HeldArea, UnitSlot};

/// Why an owner holds a session reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OwnerKind {
    /// The client's control handle.
    Handle,
    /// The unit bound by `enable` or `remote_enable`.
    Unit,
    /// An in-flight remote section.
    RemoteSection,
}

#[derive(Debug)]
struct SessionState {
    mode: SessionMode,
    size: usize,
    area: Option<Arc<TraceArea>>,
    owner: Option<UnitId>,
    remote: bool,
    remote_size: usize,
    sequence: u64,
}

impl SessionState {
    const fn new() -> Self {
        Self {
            mode: SessionMode::Disabled,
            size: 0,
            area: None,
            owner: None,
            remote: false,
            remote_size: 0,
            sequence: 1,
        }
    }

    /// Back to `Init`, in a new epoch.
    fn reset(&mut self) {
        self.owner = None;
        self.mode = SessionMode::Init;
        self.remote = false;
        self.remote_size = 0;
        self.sequence = self.sequence.wrapping_add(1);
    }

    fn ready(&self) -> Result<Arc<TraceArea>> {
        match (&self.area, self.mode) {
            (Some(area), SessionMode::Init) => Ok(Arc::clone(area)),
            (_, mode) => Err(Error::invalid_state(format!(
                "session must be initialised and mapped, mode is {mode}"
            ))),
        }
    }
}

/// Session object shared by its owners.
pub(crate) struct Session {
    id: SessionId,
    refcount: AtomicU32,
    destroyed: AtomicBool,
    state: Mutex<SessionState>,
    collector: Arc<CollectorShared>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("refcount", &self.refcount.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(collector: Arc<CollectorShared>) -> Arc<Self> {
        let session = Arc::new(Self {
            id: SessionId::next(),
            refcount: AtomicU32::new(1),
            destroyed: AtomicBool::new(false),
            state: Mutex::new(SessionState::new()),
            collector,
        });
        session.collector.stats.session_created();
        debug!(session = %session.id, "session opened");
        session
    }

    pub(crate) const fn id(&self) -> SessionId {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    // ================================================================
    // Reference counting
    // ================================================================

    pub(crate) fn get(&self, owner: OwnerKind) {
        let prev = self.refcount.fetch_add(1, Ordering::AcqRel);
        trace!(session = %self.id, ?owner, refcount = prev + 1, "session get");
    }

    /// Releases one owner reference. Must not be called with the session
    /// lock held.
    pub(crate) fn put(&self, owner: OwnerKind) {
        let released = self
            .refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match released {
            Ok(1) => self.destroy(),
            Ok(prev) => {
                trace!(session = %self.id, ?owner, refcount = prev - 1, "session put");
            }
            Err(_) => {
                error!(session = %self.id, ?owner, "session reference released twice");
            }
        }
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            error!(session = %self.id, "session torn down twice");
            return;
        }
        let area = {
            let mut state = self.lock();
            let purged = {
                let mut remote = self.collector.remote.lock();
                let purged = remote.directory.purge(self.id);
                state.reset();
                purged
            };
            state.mode = SessionMode::Disabled;
            if purged > 0 {
                warn!(session = %self.id, purged, "remote handles still registered at teardown");
            }
            state.area.take()
        };
        drop(area);
        self.collector.stats.session_destroyed();
        debug!(session = %self.id, "session destroyed");
    }

    // ================================================================
    // Control operations
    // ================================================================

    fn init_trace(&self, words: u64) -> Result<()> {
        let mut state = self.lock();
        if state.mode != SessionMode::Disabled {
            return Err(Error::invalid_state(format!(
                "init_trace requires a fresh session, mode is {}",
                state.mode
            )));
        }
        let max = self.collector.config.max_trace_words;
        let size = usize::try_from(words)
            .ok()
            .filter(|w| (MIN_TRACE_WORDS..=max).contains(w))
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "capacity {words} words outside {MIN_TRACE_WORDS}..={max}"
                ))
            })?;
        state.size = size;
        state.mode = SessionMode::Init;
        debug!(session = %self.id, words = size, "trace initialised");
        Ok(())
    }

    fn check_map(state: &SessionState, request: MapRequest) -> Result<()> {
        let expected = state.size * WORD_BYTES;
        if state.mode != SessionMode::Init
            || request.page_offset != 0
            || request.len_bytes != expected
        {
            return Err(Error::invalid_argument(format!(
                "map {request:?} does not match {expected} bytes at offset 0 in init mode"
            )));
        }
        Ok(())
    }

    fn map(&self, request: MapRequest) -> Result<TraceMapping> {
        let words = {
            let state = self.lock();
            Self::check_map(&state, request)?;
            if let Some(area) = &state.area {
                return Ok(TraceMapping::new(Arc::clone(area)));
            }
            state.size
        };

        let fresh = Arc::new(TraceArea::zeroed(words)?);

        let mut state = self.lock();
        Self::check_map(&state, request)?;
        if let Some(area) = &state.area {
            return Ok(TraceMapping::new(Arc::clone(area)));
        }
        state.area = Some(Arc::clone(&fresh));
        debug!(session = %self.id, words, "trace buffer bound");
        Ok(TraceMapping::new(fresh))
    }

    fn check_mode(&self, mode: TraceMode) -> Result<()> {
        if mode == TraceMode::Comparisons && !self.collector.config.comparisons {
            return Err(Error::new(ErrorKind::Unsupported)
                .with_message("comparison tracing is disabled"));
        }
        Ok(())
    }

    fn check_unowned(state: &SessionState, unit: &UnitSlot) -> Result<()> {
        if state.owner.is_some() {
            return Err(Error::busy("session is already owned by another unit"));
        }
        if unit.has_session() {
            return Err(Error::busy(format!("unit {} is already bound", unit.id())));
        }
        Ok(())
    }

    fn enable(self: &Arc<Self>, unit: &UnitSlot, mode: TraceMode) -> Result<()> {
        let mut state = self.lock();
        Self::check_unowned(&state, unit)?;
        let area = state.ready()?;
        self.check_mode(mode)?;

        state.mode = mode.session_mode();
        state.owner = Some(unit.id());
        area.reset_count();
        let (ptr, words) = (area.as_ptr(), area.len_words());
        unit.hold(HeldArea::Session(area));
        unit.set_session(Arc::clone(self));
        unit.start(
            words,
            ptr,
            state.mode,
            state.sequence,
            self.collector.config.address_bias,
        );
        // Released by `disable` or at unit exit.
        self.get(OwnerKind::Unit);
        debug!(session = %self.id, unit = %unit.id(), mode = %state.mode, sequence = state.sequence, "tracing enabled");
        Ok(())
    }

    /// Resets `state`, purging the session's handles first when it is remote.
    fn reset_locked(&self, state: &mut SessionState) {
        if state.remote {
            let mut remote = self.collector.remote.lock();
            let purged = remote.directory.purge(self.id);
            state.reset();
            drop(remote);
            debug!(session = %self.id, purged, sequence = state.sequence, "remote session reset");
        } else {
            state.reset();
            debug!(session = %self.id, sequence = state.sequence, "session reset");
        }
    }

    fn disable(self: &Arc<Self>, unit: &UnitSlot) -> Result<()> {
        if !unit.is_bound_to(self) {
            return Err(Error::invalid_argument(format!(
                "unit {} is not bound to session {}",
                unit.id(),
                self.id
            )));
        }
        {
            let mut state = self.lock();
            if state.owner != Some(unit.id()) {
                warn!(session = %self.id, unit = %unit.id(), "disable from a unit that does not own the session");
                return Err(Error::invalid_argument(format!(
                    "unit {} does not own session {}",
                    unit.id(),
                    self.id
                )));
            }
            unit.reset();
            self.reset_locked(&mut state);
        }
        self.put(OwnerKind::Unit);
        Ok(())
    }

    fn remote_enable(
        self: &Arc<Self>,
        unit: &UnitSlot,
        mode: TraceMode,
        remote_words: usize,
        handles: &[RemoteHandle],
    ) -> Result<()> {
        let mut state = self.lock();
        Self::check_unowned(&state, unit)?;
        state.ready()?;
        self.check_mode(mode)?;

        state.mode = mode.session_mode();
        state.owner = Some(unit.id());
        state.remote = true;
        state.remote_size = remote_words;
        unit.set_session(Arc::clone(self));

        let registered = {
            let mut remote = self.collector.remote.lock();
            let mut result = Ok(());
            for &handle in handles {
                let entry = RemoteEntry {
                    session: Arc::clone(self),
                    mode: state.mode,
                    remote_words,
                    sequence: state.sequence,
                };
                if let Err(err) = remote.directory.try_insert(handle, entry) {
                    result = Err(err);
                    break;
                }
            }
            if result.is_err() {
                remote.directory.purge(self.id);
                state.reset();
            }
            result
        };
        if let Err(err) = registered {
            drop(unit.take_session());
            warn!(session = %self.id, error = %err, "remote enable rolled back");
            return Err(err);
        }

        // Released by `disable` or at unit exit.
        self.get(OwnerKind::Unit);
        debug!(
            session = %self.id,
            unit = %unit.id(),
            handles = handles.len(),
            remote_words,
            sequence = state.sequence,
            "remote tracing enabled"
        );
        Ok(())
    }

    /// Merges a finished remote section and releases its reference.
    pub(crate) fn finish_section(&self, scratch: TraceArea, sequence: u64) {
        let merged = {
            let state = self.lock();
            match (&state.area, state.mode.trace_mode()) {
                (Some(dst), Some(mode)) if state.remote && state.sequence == sequence => {
                    Some(merge::move_entries(mode, dst.words(), scratch.words()))
                }
                _ => None,
            }
        };
        match merged {
            Some(entries) => {
                self.collector.stats.section_merged(entries);
                trace!(session = %self.id, entries, "remote section merged");
            }
            None => {
                self.collector.stats.section_discarded();
                debug!(session = %self.id, sequence, "stale remote section discarded");
            }
        }
        let rejected = self.collector.remote.lock().pool.put(scratch).err();
        if rejected.is_some() {
            warn!(session = %self.id, "scratch pool could not grow, area released");
        }
        drop(rejected);
        self.put(OwnerKind::RemoteSection);
    }

    /// Releases whatever `unit` still holds on this session as it exits.
    fn unit_exit(&self, unit: &UnitSlot) {
        {
            let mut state = self.lock();
            if state.owner != Some(unit.id()) {
                error!(session = %self.id, unit = %unit.id(), owner = ?state.owner, "exiting unit does not own its session");
                drop(state);
                unit.reset();
                return;
            }
            unit.reset();
            self.reset_locked(&mut state);
        }
        self.put(OwnerKind::Unit);
    }
}

/// Unit-exit hook, run from the thread-local slot's destructor.
pub(crate) fn unit_exit(unit: &UnitSlot) {
    if unit.in_remote_section() {
        error!(unit = %unit.id(), "unit exited inside a remote section");
        section::finish(unit);
        return;
    }
    if let Some(session) = unit.session() {
        session.unit_exit(unit);
    }
}

fn on_current<R>(f: impl FnOnce(&UnitSlot) -> Result<R>) -> Result<R> {
    unit::with_current(f).unwrap_or_else(|| {
        Err(Error::invalid_state("calling unit is shutting down"))
    })
}

/// A client's control handle on a session.
///
/// Dropping the handle releases the client's reference. Tracing bound to a
/// unit continues until that unit disables it or exits.
#[derive(Debug)]
pub struct SessionHandle {
    session: Arc<Session>,
}

impl SessionHandle {
    pub(crate) const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Session identity.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.session.id
    }

    /// Current session mode.
    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.session.lock().mode
    }

    /// Current generation sequence.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.session.lock().sequence
    }

    /// Current owner reference count.
    #[must_use]
    pub fn refcount(&self) -> u32 {
        self.session.refcount.load(Ordering::Acquire)
    }

    /// Unit bound by `enable` or `remote_enable`, if any.
    #[must_use]
    pub fn owner(&self) -> Option<UnitId> {
        self.session.lock().owner
    }

    /// Returns true while the session is remote-enabled.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.session.lock().remote
    }

    /// Capacity fixed by `init_trace`, in words.
    #[must_use]
    pub fn capacity_words(&self) -> usize {
        self.session.lock().size
    }

    /// Remote handles currently registered for this session.
    #[must_use]
    pub fn remote_handles(&self) -> Vec<RemoteHandle> {
        self.session
            .collector
            .remote
            .lock()
            .directory
            .handles_of(self.session.id)
    }

    /// Fixes the buffer capacity, in words. The first word holds the entry count.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the session is fresh; `InvalidArgument` if
    /// `words` is below two or above the configured maximum.
    pub fn init_trace(&self, words: u64) -> Result<()> {
        self.session.init_trace(words)
    }

    /// Binds the trace buffer and returns the client's view of it.
    ///
    /// Only the first successful call allocates; later matching requests
    /// return a view of the same buffer.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless the session is in `Init`, the offset is zero
    /// and the length equals the capacity in bytes; `ResourceExhausted` if
    /// the buffer cannot be allocated.
    pub fn map(&self, request: MapRequest) -> Result<TraceMapping> {
        self.session.map(request)
    }

    /// Maps the whole buffer.
    pub fn map_full(&self) -> Result<TraceMapping> {
        let words = self.capacity_words();
        self.map(MapRequest::whole(words))
    }

    /// Starts tracing on the calling thread.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the session is in `Init` with a buffer bound;
    /// `Busy` if the session has an owner or the calling thread is already
    /// bound; `Unsupported` for comparisons when they are configured off.
    pub fn enable(&self, mode: TraceMode) -> Result<()> {
        on_current(|unit| self.session.enable(unit, mode))
    }

    /// Stops tracing. Must be called from the thread that enabled it.
    ///
    /// The session returns to `Init` in a new epoch; remote sections still in
    /// flight for the old epoch will be discarded.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the calling thread does not own the session.
    pub fn disable(&self) -> Result<()> {
        on_current(|unit| self.session.disable(unit))
    }

    /// Registers `handles` so remote sections started for them record into
    /// this session, using scratch areas of `remote_words` words.
    ///
    /// Registration is all or nothing: on any failure the handles registered
    /// so far are removed and the session is reset.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for too many handles or an out-of-range scratch
    /// size; the errors of [`enable`](Self::enable);
    /// `AlreadyRegistered` if a handle is taken; `ResourceExhausted` if the
    /// directory cannot grow.
    pub fn remote_enable(&self, mode: TraceMode, remote_words: usize, handles: &[u64]) -> Result<()> {
        let config = &self.session.collector.config;
        if handles.len() > config.max_remote_handles {
            return Err(Error::invalid_argument(format!(
                "{} handles exceed the limit of {}",
                handles.len(),
                config.max_remote_handles
            )));
        }
        if !(MIN_TRACE_WORDS..=config.max_remote_words).contains(&remote_words) {
            return Err(Error::invalid_argument(format!(
                "remote area of {remote_words} words outside {MIN_TRACE_WORDS}..={}",
                config.max_remote_words
            )));
        }
        let parsed: SmallVec<[RemoteHandle; 8]> =
            handles.iter().map(|&raw| RemoteHandle::from_raw(raw)).collect();
        on_current(|unit| self.session.remote_enable(unit, mode, remote_words, &parsed))
    }

    /// Executes a decoded control request.
    pub fn control(&self, request: &ControlRequest) -> Result<()> {
        match request {
            ControlRequest::InitTrace { words } => self.init_trace(*words),
            ControlRequest::Enable { selector } => self.enable(TraceMode::from_selector(*selector)?),
            ControlRequest::Disable { unused } => {
                if *unused != 0 {
                    return Err(Error::invalid_argument("disable argument must be zero"));
                }
                self.disable()
            }
            ControlRequest::RemoteEnable(arg) => {
                arg.validate(self.session.collector.config.max_remote_handles)?;
                let mode = TraceMode::from_selector(u64::from(arg.trace_mode))?;
                self.remote_enable(mode, arg.area_size as usize, &arg.handles)
            }
        }
    }

    /// Decodes and executes a raw control command.
    ///
    /// `payload` carries the encoded [`RemoteArg`](crate::RemoteArg) for
    /// remote enable and is ignored otherwise.
    ///
    /// # Errors
    ///
    /// `UnknownCommand` for unrecognised codes, plus the errors of the
    /// decoded operation.
    pub fn dispatch(&self, command: u32, arg: u64, payload: &[u8]) -> Result<()> {
        let request = ControlRequest::decode(
            command,
            arg,
            payload,
            self.session.collector.config.max_remote_handles,
        )?;
        self.control(&request)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.session.put(OwnerKind::Handle);
    }
}
