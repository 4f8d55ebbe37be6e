//! Execution context binding.
//!
//! Every thread (execution unit) owns a [`UnitSlot`] in thread-local storage.
//! The slot carries a thin projection of the session it is tracing for:
//! mode, buffer pointer, capacity, and the session's generation sequence.
//! The recording entry points read only this projection, never the session,
//! so the hot path takes no lock.
//!
//! # Ordering protocol
//!
//! A recording call can re-enter on the same thread (signal handlers,
//! callbacks run from inside instrumented code) while the slot is being
//! bound or unbound. The mode word is the publication point:
//!
//! ```text
//! start:  size, area, bias  ─▶ fence ─▶ mode (release)
//! stop:   mode (release)    ─▶ fence ─▶ size, area
//! record: mode (acquire)    ─▶ fence ─▶ size, area
//! ```
//!
//! A reader that observes a tracing mode therefore always sees the matching
//! pointer and size, and a reader that raced with `stop` sees `Disabled`
//! before the pointer is cleared.
//!
//! # Interrupt context
//!
//! Recording only happens in task context. [`enter_interrupt`] marks the
//! calling thread as running an interrupt-like handler until the returned
//! guard drops; recording and remote sections are suppressed meanwhile.
//!
//! # Unit exit
//!
//! When the thread terminates, the slot's destructor releases whatever the
//! thread still owns: a local binding behaves like an explicit disable, a
//! remote-enable owner purges its handles, and an unfinished remote section
//! is completed.

#![allow(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{
    AtomicPtr, AtomicU8, AtomicU64, AtomicUsize, Ordering, compiler_fence,
};

use crate::area::TraceArea;
use crate::session::{self, Session};
use crate::types::{SessionMode, UnitId};

thread_local! {
    pub(crate) static UNIT: UnitSlot = UnitSlot::new();
}

/// Lock-free projection of a session's tracing state.
#[derive(Debug)]
pub(crate) struct Binding {
    mode: AtomicU8,
    area: AtomicPtr<AtomicU64>,
    size: AtomicUsize,
    sequence: AtomicU64,
    bias: AtomicU64,
}

/// A binding observed in a tracing mode.
pub(crate) struct Active<'a> {
    pub(crate) words: &'a [AtomicU64],
    pub(crate) bias: u64,
}

/// Values read back from a binding when a remote section ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BindingSnapshot {
    pub(crate) mode: SessionMode,
    pub(crate) size: usize,
    pub(crate) sequence: u64,
}

impl Binding {
    const fn new() -> Self {
        Self {
            mode: AtomicU8::new(SessionMode::Disabled.as_u8()),
            area: AtomicPtr::new(std::ptr::null_mut()),
            size: AtomicUsize::new(0),
            sequence: AtomicU64::new(0),
            bias: AtomicU64::new(0),
        }
    }

    fn start(&self, size: usize, area: *mut AtomicU64, mode: SessionMode, sequence: u64, bias: u64) {
        self.size.store(size, Ordering::Relaxed);
        self.area.store(area, Ordering::Relaxed);
        self.bias.store(bias, Ordering::Relaxed);
        compiler_fence(Ordering::SeqCst);
        self.mode.store(mode.as_u8(), Ordering::Release);
        self.sequence.store(sequence, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.mode
            .store(SessionMode::Disabled.as_u8(), Ordering::Release);
        compiler_fence(Ordering::SeqCst);
        self.size.store(0, Ordering::Relaxed);
        self.area.store(std::ptr::null_mut(), Ordering::Relaxed);
    }

    #[inline]
    fn active(&self, needed: SessionMode) -> Option<Active<'_>> {
        let mode = self.mode.load(Ordering::Acquire);
        compiler_fence(Ordering::SeqCst);
        if mode != needed.as_u8() {
            return None;
        }
        let area = self.area.load(Ordering::Relaxed);
        let size = self.size.load(Ordering::Relaxed);
        if area.is_null() || size == 0 {
            return None;
        }
        // SAFETY: a non-null pointer is only published together with a
        // tracing mode, and the owning UnitSlot holds the backing TraceArea
        // (`held`) until after `stop` has unpublished it.
        let words = unsafe { std::slice::from_raw_parts(area.cast_const(), size) };
        Some(Active {
            words,
            bias: self.bias.load(Ordering::Relaxed),
        })
    }

    fn snapshot(&self) -> BindingSnapshot {
        BindingSnapshot {
            mode: SessionMode::from_u8(self.mode.load(Ordering::Acquire)),
            size: self.size.load(Ordering::Relaxed),
            sequence: self.sequence.load(Ordering::Relaxed),
        }
    }
}

/// Memory a unit keeps alive while its binding points into it.
#[derive(Debug)]
pub(crate) enum HeldArea {
    /// The session's own buffer (local tracing). Never read; holding it
    /// keeps the published pointer valid until the binding is stopped.
    Session(#[allow(dead_code)] Arc<TraceArea>),
    /// A pooled scratch area (remote section).
    Scratch(TraceArea),
}

/// Per-thread storage slot.
pub(crate) struct UnitSlot {
    id: UnitId,
    irq_depth: Cell<u32>,
    binding: Binding,
    session: RefCell<Option<Arc<Session>>>,
    held: RefCell<Option<HeldArea>>,
}

impl UnitSlot {
    fn new() -> Self {
        Self {
            id: UnitId::next(),
            irq_depth: Cell::new(0),
            binding: Binding::new(),
            session: RefCell::new(None),
            held: RefCell::new(None),
        }
    }

    pub(crate) const fn id(&self) -> UnitId {
        self.id
    }

    pub(crate) fn in_task(&self) -> bool {
        self.irq_depth.get() == 0
    }

    #[inline]
    pub(crate) fn active(&self, needed: SessionMode) -> Option<Active<'_>> {
        if !self.in_task() {
            return None;
        }
        self.binding.active(needed)
    }

    /// Publishes a binding. `area` must already be held by this slot.
    pub(crate) fn start(&self, size: usize, area: *mut AtomicU64, mode: SessionMode, sequence: u64, bias: u64) {
        self.binding.start(size, area, mode, sequence, bias);
    }

    pub(crate) fn stop(&self) {
        self.binding.stop();
    }

    pub(crate) fn snapshot(&self) -> BindingSnapshot {
        self.binding.snapshot()
    }

    pub(crate) fn session(&self) -> Option<Arc<Session>> {
        self.session.borrow().clone()
    }

    pub(crate) fn has_session(&self) -> bool {
        self.session.borrow().is_some()
    }

    pub(crate) fn is_bound_to(&self, session: &Arc<Session>) -> bool {
        self.session
            .borrow()
            .as_ref()
            .is_some_and(|bound| Arc::ptr_eq(bound, session))
    }

    pub(crate) fn set_session(&self, session: Arc<Session>) {
        *self.session.borrow_mut() = Some(session);
    }

    pub(crate) fn take_session(&self) -> Option<Arc<Session>> {
        self.session.borrow_mut().take()
    }

    pub(crate) fn hold(&self, area: HeldArea) {
        *self.held.borrow_mut() = Some(area);
    }

    pub(crate) fn take_held(&self) -> Option<HeldArea> {
        self.held.borrow_mut().take()
    }

    pub(crate) fn in_remote_section(&self) -> bool {
        matches!(*self.held.borrow(), Some(HeldArea::Scratch(_)))
    }

    /// Unbinds the unit completely: binding, session reference and held memory.
    pub(crate) fn reset(&self) {
        self.stop();
        drop(self.take_session());
        drop(self.take_held());
    }
}

impl Drop for UnitSlot {
    fn drop(&mut self) {
        session::unit_exit(self);
    }
}

/// Runs `f` against the calling thread's slot, unless the slot is already
/// being torn down.
pub(crate) fn with_current<R>(f: impl FnOnce(&UnitSlot) -> R) -> Option<R> {
    UNIT.try_with(f).ok()
}

/// Identity of the calling execution unit.
///
/// # Panics
///
/// Panics if called while the thread's storage is being destroyed.
#[must_use]
pub fn current() -> UnitId {
    UNIT.with(UnitSlot::id)
}

/// Mode currently published in the calling thread's binding.
#[must_use]
pub fn current_mode() -> SessionMode {
    with_current(|unit| unit.snapshot().mode).unwrap_or_default()
}

/// Returns true if the calling thread is bound to a session, either
/// tracing locally, owning a remote registration, or inside a remote section.
#[must_use]
pub fn is_bound() -> bool {
    with_current(UnitSlot::has_session).unwrap_or(false)
}

/// Returns true while the calling thread is inside an [`enter_interrupt`] scope.
#[must_use]
pub fn in_interrupt() -> bool {
    with_current(|unit| !unit.in_task()).unwrap_or(false)
}

/// Marks the calling thread as running interrupt-context code until the
/// guard is dropped. Scopes nest.
#[must_use = "interrupt context ends when the guard is dropped"]
pub fn enter_interrupt() -> InterruptGuard {
    let _ = with_current(|unit| unit.irq_depth.set(unit.irq_depth.get().saturating_add(1)));
    InterruptGuard {
        _not_send: PhantomData,
    }
}

/// Scope guard returned by [`enter_interrupt`].
#[derive(Debug)]
pub struct InterruptGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        let _ = with_current(|unit| unit.irq_depth.set(unit.irq_depth.get().saturating_sub(1)));
    }
}
