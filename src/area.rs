//! Trace memory: page-aligned, zero-initialised word regions.
//!
//! A [`TraceArea`] backs both session buffers and remote scratch areas. Its
//! words are atomics so the recording unit, the merge engine and the client
//! can all reach the same memory without locks; the count-then-data ordering
//! described in [`crate::codec`] is what makes a snapshot consistent.
//!
//! A [`TraceMapping`] is the client's view of a session buffer, produced by
//! [`SessionHandle::map`](crate::SessionHandle::map). The session and the
//! mapping share ownership of the area, so the memory outlives a session
//! torn down while the client still holds its mapping.

#![allow(unsafe_code)]

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::codec::{self, COUNT_WORD, CmpEntry, WORD_BYTES};
use crate::error::{Error, Result};
use crate::types::TraceMode;

/// Alignment of every trace area.
pub const PAGE_SIZE: usize = 4096;

/// A zero-initialised, page-aligned array of 64-bit words.
pub struct TraceArea {
    ptr: NonNull<AtomicU64>,
    words: usize,
    layout: Layout,
}

// SAFETY: the area only hands out `&[AtomicU64]`, which is Sync; the raw
// pointer is owned exclusively by this value until drop.
unsafe impl Send for TraceArea {}
// SAFETY: see above.
unsafe impl Sync for TraceArea {}

impl TraceArea {
    /// Allocates a zeroed area of `words` words.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `words` is zero or the byte size overflows;
    /// `ResourceExhausted` if the allocator refuses the request.
    pub fn zeroed(words: usize) -> Result<Self> {
        if words == 0 {
            return Err(Error::invalid_argument("trace area must hold at least one word"));
        }
        let layout = Layout::array::<AtomicU64>(words)
            .and_then(|layout| layout.align_to(PAGE_SIZE))
            .map(|layout| layout.pad_to_align())
            .map_err(|_| Error::invalid_argument(format!("trace area of {words} words overflows")))?;
        // SAFETY: the layout has non-zero size (words > 0).
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw.cast::<AtomicU64>()).ok_or_else(|| {
            Error::resource_exhausted(format!("allocating {} bytes of trace memory", layout.size()))
        })?;
        Ok(Self { ptr, words, layout })
    }

    /// Returns the area as a slice of atomic words.
    #[inline]
    #[must_use]
    pub fn words(&self) -> &[AtomicU64] {
        // SAFETY: `ptr` points to `words` zero-initialised AtomicU64 values
        // (all-zero is a valid AtomicU64) that live until `self` is dropped.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.words) }
    }

    /// Size of the area in words.
    #[inline]
    #[must_use]
    pub const fn len_words(&self) -> usize {
        self.words
    }

    /// Size of the area in bytes.
    #[must_use]
    pub const fn len_bytes(&self) -> usize {
        self.words * WORD_BYTES
    }

    /// Current entry count (acquire-ordered).
    #[must_use]
    pub fn count(&self) -> u64 {
        self.words()[COUNT_WORD].load(Ordering::Acquire)
    }

    /// Resets the entry count to zero.
    pub fn reset_count(&self) {
        self.words()[COUNT_WORD].store(0, Ordering::Release);
    }

    pub(crate) fn as_ptr(&self) -> *mut AtomicU64 {
        self.ptr.as_ptr()
    }
}

impl Drop for TraceArea {
    fn drop(&mut self) {
        // SAFETY: allocated in `zeroed` with exactly this layout.
        unsafe { dealloc(self.ptr.as_ptr().cast::<u8>(), self.layout) };
    }
}

impl fmt::Debug for TraceArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceArea")
            .field("words", &self.words)
            .field("count", &self.count())
            .finish()
    }
}

/// A client request to map a session buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRequest {
    /// Page offset into the session buffer; must be zero.
    pub page_offset: u64,
    /// Length of the mapping in bytes; must equal the buffer size.
    pub len_bytes: usize,
}

impl MapRequest {
    /// A request covering a whole buffer of `words` words.
    #[must_use]
    pub const fn whole(words: usize) -> Self {
        Self {
            page_offset: 0,
            len_bytes: words * WORD_BYTES,
        }
    }
}

/// The client's view of a mapped session buffer.
#[derive(Debug, Clone)]
pub struct TraceMapping {
    area: Arc<TraceArea>,
}

impl TraceMapping {
    pub(crate) const fn new(area: Arc<TraceArea>) -> Self {
        Self { area }
    }

    /// Size of the mapping in words.
    #[must_use]
    pub fn len_words(&self) -> usize {
        self.area.len_words()
    }

    /// Size of the mapping in bytes.
    #[must_use]
    pub fn len_bytes(&self) -> usize {
        self.area.len_bytes()
    }

    /// Raw word 0 of the buffer: the entry count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.area.count()
    }

    /// Resets the entry count so the next recording starts from the top.
    pub fn reset(&self) {
        self.area.reset_count();
    }

    /// Reads one raw word.
    #[must_use]
    pub fn word(&self, index: usize) -> Option<u64> {
        self.area
            .words()
            .get(index)
            .map(|w| w.load(Ordering::Relaxed))
    }

    /// Copies the whole buffer, count word included.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u64> {
        self.area
            .words()
            .iter()
            .map(|w| w.load(Ordering::Acquire))
            .collect()
    }

    /// Decodes the buffer as edge entries.
    #[must_use]
    pub fn edges(&self) -> Vec<u64> {
        codec::decode_edges(self.area.words())
    }

    /// Decodes the buffer as comparison entries.
    #[must_use]
    pub fn comparisons(&self) -> Vec<CmpEntry> {
        codec::decode_comparisons(self.area.words())
    }

    /// Number of whole entries recorded for `mode`.
    #[must_use]
    pub fn entries(&self, mode: TraceMode) -> usize {
        codec::recorded_entries(mode, self.area.words())
    }

    /// Returns true if both mappings view the same buffer.
    #[must_use]
    pub fn same_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.area, &other.area)
    }
}
