//! Remote scratch pool.
//!
//! Scratch areas are keyed by word count and reused by any later remote
//! section that asks for the same size. Areas are never shared: a taken area
//! belongs to exactly one unit until it is put back. The pool only grows;
//! idle areas live until the collector is dropped.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::area::TraceArea;

#[derive(Debug, Default)]
pub(crate) struct ScratchPool {
    free: HashMap<usize, SmallVec<[TraceArea; 2]>>,
}

impl ScratchPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Takes an idle area of exactly `words` words.
    pub(crate) fn take(&mut self, words: usize) -> Option<TraceArea> {
        self.free.get_mut(&words)?.pop()
    }

    /// Returns an area to the pool. Growing the freelist is fallible: when
    /// it cannot grow the area is handed back to the caller instead.
    pub(crate) fn put(&mut self, area: TraceArea) -> Result<(), TraceArea> {
        let words = area.len_words();
        if !self.free.contains_key(&words) && self.free.try_reserve(1).is_err() {
            return Err(area);
        }
        let list = self.free.entry(words).or_default();
        if list.try_reserve(1).is_err() {
            return Err(area);
        }
        list.push(area);
        Ok(())
    }

    /// Number of idle areas across all sizes.
    pub(crate) fn idle(&self) -> usize {
        self.free.values().map(SmallVec::len).sum()
    }
}
