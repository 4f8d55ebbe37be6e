//! Merge engine: folds a scratch buffer into a session buffer.
//!
//! Entries are appended after the destination's existing entries, in
//! order, up to the destination's remaining capacity. Only whole entries are
//! copied and the destination count is published with release ordering once
//! the data is in place. A buffer whose count claims more entries than its
//! size allows is treated as corrupt and nothing is merged.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::codec::{COUNT_WORD, capacity_entries};
use crate::types::TraceMode;

/// Appends the entries of `src` to `dst`. Returns the number of entries moved.
pub fn move_entries(mode: TraceMode, dst: &[AtomicU64], src: &[AtomicU64]) -> usize {
    let (Some(dst_count), Some(src_count)) = (dst.get(COUNT_WORD), src.get(COUNT_WORD)) else {
        return 0;
    };
    let dst_cap = capacity_entries(mode, dst.len());
    let src_cap = capacity_entries(mode, src.len());
    let Ok(dst_len) = usize::try_from(dst_count.load(Ordering::Acquire)) else {
        return 0;
    };
    let Ok(src_len) = usize::try_from(src_count.load(Ordering::Acquire)) else {
        return 0;
    };
    if dst_len > dst_cap || src_len > src_cap {
        return 0;
    }

    let moved = (dst_cap - dst_len).min(src_len);
    if moved == 0 {
        return 0;
    }
    let wpe = mode.words_per_entry();
    let dst_start = COUNT_WORD + 1 + dst_len * wpe;
    let src_start = COUNT_WORD + 1;
    let len = moved * wpe;
    for (to, from) in dst[dst_start..dst_start + len]
        .iter()
        .zip(&src[src_start..src_start + len])
    {
        to.store(from.load(Ordering::Relaxed), Ordering::Relaxed);
    }
    dst_count.store((dst_len + moved) as u64, Ordering::Release);
    moved
}
