//! Client-side decoding of trace buffers.
//!
//! Decoding is only meaningful once tracing has been disabled for the
//! buffer; while a unit is still recording the snapshot may lag behind.

use std::sync::atomic::{AtomicU64, Ordering};

use super::{COUNT_WORD, CmpTag, capacity_entries, entry_offset};
use crate::types::TraceMode;

/// One decoded comparison entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CmpEntry {
    /// Operand width and constant flag.
    pub tag: CmpTag,
    /// First operand (the case label for switch entries).
    pub arg1: u64,
    /// Second operand (the switched value for switch entries).
    pub arg2: u64,
    /// Canonical site address of the comparison.
    pub site: u64,
}

/// Number of entries visible in `words`, clamped to the buffer capacity.
#[must_use]
pub fn recorded_entries(mode: TraceMode, words: &[AtomicU64]) -> usize {
    let Some(count) = words.get(COUNT_WORD) else {
        return 0;
    };
    let count = usize::try_from(count.load(Ordering::Acquire)).unwrap_or(usize::MAX);
    count.min(capacity_entries(mode, words.len()))
}

/// Decodes the edge entries of `words`.
#[must_use]
pub fn decode_edges(words: &[AtomicU64]) -> Vec<u64> {
    let count = recorded_entries(TraceMode::Edges, words);
    words
        .iter()
        .skip(COUNT_WORD + 1)
        .take(count)
        .map(|w| w.load(Ordering::Relaxed))
        .collect()
}

/// Decodes the comparison entries of `words`.
#[must_use]
pub fn decode_comparisons(words: &[AtomicU64]) -> Vec<CmpEntry> {
    let count = recorded_entries(TraceMode::Comparisons, words);
    (0..count)
        .filter_map(|i| entry_offset(TraceMode::Comparisons, i))
        .map(|start| CmpEntry {
            tag: CmpTag::from_raw(words[start].load(Ordering::Relaxed)),
            arg1: words[start + 1].load(Ordering::Relaxed),
            arg2: words[start + 2].load(Ordering::Relaxed),
            site: words[start + 3].load(Ordering::Relaxed),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::OperandWidth;

    fn words(raw: &[u64]) -> Vec<AtomicU64> {
        raw.iter().copied().map(AtomicU64::new).collect()
    }

    #[test]
    fn decodes_edges_up_to_count() {
        let buf = words(&[2, 0x10, 0x20, 0x30]);
        assert_eq!(decode_edges(&buf), vec![0x10, 0x20]);
    }

    #[test]
    fn corrupt_count_is_clamped() {
        let buf = words(&[99, 0x10, 0x20, 0x30]);
        assert_eq!(decode_edges(&buf), vec![0x10, 0x20, 0x30]);
        assert_eq!(recorded_entries(TraceMode::Edges, &[]), 0);
    }

    #[test]
    fn decodes_comparisons() {
        let buf = words(&[1, 7, 0xaa, 0xbb, 0x4000, 0, 0, 0, 0]);
        let entries = decode_comparisons(&buf);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tag.width(), OperandWidth::W64);
        assert!(entries[0].tag.is_const());
        assert_eq!(entries[0].arg1, 0xaa);
        assert_eq!(entries[0].arg2, 0xbb);
        assert_eq!(entries[0].site, 0x4000);
    }
}
