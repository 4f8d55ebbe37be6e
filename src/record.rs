//! Recording entry points called from instrumented code.
//!
//! Every function here reads only the calling thread's binding and writes
//! only into the buffer that binding points at. Nothing locks, allocates,
//! logs or fails: when the thread is not tracing in the matching mode, is
//! running interrupt-context code, or the buffer is full, the call returns
//! without effect.
//!
//! Site addresses are canonicalised by subtracting the collector's
//! configured address bias before they are stored.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::codec::{COUNT_WORD, CMP_CONST, CmpTag, OperandWidth, WORDS_PER_CMP, cmp_size};
use crate::types::SessionMode;
use crate::unit;

/// Records one executed control-flow edge at `site`.
#[inline]
pub fn record_edge(site: u64) {
    let _ = unit::with_current(|unit| {
        if let Some(active) = unit.active(SessionMode::TraceEdges) {
            append_edge(active.words, site.wrapping_sub(active.bias));
        }
    });
}

/// Records a comparison of two operands of the given width.
#[inline]
pub fn record_cmp(width: OperandWidth, is_const: bool, arg1: u64, arg2: u64, site: u64) {
    let tag = CmpTag::new(width, is_const).raw();
    let _ = unit::with_current(|unit| {
        if let Some(active) = unit.active(SessionMode::TraceComparisons) {
            append_cmp(active.words, tag, arg1, arg2, site.wrapping_sub(active.bias));
        }
    });
}

/// Records an 8-bit comparison.
#[inline]
pub fn record_cmp1(arg1: u8, arg2: u8, site: u64) {
    record_cmp(OperandWidth::W8, false, u64::from(arg1), u64::from(arg2), site);
}

/// Records a 16-bit comparison.
#[inline]
pub fn record_cmp2(arg1: u16, arg2: u16, site: u64) {
    record_cmp(OperandWidth::W16, false, u64::from(arg1), u64::from(arg2), site);
}

/// Records a 32-bit comparison.
#[inline]
pub fn record_cmp4(arg1: u32, arg2: u32, site: u64) {
    record_cmp(OperandWidth::W32, false, u64::from(arg1), u64::from(arg2), site);
}

/// Records a 64-bit comparison.
#[inline]
pub fn record_cmp8(arg1: u64, arg2: u64, site: u64) {
    record_cmp(OperandWidth::W64, false, arg1, arg2, site);
}

/// Records an 8-bit comparison where `arg1` is a compile-time constant.
#[inline]
pub fn record_const_cmp1(arg1: u8, arg2: u8, site: u64) {
    record_cmp(OperandWidth::W8, true, u64::from(arg1), u64::from(arg2), site);
}

/// Records a 16-bit comparison where `arg1` is a compile-time constant.
#[inline]
pub fn record_const_cmp2(arg1: u16, arg2: u16, site: u64) {
    record_cmp(OperandWidth::W16, true, u64::from(arg1), u64::from(arg2), site);
}

/// Records a 32-bit comparison where `arg1` is a compile-time constant.
#[inline]
pub fn record_const_cmp4(arg1: u32, arg2: u32, site: u64) {
    record_cmp(OperandWidth::W32, true, u64::from(arg1), u64::from(arg2), site);
}

/// Records a 64-bit comparison where `arg1` is a compile-time constant.
#[inline]
pub fn record_const_cmp8(arg1: u64, arg2: u64, site: u64) {
    record_cmp(OperandWidth::W64, true, arg1, arg2, site);
}

/// Records a switch over `value`.
///
/// `cases` uses the sanitizer case-table layout: `cases[0]` is the number of
/// case labels, `cases[1]` the operand width in bits, and the labels follow.
/// One constant comparison entry is recorded per label, with the label as
/// the first operand. Tables with an unknown width are ignored.
pub fn record_switch(value: u64, cases: &[u64], site: u64) {
    let (Some(&count), Some(&bits)) = (cases.first(), cases.get(1)) else {
        return;
    };
    let Some(width) = OperandWidth::from_bits(bits) else {
        return;
    };
    let tag = CMP_CONST | cmp_size(width.size_code());
    let count = usize::try_from(count).unwrap_or(usize::MAX);
    let _ = unit::with_current(|unit| {
        if let Some(active) = unit.active(SessionMode::TraceComparisons) {
            let site = site.wrapping_sub(active.bias);
            for &label in cases.iter().skip(2).take(count) {
                append_cmp(active.words, tag, label, value, site);
            }
        }
    });
}

/// Appends one edge entry. Returns false if the buffer is full.
///
/// Only the bound unit writes `words`, so the relaxed count read is exact;
/// the release store publishes the entry before the new count.
#[inline]
pub(crate) fn append_edge(words: &[AtomicU64], site: u64) -> bool {
    let count = words[COUNT_WORD].load(Ordering::Relaxed);
    let Some(pos) = usize::try_from(count).ok().and_then(|c| c.checked_add(1)) else {
        return false;
    };
    if pos >= words.len() {
        return false;
    }
    words[pos].store(site, Ordering::Relaxed);
    words[COUNT_WORD].store(count + 1, Ordering::Release);
    true
}

/// Appends one comparison entry. Returns false if the buffer is full.
#[inline]
pub(crate) fn append_cmp(words: &[AtomicU64], tag: u64, arg1: u64, arg2: u64, site: u64) -> bool {
    let count = words[COUNT_WORD].load(Ordering::Relaxed);
    let Some(start) = usize::try_from(count)
        .ok()
        .and_then(|c| c.checked_mul(WORDS_PER_CMP))
        .and_then(|off| off.checked_add(COUNT_WORD + 1))
    else {
        return false;
    };
    match start.checked_add(WORDS_PER_CMP) {
        Some(end) if end <= words.len() => {}
        _ => return false,
    }
    words[start].store(tag, Ordering::Relaxed);
    words[start + 1].store(arg1, Ordering::Relaxed);
    words[start + 2].store(arg2, Ordering::Relaxed);
    words[start + 3].store(site, Ordering::Relaxed);
    words[COUNT_WORD].store(count + 1, Ordering::Release);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_comparisons, decode_edges};

    fn buffer(words: usize) -> Vec<AtomicU64> {
        (0..words).map(|_| AtomicU64::new(0)).collect()
    }

    #[test]
    fn edge_buffer_truncates_at_capacity() {
        crate::test_utils::init_test_logging();
        crate::test_phase!("edge_buffer_truncates_at_capacity");
        let words = buffer(4);
        let written: Vec<bool> = [0x1000, 0x2000, 0x3000, 0x4000]
            .into_iter()
            .map(|site| append_edge(&words, site))
            .collect();
        assert_eq!(written, vec![true, true, true, false]);
        assert_eq!(words[0].load(Ordering::Relaxed), 3);
        assert_eq!(decode_edges(&words), vec![0x1000, 0x2000, 0x3000]);
        crate::test_complete!("edge_buffer_truncates_at_capacity");
    }

    #[test]
    fn comparison_needs_four_free_words() {
        let words = buffer(8);
        assert!(append_cmp(&words, 6, 1, 2, 0x10));
        assert!(!append_cmp(&words, 6, 3, 4, 0x20));
        assert_eq!(words[0].load(Ordering::Relaxed), 1);
        let entries = decode_comparisons(&words);
        assert_eq!(entries.len(), 1);
        assert_eq!((entries[0].arg1, entries[0].arg2, entries[0].site), (1, 2, 0x10));
    }

    #[test]
    fn corrupt_count_never_writes_out_of_bounds() {
        let words = buffer(4);
        words[0].store(u64::MAX, Ordering::Relaxed);
        assert!(!append_edge(&words, 1));
        assert!(!append_cmp(&words, 0, 1, 2, 3));
        words[0].store(u64::MAX / 2, Ordering::Relaxed);
        assert!(!append_cmp(&words, 0, 1, 2, 3));
        assert!(words[1..].iter().all(|w| w.load(Ordering::Relaxed) == 0));
    }

    #[test]
    fn unbound_thread_records_nothing() {
        std::thread::spawn(|| {
            record_edge(0x1234);
            record_cmp8(1, 2, 0x10);
            record_switch(5, &[2, 64, 1, 5], 0x20);
            assert!(!crate::unit::is_bound());
        })
        .join()
        .expect("join");
    }
}
