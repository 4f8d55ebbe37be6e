//! Trace buffer layout.
//!
//! A trace buffer is a contiguous array of 64-bit words. Word 0 holds the
//! number of entries recorded so far; entries follow immediately:
//!
//! ```text
//! edges:        [count][site][site][site]...
//! comparisons:  [count][tag][arg1][arg2][site][tag][arg1][arg2][site]...
//! ```
//!
//! The count never exceeds the number of whole entries the buffer can hold.
//! Writers that would overflow drop the entry and leave the count untouched.
//!
//! Comparison tags carry the operand width in bits 1..=2 and a flag in bit 0
//! that is set when one operand is a compile-time constant.

pub mod entry;

pub use entry::{CmpEntry, decode_comparisons, decode_edges, recorded_entries};

use crate::types::TraceMode;

/// Bytes per buffer word.
pub const WORD_BYTES: usize = 8;

/// Index of the entry count word.
pub const COUNT_WORD: usize = 0;

/// Words written per comparison entry.
pub const WORDS_PER_CMP: usize = 4;

/// Smallest usable trace buffer: the count word plus one edge.
pub const MIN_TRACE_WORDS: usize = 2;

/// Tag bit set when one comparison operand is a constant.
pub const CMP_CONST: u64 = 1;

/// Encodes an operand size code (log2 of the width in bytes) into tag bits.
#[inline]
#[must_use]
pub const fn cmp_size(code: u64) -> u64 {
    code << 1
}

/// Number of whole entries a buffer of `words` words can hold.
#[inline]
#[must_use]
pub const fn capacity_entries(mode: TraceMode, words: usize) -> usize {
    words.saturating_sub(1) / mode.words_per_entry()
}

/// Word index where entry `index` starts, if it is addressable.
#[inline]
#[must_use]
pub fn entry_offset(mode: TraceMode, index: usize) -> Option<usize> {
    index
        .checked_mul(mode.words_per_entry())?
        .checked_add(COUNT_WORD + 1)
}

/// Width of the operands of a traced comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperandWidth {
    /// 8-bit operands.
    W8 = 0,
    /// 16-bit operands.
    W16 = 1,
    /// 32-bit operands.
    W32 = 2,
    /// 64-bit operands.
    W64 = 3,
}

impl OperandWidth {
    /// Returns log2 of the operand width in bytes.
    #[inline]
    #[must_use]
    pub const fn size_code(self) -> u64 {
        self as u64
    }

    /// Returns the operand width in bytes.
    #[must_use]
    pub const fn bytes(self) -> u32 {
        1 << (self as u32)
    }

    /// Decodes a width given in bits (as used by switch case tables).
    #[must_use]
    pub const fn from_bits(bits: u64) -> Option<Self> {
        match bits {
            8 => Some(Self::W8),
            16 => Some(Self::W16),
            32 => Some(Self::W32),
            64 => Some(Self::W64),
            _ => None,
        }
    }

    const fn from_size_code(code: u64) -> Self {
        match code & 0b11 {
            0 => Self::W8,
            1 => Self::W16,
            2 => Self::W32,
            _ => Self::W64,
        }
    }
}

/// Type tag written as the first word of a comparison entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CmpTag(u64);

impl CmpTag {
    /// Builds a tag from an operand width and the constant-operand flag.
    #[inline]
    #[must_use]
    pub const fn new(width: OperandWidth, is_const: bool) -> Self {
        let flag = if is_const { CMP_CONST } else { 0 };
        Self(cmp_size(width.size_code()) | flag)
    }

    /// Wraps a raw tag word read from a buffer.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw tag word.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns true if one operand was a compile-time constant.
    #[must_use]
    pub const fn is_const(self) -> bool {
        self.0 & CMP_CONST != 0
    }

    /// Returns the operand width encoded in the tag.
    #[must_use]
    pub const fn width(self) -> OperandWidth {
        OperandWidth::from_size_code(self.0 >> 1)
    }

    /// Returns the operand width in bytes.
    #[must_use]
    pub const fn size_bytes(self) -> u32 {
        self.width().bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_encoding_matches_layout() {
        assert_eq!(CmpTag::new(OperandWidth::W8, false).raw(), 0);
        assert_eq!(CmpTag::new(OperandWidth::W16, false).raw(), 2);
        assert_eq!(CmpTag::new(OperandWidth::W32, false).raw(), 4);
        assert_eq!(CmpTag::new(OperandWidth::W64, false).raw(), 6);
        assert_eq!(CmpTag::new(OperandWidth::W64, true).raw(), 7);
        assert_eq!(CmpTag::new(OperandWidth::W8, true).raw(), 1);
    }

    #[test]
    fn tag_decoding() {
        let tag = CmpTag::from_raw(5);
        assert!(tag.is_const());
        assert_eq!(tag.width(), OperandWidth::W32);
        assert_eq!(tag.size_bytes(), 4);
    }

    #[test]
    fn switch_widths() {
        assert_eq!(OperandWidth::from_bits(8), Some(OperandWidth::W8));
        assert_eq!(OperandWidth::from_bits(64), Some(OperandWidth::W64));
        assert_eq!(OperandWidth::from_bits(12), None);
        assert_eq!(OperandWidth::W16.bytes(), 2);
    }

    #[test]
    fn capacities() {
        assert_eq!(capacity_entries(TraceMode::Edges, 4), 3);
        assert_eq!(capacity_entries(TraceMode::Edges, 0), 0);
        assert_eq!(capacity_entries(TraceMode::Comparisons, 9), 2);
        assert_eq!(capacity_entries(TraceMode::Comparisons, 8), 1);
        assert_eq!(capacity_entries(TraceMode::Comparisons, 4), 0);
    }

    #[test]
    fn offsets() {
        assert_eq!(entry_offset(TraceMode::Edges, 0), Some(1));
        assert_eq!(entry_offset(TraceMode::Comparisons, 2), Some(9));
        assert_eq!(entry_offset(TraceMode::Comparisons, usize::MAX), None);
    }
}
