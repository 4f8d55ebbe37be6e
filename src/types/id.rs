//! Identifier types for execution units and sessions.
//!
//! Both identifiers are allocated from process-wide monotonically increasing
//! counters and are never reused within a process.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_UNIT: AtomicU64 = AtomicU64::new(1);
static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Identity of an execution unit (one per OS thread).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(u64);

impl UnitId {
    /// Allocates a fresh unit identity.
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(NEXT_UNIT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitId({})", self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U{}", self.0)
    }
}

/// Identity of a trace session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocates a fresh session identity.
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = UnitId::next();
        let b = UnitId::next();
        assert!(b > a);
        let s1 = SessionId::next();
        let s2 = SessionId::next();
        assert_ne!(s1, s2);
    }

    #[test]
    fn display_and_debug() {
        let id = SessionId(42);
        assert_eq!(id.to_string(), "S42");
        assert_eq!(format!("{id:?}"), "SessionId(42)");
        let unit = UnitId(7);
        assert_eq!(unit.to_string(), "U7");
        assert_eq!(unit.as_u64(), 7);
    }
}
