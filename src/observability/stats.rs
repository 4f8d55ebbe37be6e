//! Monotone collector counters.
//!
//! All counters use relaxed atomics; they are statistics, not
//! synchronisation, and are never read on the recording path.
//!
//! ```
//! use covtrace::observability::CollectorStats;
//!
//! let stats = CollectorStats::new();
//! stats.session_created();
//! stats.section_started();
//! stats.section_discarded();
//! let snap = stats.snapshot();
//! assert_eq!(snap.sessions_live(), 1);
//! assert_eq!(snap.sections_in_flight(), 0);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by a [`Collector`](crate::Collector).
#[derive(Debug, Default)]
pub struct CollectorStats {
    sessions_created: AtomicU64,
    sessions_destroyed: AtomicU64,
    sections_started: AtomicU64,
    sections_merged: AtomicU64,
    sections_discarded: AtomicU64,
    entries_merged: AtomicU64,
    scratch_allocated: AtomicU64,
    scratch_reused: AtomicU64,
    scratch_alloc_failures: AtomicU64,
    remote_start_misses: AtomicU64,
    remote_start_rejected: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl CollectorStats {
    /// Creates a zeroed set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ================================================================
    // Session lifecycle
    // ================================================================

    /// Record that a session was opened.
    pub fn session_created(&self) {
        bump(&self.sessions_created);
    }

    /// Record that a session's last owner released it.
    pub fn session_destroyed(&self) {
        bump(&self.sessions_destroyed);
    }

    // ================================================================
    // Remote sections
    // ================================================================

    /// Record that a remote section bound a scratch area.
    pub fn section_started(&self) {
        bump(&self.sections_started);
    }

    /// Record that a remote section merged `entries` entries into its session.
    pub fn section_merged(&self, entries: usize) {
        bump(&self.sections_merged);
        self.entries_merged
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    /// Record that a remote section ended after its session was reset.
    pub fn section_discarded(&self) {
        bump(&self.sections_discarded);
    }

    /// Record a remote start for a handle nobody registered.
    pub fn remote_start_missed(&self) {
        bump(&self.remote_start_misses);
    }

    /// Record a remote start refused because the unit was already bound or
    /// running interrupt-context code.
    pub fn remote_start_rejected(&self) {
        bump(&self.remote_start_rejected);
    }

    // ================================================================
    // Scratch pool
    // ================================================================

    /// Record a freshly allocated scratch area.
    pub fn scratch_allocated(&self) {
        bump(&self.scratch_allocated);
    }

    /// Record a scratch area taken from the pool.
    pub fn scratch_reused(&self) {
        bump(&self.scratch_reused);
    }

    /// Record a scratch allocation failure.
    pub fn scratch_alloc_failed(&self) {
        bump(&self.scratch_alloc_failures);
    }

    // ================================================================
    // Snapshot
    // ================================================================

    /// Takes a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_destroyed: self.sessions_destroyed.load(Ordering::Relaxed),
            sections_started: self.sections_started.load(Ordering::Relaxed),
            sections_merged: self.sections_merged.load(Ordering::Relaxed),
            sections_discarded: self.sections_discarded.load(Ordering::Relaxed),
            entries_merged: self.entries_merged.load(Ordering::Relaxed),
            scratch_allocated: self.scratch_allocated.load(Ordering::Relaxed),
            scratch_reused: self.scratch_reused.load(Ordering::Relaxed),
            scratch_alloc_failures: self.scratch_alloc_failures.load(Ordering::Relaxed),
            remote_start_misses: self.remote_start_misses.load(Ordering::Relaxed),
            remote_start_rejected: self.remote_start_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CollectorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Sessions opened.
    pub sessions_created: u64,
    /// Sessions torn down.
    pub sessions_destroyed: u64,
    /// Remote sections that bound a scratch area.
    pub sections_started: u64,
    /// Remote sections merged into their session.
    pub sections_merged: u64,
    /// Remote sections dropped because their session was reset meanwhile.
    pub sections_discarded: u64,
    /// Entries moved into session buffers by merges.
    pub entries_merged: u64,
    /// Scratch areas allocated.
    pub scratch_allocated: u64,
    /// Scratch areas reused from the pool.
    pub scratch_reused: u64,
    /// Scratch allocations that failed.
    pub scratch_alloc_failures: u64,
    /// Remote starts for unregistered handles.
    pub remote_start_misses: u64,
    /// Remote starts refused on a bound or interrupt-context unit.
    pub remote_start_rejected: u64,
}

impl StatsSnapshot {
    /// Sessions opened but not yet torn down.
    #[must_use]
    pub const fn sessions_live(&self) -> u64 {
        self.sessions_created.saturating_sub(self.sessions_destroyed)
    }

    /// Remote sections started but not yet finished.
    #[must_use]
    pub const fn sections_in_flight(&self) -> u64 {
        self.sections_started
            .saturating_sub(self.sections_merged + self.sections_discarded)
    }

    /// Serialises the snapshot as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Renders a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();

        writeln!(out, "Collector Stats").ok();
        writeln!(out, "===============").ok();
        writeln!(
            out,
            "sessions: created={} destroyed={} live={}",
            self.sessions_created,
            self.sessions_destroyed,
            self.sessions_live()
        )
        .ok();
        writeln!(
            out,
            "sections: started={} merged={} discarded={} entries={}",
            self.sections_started, self.sections_merged, self.sections_discarded, self.entries_merged
        )
        .ok();
        writeln!(
            out,
            "scratch: allocated={} reused={} failures={}",
            self.scratch_allocated, self.scratch_reused, self.scratch_alloc_failures
        )
        .ok();
        writeln!(
            out,
            "remote start: misses={} rejected={}",
            self.remote_start_misses, self.remote_start_rejected
        )
        .ok();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        crate::test_utils::init_test_logging();
        let stats = CollectorStats::new();
        stats.session_created();
        stats.session_created();
        stats.session_destroyed();
        stats.section_started();
        stats.section_started();
        stats.section_merged(5);
        stats.scratch_allocated();
        stats.scratch_reused();
        stats.remote_start_missed();

        let snap = stats.snapshot();
        assert_eq!(snap.sessions_live(), 1);
        assert_eq!(snap.sections_in_flight(), 1);
        assert_eq!(snap.entries_merged, 5);
        assert_eq!(snap.scratch_allocated, 1);
        assert_eq!(snap.remote_start_misses, 1);
    }

    #[test]
    fn snapshot_serialises() {
        let stats = CollectorStats::new();
        stats.section_discarded();
        let json = stats.snapshot().to_json().expect("json");
        assert!(json.contains("\"sections_discarded\":1"), "{json}");
        let back: StatsSnapshot = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, stats.snapshot());
    }

    #[test]
    fn summary_mentions_every_group() {
        let summary = CollectorStats::new().snapshot().summary();
        for needle in ["sessions:", "sections:", "scratch:", "remote start:"] {
            assert!(summary.contains(needle), "{summary}");
        }
    }
}
