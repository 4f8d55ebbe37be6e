//! Shared helpers for covtrace integration tests.

#![allow(dead_code)]

use std::sync::Once;
use std::thread;

use covtrace::{Collector, CovConfig, SessionHandle, TraceMapping};

static INIT_LOGGING: Once = Once::new();

pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("covtrace=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

pub fn init_test(name: &str) {
    init_test_logging();
    tracing::info!(test = name, "=== TEST START ===");
}

pub fn collector() -> Collector {
    Collector::new(CovConfig::default()).expect("default config is valid")
}

/// Opens a session, fixes its capacity and maps the whole buffer.
pub fn mapped_session(collector: &Collector, words: u64) -> (SessionHandle, TraceMapping) {
    let handle = collector.open();
    handle.init_trace(words).expect("init_trace");
    let mapping = handle.map_full().expect("map");
    (handle, mapping)
}

/// Runs `f` on a new thread and returns after that thread has fully exited.
///
/// The explicit join waits for thread-local teardown, which is where a unit
/// releases whatever it still holds; leaving a `thread::scope` does not.
pub fn on_exiting_unit<R: Send>(f: impl FnOnce() -> R + Send) -> R {
    thread::scope(|scope| scope.spawn(f).join().expect("unit panicked"))
}
