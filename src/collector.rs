//! Process-wide collector state.
//!
//! A [`Collector`] owns everything sessions share: the configuration, the
//! remote handle directory and scratch pool (behind one lock), and the
//! observability counters. Most programs use the lazily created
//! [`Collector::global`] instance through the crate-level functions;
//! independent collectors are useful for tests and for embedding several
//! isolated fuzz targets in one process.

use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::config::CovConfig;
use crate::error::Result;
use crate::observability::{CollectorStats, StatsSnapshot};
use crate::remote::{RemoteHandle, RemoteShared, section};
use crate::session::{Session, SessionHandle};
use crate::tracing_compat::{debug, warn};

/// State shared by a collector and all of its sessions.
#[derive(Debug)]
pub(crate) struct CollectorShared {
    pub(crate) config: CovConfig,
    pub(crate) remote: Mutex<RemoteShared>,
    pub(crate) stats: CollectorStats,
}

/// Entry point for opening sessions and running remote sections.
#[derive(Debug, Clone)]
pub struct Collector {
    shared: Arc<CollectorShared>,
}

static GLOBAL: OnceLock<Collector> = OnceLock::new();

impl Collector {
    /// Creates an independent collector.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the configuration does not validate.
    pub fn new(config: CovConfig) -> Result<Self> {
        config.validate()?;
        debug!(?config, "collector created");
        Ok(Self {
            shared: Arc::new(CollectorShared {
                config,
                remote: Mutex::new(RemoteShared::new()),
                stats: CollectorStats::new(),
            }),
        })
    }

    /// The process-wide collector, configured from `COVTRACE_*` environment
    /// variables on first use. An invalid environment falls back to defaults.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| {
            let config = CovConfig::from_env().unwrap_or_else(|err| {
                warn!(error = %err, "ignoring invalid covtrace environment");
                CovConfig::default()
            });
            let shared = CollectorShared {
                config,
                remote: Mutex::new(RemoteShared::new()),
                stats: CollectorStats::new(),
            };
            Self {
                shared: Arc::new(shared),
            }
        })
    }

    /// Opens a new session in `Disabled` mode.
    #[must_use]
    pub fn open(&self) -> SessionHandle {
        SessionHandle::new(Session::new(Arc::clone(&self.shared)))
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &CovConfig {
        &self.shared.config
    }

    /// Snapshot of the collector counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Starts a remote section for `handle` on the calling thread.
    ///
    /// Does nothing if the handle is not registered, the thread is already
    /// bound (tracing locally, owning a remote registration, or inside
    /// another section), or the thread is in interrupt context.
    pub fn remote_start(&self, handle: u64) {
        section::start(&self.shared, handle);
    }

    /// Starts a remote section for events on USB bus `bus`.
    pub fn remote_start_usb(&self, bus: u32) {
        self.remote_start(RemoteHandle::usb(bus).raw());
    }

    /// Ends the calling thread's remote section. See [`crate::remote_stop`].
    pub fn remote_stop(&self) {
        section::stop();
    }

    /// Runs a remote section for `handle` until the returned guard drops.
    #[must_use = "the section ends when the guard is dropped"]
    pub fn remote_section(&self, handle: u64) -> RemoteSectionGuard {
        self.remote_start(handle);
        RemoteSectionGuard {
            _not_send: PhantomData,
        }
    }

    /// Returns true if `handle` is registered with some session.
    #[must_use]
    pub fn is_registered(&self, handle: u64) -> bool {
        self.shared
            .remote
            .lock()
            .directory
            .contains(RemoteHandle::from_raw(handle))
    }

    /// Number of registered handles across all sessions.
    #[must_use]
    pub fn registered_handles(&self) -> usize {
        self.shared.remote.lock().directory.len()
    }

    /// Number of idle scratch areas in the pool.
    #[must_use]
    pub fn idle_scratch_areas(&self) -> usize {
        self.shared.remote.lock().pool.idle()
    }
}

/// Ends the remote section started by [`Collector::remote_section`] when dropped.
#[derive(Debug)]
pub struct RemoteSectionGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for RemoteSectionGuard {
    fn drop(&mut self) {
        section::stop();
    }
}
