//! Optional tracing integration.
//!
//! With the `tracing-integration` feature (on by default) the logging macros
//! used throughout covtrace are the `tracing` crate's. Without it they expand
//! to nothing, so lifecycle logging costs nothing in builds that do not want
//! it. The recording entry points never log in either configuration.

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __covtrace_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing-integration"))]
pub use crate::__covtrace_noop as debug;
#[cfg(not(feature = "tracing-integration"))]
pub use crate::__covtrace_noop as error;
#[cfg(not(feature = "tracing-integration"))]
pub use crate::__covtrace_noop as info;
#[cfg(not(feature = "tracing-integration"))]
pub use crate::__covtrace_noop as trace;
#[cfg(not(feature = "tracing-integration"))]
pub use crate::__covtrace_noop as warn;
