//! Error types and error handling strategy for covtrace.
//!
//! Control-plane operations return explicit, typed errors. The recording path
//! and remote sections never return errors: a full buffer, a stale remote
//! section, or an unknown handle are expected steady-state conditions and are
//! dropped silently (and counted, see [`crate::observability`]).
//!
//! # Error Categories
//!
//! - **InvalidState**: operation attempted from a mode that forbids it
//! - **InvalidArgument**: bad capacity, mode selector, mapping or handle list
//! - **Busy / AlreadyRegistered**: the session or a handle is already taken
//! - **ResourceExhausted**: trace or scratch memory could not be allocated
//! - **Unsupported / UnknownCommand**: feature disabled or command not understood
//!
//! Every kind maps onto the errno a device-style transport would report via
//! [`Error::errno`].

use core::fmt;
use thiserror::Error as ThisError;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ThisError)]
pub enum ErrorKind {
    /// Operation attempted from a session mode that forbids it.
    #[error("invalid session state")]
    InvalidState,
    /// A request argument was out of range or malformed.
    #[error("invalid argument")]
    InvalidArgument,
    /// The session (or the calling unit) is already bound elsewhere.
    #[error("resource busy")]
    Busy,
    /// A remote handle is already registered with a session.
    #[error("remote handle already registered")]
    AlreadyRegistered,
    /// Memory for a trace buffer, scratch area or directory entry was unavailable.
    #[error("resource exhausted")]
    ResourceExhausted,
    /// The requested mode is disabled by configuration.
    #[error("operation not supported")]
    Unsupported,
    /// The control command code is not recognised.
    #[error("unknown control command")]
    UnknownCommand,
}

impl ErrorKind {
    /// Returns the errno a device-style transport reports for this kind.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::InvalidState | Self::InvalidArgument => 22, // EINVAL
            Self::Busy => 16,                                  // EBUSY
            Self::AlreadyRegistered => 17,                     // EEXIST
            Self::ResourceExhausted => 12,                     // ENOMEM
            Self::Unsupported => 524,                          // ENOTSUPP
            Self::UnknownCommand => 25,                        // ENOTTY
        }
    }

    /// Returns true if the error belongs to the busy family (EBUSY/EEXIST).
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Busy | Self::AlreadyRegistered)
    }
}

/// The main error type for covtrace operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the errno a device-style transport reports for this error.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        self.kind.errno()
    }

    /// Creates an invalid state error.
    #[must_use]
    pub fn invalid_state(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState).with_message(detail)
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument).with_message(detail)
    }

    /// Creates a busy error.
    #[must_use]
    pub fn busy(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Busy).with_message(detail)
    }

    /// Creates an already-registered error for a remote handle.
    #[must_use]
    pub fn already_registered(handle: u64) -> Self {
        Self::new(ErrorKind::AlreadyRegistered)
            .with_message(format!("handle {handle:#x} is already registered"))
    }

    /// Creates a resource exhausted error.
    #[must_use]
    pub fn resource_exhausted(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// A specialized Result type for covtrace operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_message() {
        let err = Error::new(ErrorKind::Busy);
        assert_eq!(err.to_string(), "resource busy");
    }

    #[test]
    fn display_with_message() {
        let err = Error::invalid_argument("capacity 1 below minimum");
        assert_eq!(
            err.to_string(),
            "invalid argument: capacity 1 below minimum"
        );
        assert_eq!(err.message(), Some("capacity 1 below minimum"));
    }

    #[test]
    fn errno_mapping() {
        assert_eq!(Error::new(ErrorKind::InvalidState).errno(), 22);
        assert_eq!(Error::new(ErrorKind::InvalidArgument).errno(), 22);
        assert_eq!(Error::new(ErrorKind::Busy).errno(), 16);
        assert_eq!(Error::already_registered(7).errno(), 17);
        assert_eq!(Error::resource_exhausted("x").errno(), 12);
        assert_eq!(Error::new(ErrorKind::Unsupported).errno(), 524);
        assert_eq!(Error::new(ErrorKind::UnknownCommand).errno(), 25);
    }

    #[test]
    fn busy_family() {
        assert!(ErrorKind::Busy.is_busy());
        assert!(ErrorKind::AlreadyRegistered.is_busy());
        assert!(!ErrorKind::InvalidState.is_busy());
    }

    #[test]
    fn already_registered_names_handle() {
        let err = Error::already_registered(0x0100_0000_0000_0003);
        assert!(err.to_string().contains("0x100000000000003"), "{err}");
    }

    #[test]
    fn from_kind() {
        let err: Error = ErrorKind::ResourceExhausted.into();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert!(err.message().is_none());
    }
}
