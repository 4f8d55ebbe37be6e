//! Remote handle encoding.
//!
//! A handle is an opaque 64-bit key naming the target of remote
//! attribution; the directory never looks inside it. Handles built by
//! [`RemoteHandle::new`] follow a conventional layout: the top byte selects
//! the issuing subsystem and the low 32 bits carry a subsystem-defined
//! instance (a bus number, a device id). Clients are free to use any other
//! value.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Subsystem that issues a remote handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Subsystem {
    /// Generic background work.
    Common = 0,
    /// USB bus event processing; the instance is the bus number.
    Usb = 1,
}

impl Subsystem {
    const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Common),
            1 => Some(Self::Usb),
            _ => None,
        }
    }
}

/// A remote attribution handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteHandle(u64);

impl RemoteHandle {
    /// Bit position of the subsystem byte.
    pub const SUBSYSTEM_SHIFT: u32 = 56;
    /// Mask selecting the subsystem byte.
    pub const SUBSYSTEM_MASK: u64 = 0xff << Self::SUBSYSTEM_SHIFT;
    /// Mask selecting the instance.
    pub const INSTANCE_MASK: u64 = 0xffff_ffff;

    /// Builds the handle for `instance` of `subsystem`.
    #[must_use]
    pub const fn new(subsystem: Subsystem, instance: u32) -> Self {
        Self(((subsystem as u64) << Self::SUBSYSTEM_SHIFT) | instance as u64)
    }

    /// Handle for generic background work.
    #[must_use]
    pub const fn common(instance: u32) -> Self {
        Self::new(Subsystem::Common, instance)
    }

    /// Handle for event processing on USB bus `bus`.
    #[must_use]
    pub const fn usb(bus: u32) -> Self {
        Self::new(Subsystem::Usb, bus)
    }

    /// Wraps any raw 64-bit handle received from a client.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit handle.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns the issuing subsystem when the handle follows the
    /// conventional layout.
    #[must_use]
    pub const fn subsystem(self) -> Option<Subsystem> {
        if self.0 & !(Self::SUBSYSTEM_MASK | Self::INSTANCE_MASK) != 0 {
            return None;
        }
        Subsystem::from_u8(self.subsystem_byte())
    }

    /// Returns the instance part.
    #[must_use]
    pub const fn instance(self) -> u32 {
        (self.0 & Self::INSTANCE_MASK) as u32
    }

    const fn subsystem_byte(self) -> u8 {
        (self.0 >> Self::SUBSYSTEM_SHIFT) as u8
    }
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteHandle({:#x})", self.0)
    }
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subsystem() {
            Some(Subsystem::Common) => write!(f, "common:{}", self.instance()),
            Some(Subsystem::Usb) => write!(f, "usb:{}", self.instance()),
            None => write!(f, "{:#x}", self.0),
        }
    }
}

impl From<RemoteHandle> for u64 {
    fn from(handle: RemoteHandle) -> Self {
        handle.0
    }
}
