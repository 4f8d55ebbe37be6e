//! Session modes and trace mode selectors.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::codec::WORDS_PER_CMP;
use crate::error::{Error, Result};

/// Mode of a session, and of a unit's binding.
///
/// `Disabled` and `Init` never record; the two tracing modes select the
/// entry layout written into the trace buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionMode {
    /// Freshly opened; capacity not yet fixed.
    #[default]
    Disabled = 0,
    /// Capacity fixed; ready to map and enable.
    Init = 1,
    /// Recording one word per control-flow edge.
    TraceEdges = 2,
    /// Recording four words per comparison.
    TraceComparisons = 3,
}

impl SessionMode {
    /// Returns the raw discriminant stored in a unit binding.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a raw binding discriminant; unknown values read as `Disabled`.
    #[inline]
    #[must_use]
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Init,
            2 => Self::TraceEdges,
            3 => Self::TraceComparisons,
            _ => Self::Disabled,
        }
    }

    /// Returns the trace mode when this is a tracing mode.
    #[must_use]
    pub const fn trace_mode(self) -> Option<TraceMode> {
        match self {
            Self::TraceEdges => Some(TraceMode::Edges),
            Self::TraceComparisons => Some(TraceMode::Comparisons),
            Self::Disabled | Self::Init => None,
        }
    }

    /// Returns true for the two recording modes.
    #[must_use]
    pub const fn is_tracing(self) -> bool {
        self.trace_mode().is_some()
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disabled => "disabled",
            Self::Init => "init",
            Self::TraceEdges => "trace-edges",
            Self::TraceComparisons => "trace-cmp",
        };
        f.write_str(name)
    }
}

/// What a tracing session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceMode {
    /// One site address per executed edge.
    Edges,
    /// Tag, two operands and site address per executed comparison.
    Comparisons,
}

impl TraceMode {
    /// Control-plane selector for [`TraceMode::Edges`].
    pub const EDGES_SELECTOR: u64 = 0;
    /// Control-plane selector for [`TraceMode::Comparisons`].
    pub const COMPARISONS_SELECTOR: u64 = 1;

    /// Decodes a control-plane mode selector.
    pub fn from_selector(selector: u64) -> Result<Self> {
        match selector {
            Self::EDGES_SELECTOR => Ok(Self::Edges),
            Self::COMPARISONS_SELECTOR => Ok(Self::Comparisons),
            other => Err(Error::invalid_argument(format!(
                "unknown trace mode selector {other}"
            ))),
        }
    }

    /// Returns the control-plane selector for this mode.
    #[must_use]
    pub const fn selector(self) -> u64 {
        match self {
            Self::Edges => Self::EDGES_SELECTOR,
            Self::Comparisons => Self::COMPARISONS_SELECTOR,
        }
    }

    /// Number of buffer words one entry occupies.
    #[inline]
    #[must_use]
    pub const fn words_per_entry(self) -> usize {
        match self {
            Self::Edges => 1,
            Self::Comparisons => WORDS_PER_CMP,
        }
    }

    /// Session mode a session enters when tracing in this mode.
    #[must_use]
    pub const fn session_mode(self) -> SessionMode {
        match self {
            Self::Edges => SessionMode::TraceEdges,
            Self::Comparisons => SessionMode::TraceComparisons,
        }
    }
}
