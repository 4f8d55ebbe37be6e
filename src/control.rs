//! Control-plane request encoding.
//!
//! A device-style transport exposes sessions through ioctl-like commands.
//! This module owns the command codes and the wire layout of the
//! remote-enable argument; [`SessionHandle::dispatch`](crate::SessionHandle::dispatch)
//! decodes a raw command and runs it.
//!
//! ```text
//! RemoteArg (little endian):
//!   u32 trace_mode | u32 area_size | u32 num_handles | u32 unused | u64 handles[num_handles]
//! ```

use smallvec::SmallVec;

use crate::error::{Error, ErrorKind, Result};
use crate::types::TraceMode;

const IOC_NONE: u32 = 0;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;
const IOC_TYPE: u32 = b'c' as u32;

const fn ioc(dir: u32, nr: u32, size: u32) -> u32 {
    (dir << 30) | (size << 16) | (IOC_TYPE << 8) | nr
}

/// Fix the buffer capacity; argument is the capacity in words.
pub const INIT_TRACE: u32 = ioc(IOC_READ, 1, 8);
/// Enable local tracing; argument is the mode selector.
pub const ENABLE: u32 = ioc(IOC_NONE, 100, 0);
/// Disable tracing; argument must be zero.
pub const DISABLE: u32 = ioc(IOC_NONE, 101, 0);
/// Enable remote tracing; payload is an encoded [`RemoteArg`].
pub const REMOTE_ENABLE: u32 = ioc(IOC_WRITE, 102, RemoteArg::HEADER_BYTES as u32);

/// Argument of a remote-enable request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArg {
    /// Mode selector (`0` edges, `1` comparisons).
    pub trace_mode: u32,
    /// Scratch area size in words.
    pub area_size: u32,
    /// Number of handles the client declares.
    pub num_handles: u32,
    /// Reserved, must be zero.
    pub unused: u32,
    /// Raw remote handles.
    pub handles: SmallVec<[u64; 8]>,
}

impl RemoteArg {
    /// Size of the fixed header preceding the handle list.
    pub const HEADER_BYTES: usize = 16;

    /// Builds a well-formed argument.
    #[must_use]
    pub fn new(mode: TraceMode, area_size: u32, handles: &[u64]) -> Self {
        Self {
            trace_mode: mode.selector() as u32,
            area_size,
            num_handles: handles.len() as u32,
            unused: 0,
            handles: SmallVec::from_slice(handles),
        }
    }

    /// Checks the declared handle count, the list length and the reserved word.
    pub fn validate(&self, max_handles: usize) -> Result<()> {
        if self.num_handles as usize > max_handles {
            return Err(Error::invalid_argument(format!(
                "{} handles exceed the limit of {max_handles}",
                self.num_handles
            )));
        }
        if self.num_handles as usize != self.handles.len() {
            return Err(Error::invalid_argument(format!(
                "declared {} handles, got {}",
                self.num_handles,
                self.handles.len()
            )));
        }
        if self.unused != 0 {
            return Err(Error::invalid_argument("reserved remote-enable field must be zero"));
        }
        Ok(())
    }

    /// Decodes an argument. The declared count is checked against
    /// `max_handles` before the handle list is read.
    pub fn decode(bytes: &[u8], max_handles: usize) -> Result<Self> {
        let header = bytes
            .get(..Self::HEADER_BYTES)
            .ok_or_else(|| Error::invalid_argument("remote-enable argument truncated"))?;
        let field = |i: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&header[i * 4..i * 4 + 4]);
            u32::from_le_bytes(raw)
        };
        let (trace_mode, area_size, num_handles, unused) = (field(0), field(1), field(2), field(3));
        if num_handles as usize > max_handles {
            return Err(Error::invalid_argument(format!(
                "{num_handles} handles exceed the limit of {max_handles}"
            )));
        }
        let list_len = num_handles as usize * 8;
        let list = bytes
            .get(Self::HEADER_BYTES..Self::HEADER_BYTES + list_len)
            .ok_or_else(|| Error::invalid_argument("remote-enable handle list truncated"))?;
        let handles = list
            .chunks_exact(8)
            .map(|chunk| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                u64::from_le_bytes(raw)
            })
            .collect();
        let arg = Self {
            trace_mode,
            area_size,
            num_handles,
            unused,
            handles,
        };
        arg.validate(max_handles)?;
        Ok(arg)
    }

    /// Encodes the argument in wire layout.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_BYTES + self.handles.len() * 8);
        for word in [self.trace_mode, self.area_size, self.num_handles, self.unused] {
            out.extend_from_slice(&word.to_le_bytes());
        }
        for handle in &self.handles {
            out.extend_from_slice(&handle.to_le_bytes());
        }
        out
    }
}

/// A decoded control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// Fix the buffer capacity in words.
    InitTrace {
        /// Capacity in words, count word included.
        words: u64,
    },
    /// Enable local tracing on the calling unit.
    Enable {
        /// Mode selector.
        selector: u64,
    },
    /// Disable tracing on the calling unit.
    Disable {
        /// Must be zero.
        unused: u64,
    },
    /// Register remote handles.
    RemoteEnable(RemoteArg),
}

impl ControlRequest {
    /// Decodes a raw command.
    ///
    /// # Errors
    ///
    /// `UnknownCommand` for unrecognised codes; `InvalidArgument` for a
    /// malformed remote-enable payload.
    pub fn decode(command: u32, arg: u64, payload: &[u8], max_handles: usize) -> Result<Self> {
        match command {
            INIT_TRACE => Ok(Self::InitTrace { words: arg }),
            ENABLE => Ok(Self::Enable { selector: arg }),
            DISABLE => Ok(Self::Disable { unused: arg }),
            REMOTE_ENABLE => RemoteArg::decode(payload, max_handles).map(Self::RemoteEnable),
            other => Err(Error::new(ErrorKind::UnknownCommand)
                .with_message(format!("command {other:#x}"))),
        }
    }

    /// Command code of this request.
    #[must_use]
    pub const fn command(&self) -> u32 {
        match self {
            Self::InitTrace { .. } => INIT_TRACE,
            Self::Enable { .. } => ENABLE,
            Self::Disable { .. } => DISABLE,
            Self::RemoteEnable(_) => REMOTE_ENABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_codes() {
        assert_eq!(INIT_TRACE, 0x8008_6301);
        assert_eq!(ENABLE, 0x6364);
        assert_eq!(DISABLE, 0x6365);
        assert_eq!(REMOTE_ENABLE, 0x4010_6366);
    }

    #[test]
    fn remote_arg_wire_layout() {
        crate::test_utils::init_test_logging();
        let arg = RemoteArg::new(TraceMode::Comparisons, 64, &[0x0100_0000_0000_0002]);
        let bytes = arg.encode();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &64u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &1u32.to_le_bytes());
        assert_eq!(RemoteArg::decode(&bytes, 8).expect("decode"), arg);
    }

    #[test]
    fn remote_arg_rejects_malformed() {
        let mut arg = RemoteArg::new(TraceMode::Edges, 64, &[1, 2]);
        let bytes = arg.encode();
        assert!(RemoteArg::decode(&bytes[..20], 8).is_err());
        assert!(RemoteArg::decode(&bytes, 1).is_err());

        arg.unused = 5;
        assert!(RemoteArg::decode(&arg.encode(), 8).is_err());

        arg.unused = 0;
        arg.num_handles = 3;
        assert_eq!(
            arg.validate(8).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn unknown_command() {
        let err = ControlRequest::decode(0x1234, 0, &[], 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownCommand);
        assert_eq!(err.errno(), 25);
    }

    #[test]
    fn decode_simple_commands() {
        assert_eq!(
            ControlRequest::decode(INIT_TRACE, 64, &[], 8).unwrap(),
            ControlRequest::InitTrace { words: 64 }
        );
        let req = ControlRequest::decode(ENABLE, 1, &[], 8).unwrap();
        assert_eq!(req, ControlRequest::Enable { selector: 1 });
        assert_eq!(req.command(), ENABLE);
        assert_eq!(
            ControlRequest::decode(DISABLE, 0, &[], 8).unwrap().command(),
            DISABLE
        );
    }
}
