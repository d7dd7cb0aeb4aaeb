//! Error taxonomy and native status translation.

use std::fmt;
use thiserror::Error;

use crate::ffi;

/// Translated libopus status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeStatus {
    /// No error
    Ok,
    /// One or more invalid or out-of-range arguments
    BadArg,
    /// Not enough bytes allocated in the buffer
    BufferTooSmall,
    /// An internal error was detected
    InternalError,
    /// The compressed data passed is corrupted
    InvalidPacket,
    /// Invalid or unsupported request number
    Unimplemented,
    /// A codec structure is invalid or already freed
    InvalidState,
    /// Memory allocation has failed
    AllocFail,
    /// A status code this binding does not know about
    Unknown(i32),
}

impl NativeStatus {
    /// Translates a raw libopus return code. Total: codes outside the
    /// documented set fold into [`NativeStatus::Unknown`] instead of
    /// failing the translation.
    pub fn from_code(code: i32) -> Self {
        match code {
            ffi::OPUS_OK => Self::Ok,
            ffi::OPUS_BAD_ARG => Self::BadArg,
            ffi::OPUS_BUFFER_TOO_SMALL => Self::BufferTooSmall,
            ffi::OPUS_INTERNAL_ERROR => Self::InternalError,
            ffi::OPUS_INVALID_PACKET => Self::InvalidPacket,
            ffi::OPUS_UNIMPLEMENTED => Self::Unimplemented,
            ffi::OPUS_INVALID_STATE => Self::InvalidState,
            ffi::OPUS_ALLOC_FAIL => Self::AllocFail,
            other => Self::Unknown(other),
        }
    }

    /// Returns the libopus constant name for this status.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ok => "OPUS_OK",
            Self::BadArg => "OPUS_BAD_ARG",
            Self::BufferTooSmall => "OPUS_BUFFER_TOO_SMALL",
            Self::InternalError => "OPUS_INTERNAL_ERROR",
            Self::InvalidPacket => "OPUS_INVALID_PACKET",
            Self::Unimplemented => "OPUS_UNIMPLEMENTED",
            Self::InvalidState => "OPUS_INVALID_STATE",
            Self::AllocFail => "OPUS_ALLOC_FAIL",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for NativeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "UNKNOWN({})", code),
            other => f.write_str(other.name()),
        }
    }
}

/// Errors surfaced by codec sessions.
#[derive(Error, Debug)]
pub enum Error {
    /// A caller-supplied parameter is out of contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The session was destroyed, or the handle never referenced one.
    #[error("session is closed")]
    SessionClosed,

    /// libopus reported a failure status.
    #[error("{op}: {status}")]
    Codec {
        /// The operation that failed.
        op: &'static str,
        /// Translated native status.
        status: NativeStatus,
    },

    /// An internal invariant was violated. Indicates a library/binding
    /// contract mismatch, not a caller error.
    #[error("illegal state: {0}")]
    IllegalState(String),
}

impl Error {
    pub(crate) fn codec(op: &'static str, code: i32) -> Self {
        Self::Codec {
            op,
            status: NativeStatus::from_code(code),
        }
    }
}

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;
