//! Stateful Opus codec sessions with loss recovery.
//!
//! This crate wraps libopus encoder and decoder instances as owned
//! sessions and layers a multi-frame loss-recovery engine on top of the
//! decoder:
//!
//! - `encoder`: compresses interleaved PCM frames into packets
//! - `decoder`: decodes packets, conceals losses, recovers the previous
//!   frame from in-band FEC
//! - `recovery`: reconstructs several consecutive lost frames from the
//!   packet that arrived after the gap
//! - `error`: translates native status codes into a structured failure
//!   taxonomy
//!
//! The optional `dred` feature adds deep-redundancy recovery, which can
//! re-synthesize frames further back than one packet. It requires
//! libopus 1.5+ built with DRED support.
//!
//! # Example
//!
//! ```ignore
//! use opuslink_codec::{Application, Channels, Decoder, Encoder};
//!
//! let mut encoder = Encoder::new(48000, Channels::Mono, Application::VoIP)?;
//! let packet = encoder.encode(&vec![0i16; 960])?;
//!
//! let mut decoder = Decoder::new(48000, Channels::Mono)?;
//! let frame = decoder.decode(Some(&packet), false)?;
//!
//! // Two packets were lost before `packet` arrived:
//! let frames = decoder.recover(&packet, 3)?;
//! ```

pub mod decoder;
pub mod encoder;
pub mod error;
mod ffi;
mod recovery;

pub use decoder::{DEFAULT_FRAME_SIZE, Decoder};
pub use encoder::{Application, Encoder, MAX_PAYLOAD_CEILING};
pub use error::{Error, NativeStatus, Result};

/// Channel layout of a codec session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channels {
    /// Single channel
    Mono = 1,
    /// Two interleaved channels
    Stereo = 2,
}

impl Channels {
    /// Samples per frame instant.
    pub fn count(self) -> usize {
        self as usize
    }
}

impl TryFrom<i32> for Channels {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            1 => Ok(Self::Mono),
            2 => Ok(Self::Stereo),
            other => Err(Error::InvalidArgument(format!(
                "invalid number of channels: {}",
                other
            ))),
        }
    }
}

/// Returns the version string of the linked libopus.
pub fn version() -> String {
    unsafe {
        let ptr = ffi::opus_get_version_string();
        if ptr.is_null() {
            return String::new();
        }
        std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}
