//! Opus encoder session.

use std::ptr;

use tracing::debug;

use crate::Channels;
use crate::error::{Error, Result};
use crate::ffi;

/// Default scratch size for encoded packets, in bytes.
const DEFAULT_MAX_PAYLOAD_SIZE: i32 = 1024;

/// Hard ceiling for the encode scratch buffer, in bytes.
pub const MAX_PAYLOAD_CEILING: i32 = 4096;

/// Opus application type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Application {
    /// Best quality for voice signals.
    VoIP,
    /// Best quality for non-voice signals.
    Audio,
    /// Minimum possible coding delay.
    RestrictedLowdelay,
}

impl Application {
    fn to_ffi(self) -> i32 {
        match self {
            Self::VoIP => ffi::OPUS_APPLICATION_VOIP,
            Self::Audio => ffi::OPUS_APPLICATION_AUDIO,
            Self::RestrictedLowdelay => ffi::OPUS_APPLICATION_RESTRICTED_LOWDELAY,
        }
    }

    /// Maps a boundary value to an application type. Unrecognized
    /// values fall back to VoIP so callers built against a newer value
    /// set keep working.
    pub fn from_value(value: i32) -> Self {
        match value {
            1 => Self::Audio,
            2 => Self::RestrictedLowdelay,
            _ => Self::VoIP,
        }
    }
}

/// Opus encoder session.
///
/// Owns exactly one native encoder instance. Sample rate and channel
/// count are fixed at creation; the maximum payload size is adjustable
/// up to [`MAX_PAYLOAD_CEILING`].
#[derive(Debug)]
pub struct Encoder {
    handle: *mut ffi::OpusEncoder,
    sample_rate: i32,
    channels: Channels,
    max_payload_size: i32,
}

// Safety: the encoder handle is not shared across threads.
unsafe impl Send for Encoder {}

impl Drop for Encoder {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { ffi::opus_encoder_destroy(self.handle) };
            self.handle = ptr::null_mut();
        }
    }
}

impl Encoder {
    /// Creates a new encoder session.
    ///
    /// # Parameters
    /// - `sample_rate`: Sample rate (8000, 12000, 16000, 24000, or 48000)
    /// - `channels`: Channel layout
    /// - `application`: Intended application type
    pub fn new(sample_rate: i32, channels: Channels, application: Application) -> Result<Self> {
        let mut error: i32 = 0;
        let handle = unsafe {
            ffi::opus_encoder_create(
                sample_rate,
                channels.count() as i32,
                application.to_ffi(),
                &mut error,
            )
        };

        if handle.is_null() || error != ffi::OPUS_OK {
            return Err(Error::codec("create encoder", error));
        }

        debug!(
            "Created encoder session ({}Hz, {:?}, {:?})",
            sample_rate, channels, application
        );

        Ok(Self {
            handle,
            sample_rate,
            channels,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        })
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> i32 {
        self.sample_rate
    }

    /// Returns the channel layout.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Returns true once the native instance has been released.
    pub fn is_closed(&self) -> bool {
        self.handle.is_null()
    }

    /// Returns the maximum payload size in bytes.
    pub fn max_payload_size(&self) -> i32 {
        self.max_payload_size
    }

    /// Sets the maximum payload size in bytes.
    ///
    /// The encode scratch buffer is sized by this value, so it is
    /// bounded by [`MAX_PAYLOAD_CEILING`]. The prior value is kept when
    /// the new one is out of contract.
    pub fn set_max_payload_size(&mut self, bytes: i32) -> Result<()> {
        if bytes <= 0 {
            return Err(Error::InvalidArgument(format!(
                "invalid maximum payload size: {}",
                bytes
            )));
        }
        if bytes > MAX_PAYLOAD_CEILING {
            return Err(Error::InvalidArgument(format!(
                "maximum payload size too large: {}",
                bytes
            )));
        }
        self.max_payload_size = bytes;
        Ok(())
    }

    /// Compresses one frame of interleaved PCM into a packet.
    ///
    /// The input must hold frame_size * channels samples for the frame
    /// the caller produced; the library derives the frame size from the
    /// input length. The returned packet is trimmed to the length the
    /// library reports, at most the configured maximum payload size.
    pub fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>> {
        if self.handle.is_null() {
            return Err(Error::SessionClosed);
        }

        let frame_size = (pcm.len() / self.channels.count()) as i32;
        let mut buf = vec![0u8; self.max_payload_size as usize];

        let n = unsafe {
            ffi::opus_encode(
                self.handle,
                pcm.as_ptr(),
                frame_size,
                buf.as_mut_ptr(),
                buf.len() as i32,
            )
        };

        if n < 0 {
            return Err(Error::codec("encode", n));
        }

        buf.truncate(n as usize);
        Ok(buf)
    }

    /// Clears bit-rate adaptation and prediction history without
    /// destroying the session.
    pub fn reset(&mut self) -> Result<()> {
        if self.handle.is_null() {
            return Err(Error::SessionClosed);
        }
        match unsafe { ffi::opus_encoder_ctl(self.handle, ffi::OPUS_RESET_STATE) } {
            code if code < 0 => Err(Error::codec("reset state", code)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_create() {
        let encoder = Encoder::new(48000, Channels::Mono, Application::VoIP);
        assert!(encoder.is_ok());
        let enc = encoder.unwrap();
        assert_eq!(enc.sample_rate(), 48000);
        assert_eq!(enc.channels(), Channels::Mono);
        assert!(!enc.is_closed());
    }

    #[test]
    fn test_encoder_create_all_applications() {
        assert!(Encoder::new(48000, Channels::Stereo, Application::Audio).is_ok());
        assert!(Encoder::new(48000, Channels::Mono, Application::RestrictedLowdelay).is_ok());
    }

    #[test]
    fn test_encoder_invalid_sample_rate() {
        let err = Encoder::new(48001, Channels::Mono, Application::VoIP).unwrap_err();
        assert_eq!(err.to_string(), "create encoder: OPUS_BAD_ARG");
    }

    #[test]
    fn test_application_from_value() {
        assert_eq!(Application::from_value(0), Application::VoIP);
        assert_eq!(Application::from_value(1), Application::Audio);
        assert_eq!(Application::from_value(2), Application::RestrictedLowdelay);
        // Unrecognized values stay backward compatible.
        assert_eq!(Application::from_value(3), Application::VoIP);
        assert_eq!(Application::from_value(-1), Application::VoIP);
    }

    #[test]
    fn test_encode_silence() {
        let mut encoder = Encoder::new(48000, Channels::Mono, Application::VoIP).unwrap();
        let pcm = vec![0i16; 960]; // 20ms at 48kHz
        let packet = encoder.encode(&pcm).unwrap();
        assert!(!packet.is_empty());
        assert!(packet.len() <= encoder.max_payload_size() as usize);
    }

    #[test]
    fn test_encode_stereo() {
        let mut encoder = Encoder::new(48000, Channels::Stereo, Application::VoIP).unwrap();
        let pcm = vec![0i16; 960 * 2];
        assert!(encoder.encode(&pcm).is_ok());
    }

    #[test]
    fn test_max_payload_size_bounds() {
        let mut encoder = Encoder::new(48000, Channels::Mono, Application::VoIP).unwrap();
        assert_eq!(encoder.max_payload_size(), 1024);

        for bytes in [0, -1, i32::MIN, 4097, i32::MAX] {
            let err = encoder.set_max_payload_size(bytes).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{}", bytes);
            // Prior configuration is unchanged after a rejected set.
            assert_eq!(encoder.max_payload_size(), 1024);
        }

        encoder.set_max_payload_size(1).unwrap();
        assert_eq!(encoder.max_payload_size(), 1);
        encoder.set_max_payload_size(4096).unwrap();
        assert_eq!(encoder.max_payload_size(), 4096);
    }

    #[test]
    fn test_encode_respects_payload_ceiling() {
        let mut encoder = Encoder::new(48000, Channels::Mono, Application::Audio).unwrap();
        encoder.set_max_payload_size(40).unwrap();
        // A loud non-trivial signal compressed into 40 bytes.
        let pcm: Vec<i16> = (0..960)
            .map(|i| {
                ((i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 48000.0).sin() * 20000.0) as i16
            })
            .collect();
        let packet = encoder.encode(&pcm).unwrap();
        assert!(packet.len() <= 40);
    }

    #[test]
    fn test_reset_state() {
        let mut encoder = Encoder::new(48000, Channels::Mono, Application::VoIP).unwrap();
        let pcm = vec![0i16; 960];
        encoder.encode(&pcm).unwrap();
        encoder.reset().unwrap();
        encoder.encode(&pcm).unwrap();
    }
}
