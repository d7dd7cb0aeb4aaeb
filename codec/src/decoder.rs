//! Opus decoder session.

use std::os::raw::c_int;
use std::ptr;

use tracing::debug;
#[cfg(feature = "dred")]
use tracing::trace;

use crate::Channels;
use crate::error::{Error, Result};
use crate::ffi;
#[cfg(feature = "dred")]
use crate::error::NativeStatus;

/// Default samples per channel per decoded frame.
pub const DEFAULT_FRAME_SIZE: i32 = 960;

/// How far back redundancy features are parsed, in frames.
#[cfg(feature = "dred")]
pub(crate) const REDUNDANCY_WINDOW_FRAMES: i32 = 10;

/// Secondary native state backing deep recovery: a redundancy decoder
/// plus the feature container it parses packets into.
#[cfg(feature = "dred")]
#[derive(Debug)]
pub(crate) struct Redundancy {
    pub(crate) decoder: *mut ffi::OpusDREDDecoder,
    pub(crate) features: *mut ffi::OpusDRED,
}

#[cfg(feature = "dred")]
impl Redundancy {
    fn new() -> Result<Self> {
        let mut error: i32 = 0;
        let decoder = unsafe { ffi::opus_dred_decoder_create(&mut error) };
        if decoder.is_null() || error != ffi::OPUS_OK {
            return Err(Error::codec("create redundancy decoder", error));
        }

        // Committed into the struct right away so a failing second step
        // rolls it back through Drop.
        let mut redundancy = Self {
            decoder,
            features: ptr::null_mut(),
        };

        let mut error: i32 = 0;
        let features = unsafe { ffi::opus_dred_alloc(&mut error) };
        if features.is_null() || error != ffi::OPUS_OK {
            return Err(Error::codec("allocate redundancy features", error));
        }
        redundancy.features = features;

        Ok(redundancy)
    }
}

#[cfg(feature = "dred")]
impl Drop for Redundancy {
    fn drop(&mut self) {
        if !self.decoder.is_null() {
            unsafe { ffi::opus_dred_decoder_destroy(self.decoder) };
            self.decoder = ptr::null_mut();
        }
        if !self.features.is_null() {
            unsafe { ffi::opus_dred_free(self.features) };
            self.features = ptr::null_mut();
        }
    }
}

/// Opus decoder session.
///
/// Owns exactly one native decoder instance. Sample rate and channel
/// count are fixed at creation; the frame size (samples per channel per
/// decoded frame) is adjustable and defaults to [`DEFAULT_FRAME_SIZE`].
#[derive(Debug)]
pub struct Decoder {
    pub(crate) handle: *mut ffi::OpusDecoder,
    pub(crate) sample_rate: i32,
    pub(crate) channels: Channels,
    pub(crate) frame_size: i32,
    #[cfg(feature = "dred")]
    pub(crate) redundancy: Option<Redundancy>,
}

// Safety: the decoder handle is not shared across threads.
unsafe impl Send for Decoder {}

impl Drop for Decoder {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { ffi::opus_decoder_destroy(self.handle) };
            self.handle = ptr::null_mut();
        }
    }
}

impl Decoder {
    /// Creates a new decoder session without redundancy state. Gaps are
    /// recovered with concealment plus in-band FEC only.
    ///
    /// # Parameters
    /// - `sample_rate`: Sample rate to decode at (8000, 12000, 16000, 24000, or 48000)
    /// - `channels`: Channel layout
    pub fn new(sample_rate: i32, channels: Channels) -> Result<Self> {
        let mut error: i32 = 0;
        let handle =
            unsafe { ffi::opus_decoder_create(sample_rate, channels.count() as i32, &mut error) };

        if handle.is_null() || error != ffi::OPUS_OK {
            return Err(Error::codec("create decoder", error));
        }

        debug!("Created decoder session ({}Hz, {:?})", sample_rate, channels);

        Ok(Self {
            handle,
            sample_rate,
            channels,
            frame_size: DEFAULT_FRAME_SIZE,
            #[cfg(feature = "dred")]
            redundancy: None,
        })
    }

    /// Creates a decoder session that additionally parses deep
    /// redundancy out of every packet, enabling recovery further back
    /// than one frame. If any of the three native allocations fails,
    /// the ones already made are released before the error returns.
    #[cfg(feature = "dred")]
    pub fn with_redundancy(sample_rate: i32, channels: Channels) -> Result<Self> {
        let mut decoder = Self::new(sample_rate, channels)?;
        decoder.redundancy = Some(Redundancy::new()?);
        Ok(decoder)
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

    /// Returns the frame size in samples per channel.
    pub fn frame_size(&self) -> i32 {
        self.frame_size
    }

    /// Sets the frame size in samples per channel for subsequent
    /// decodes.
    pub fn set_frame_size(&mut self, frame_size: i32) -> Result<()> {
        if frame_size <= 0 {
            return Err(Error::InvalidArgument(format!(
                "invalid frame size: {}",
                frame_size
            )));
        }
        self.frame_size = frame_size;
        Ok(())
    }

    /// Decodes one packet into a frame of interleaved PCM.
    ///
    /// An absent (or empty) packet is always treated as a
    /// loss-concealment request, regardless of `use_fec`. A present
    /// packet with `use_fec` set instead asks the library to recover
    /// the *previous* lost frame from redundancy carried in this
    /// packet; the packet's own audio is not produced by that call.
    pub fn decode(&mut self, packet: Option<&[u8]>, use_fec: bool) -> Result<Vec<i16>> {
        if self.handle.is_null() {
            return Err(Error::SessionClosed);
        }

        #[cfg(feature = "dred")]
        self.refresh_redundancy(packet);

        self.decode_into_frame(packet, use_fec)
    }

    /// Parses redundancy features out of the incoming packet into the
    /// session state. Runs on every decode, loss or no loss, so a later
    /// recovery call always works from the freshest material. A failed
    /// parse leaves the previous features in place.
    #[cfg(feature = "dred")]
    fn refresh_redundancy(&mut self, packet: Option<&[u8]>) {
        let Some(redundancy) = &mut self.redundancy else {
            return;
        };

        let (data, len) = split_packet(packet);
        let mut covered: c_int = 0;
        let ret = unsafe {
            ffi::opus_dred_parse(
                redundancy.decoder,
                redundancy.features,
                data,
                len,
                self.frame_size * REDUNDANCY_WINDOW_FRAMES,
                self.sample_rate,
                &mut covered,
                1, // defer processing until a recovery call needs it
            )
        };
        if ret < 0 {
            trace!("Redundancy parse failed: {}", NativeStatus::from_code(ret));
        }
    }

    /// The single native decode step shared by `decode` and the
    /// recovery engine. Allocates the output frame fresh and
    /// zero-initialized so any region left unfilled is deterministic.
    pub(crate) fn decode_into_frame(
        &mut self,
        packet: Option<&[u8]>,
        use_fec: bool,
    ) -> Result<Vec<i16>> {
        // Loss concealment only happens at the library level as the
        // (no input, fec mode) combination; force it for absent input.
        let absent = packet.is_none_or(|data| data.is_empty());
        let fec = use_fec || absent;

        let (data, len) = split_packet(packet);
        let mut frame = vec![0i16; self.frame_size as usize * self.channels.count()];

        let n = unsafe {
            ffi::opus_decode(
                self.handle,
                data,
                len,
                frame.as_mut_ptr(),
                self.frame_size,
                fec as c_int,
            )
        };

        if n < 0 {
            return Err(Error::codec("decode", n));
        }
        if n > self.frame_size {
            return Err(Error::IllegalState(format!(
                "decoded {} samples into a {}-sample frame",
                n, self.frame_size
            )));
        }

        frame.truncate(n as usize * self.channels.count());
        Ok(frame)
    }

    /// Clears decoder history. Frame size and channel configuration are
    /// untouched.
    pub fn reset(&mut self) -> Result<()> {
        if self.handle.is_null() {
            return Err(Error::SessionClosed);
        }
        match unsafe { ffi::opus_decoder_ctl(self.handle, ffi::OPUS_RESET_STATE) } {
            code if code < 0 => Err(Error::codec("reset state", code)),
            _ => Ok(()),
        }
    }
}

pub(crate) fn split_packet(packet: Option<&[u8]>) -> (*const u8, i32) {
    match packet {
        Some(data) if !data.is_empty() => (data.as_ptr(), data.len() as i32),
        _ => (ptr::null(), 0),
    }
}
