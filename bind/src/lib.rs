//! Flat boundary operations for host-language bindings.
//!
//! Everything crossing this API is a primitive, an opaque `i64` handle,
//! or a flat sample/byte buffer, so a marshalling layer can forward
//! calls without any Rust object graph leaking through. Sessions live
//! in a process-wide registry; each call locks its session for its full
//! duration, including the complete multi-step recovery sequence, and
//! a destroyed or zero handle fails with [`Error::SessionClosed`]
//! instead of touching freed state.

mod registry;

use once_cell::sync::Lazy;

use opuslink_codec::{Application, Channels, Decoder, Encoder};
pub use opuslink_codec::{Error, NativeStatus, Result};

use crate::registry::Registry;

static ENCODERS: Lazy<Registry<Encoder>> = Lazy::new(Registry::new);
static DECODERS: Lazy<Registry<Decoder>> = Lazy::new(Registry::new);

/// Returns the version string of the linked codec library.
pub fn version() -> String {
    opuslink_codec::version()
}

/// Creates an encoder session and returns its handle.
///
/// Application values: 1 selects audio, 2 selects restricted low-delay,
/// anything else (including 0) selects VoIP.
pub fn encoder_create(sample_rate: i32, channels: i32, application: i32) -> Result<i64> {
    let encoder = Encoder::new(
        sample_rate,
        Channels::try_from(channels)?,
        Application::from_value(application),
    )?;
    Ok(ENCODERS.insert(encoder))
}

/// Sets the maximum payload size in bytes for subsequent encodes.
pub fn encoder_set_max_payload_size(handle: i64, bytes: i32) -> Result<()> {
    ENCODERS.with(handle, |encoder| encoder.set_max_payload_size(bytes))
}

/// Returns the maximum payload size in bytes.
pub fn encoder_max_payload_size(handle: i64) -> Result<i32> {
    ENCODERS.with(handle, |encoder| Ok(encoder.max_payload_size()))
}

/// Compresses one frame of interleaved PCM into a packet.
pub fn encoder_encode(handle: i64, samples: &[i16]) -> Result<Vec<u8>> {
    ENCODERS.with(handle, |encoder| encoder.encode(samples))
}

/// Clears encoder history without destroying the session.
pub fn encoder_reset(handle: i64) -> Result<()> {
    ENCODERS.with(handle, |encoder| encoder.reset())
}

/// Destroys the encoder session. A zero or already-destroyed handle is
/// a no-op.
pub fn encoder_destroy(handle: i64) {
    ENCODERS.remove(handle);
}

/// Creates a decoder session and returns its handle.
///
/// With the `dred` feature enabled the session carries redundancy
/// state and recovery uses the deep strategy; otherwise recovery is
/// shallow (concealment plus in-band FEC).
pub fn decoder_create(sample_rate: i32, channels: i32) -> Result<i64> {
    let channels = Channels::try_from(channels)?;

    #[cfg(feature = "dred")]
    let decoder = Decoder::with_redundancy(sample_rate, channels)?;
    #[cfg(not(feature = "dred"))]
    let decoder = Decoder::new(sample_rate, channels)?;

    Ok(DECODERS.insert(decoder))
}

/// Sets the frame size in samples per channel for subsequent decodes.
pub fn decoder_set_frame_size(handle: i64, frame_size: i32) -> Result<()> {
    DECODERS.with(handle, |decoder| decoder.set_frame_size(frame_size))
}

/// Returns the frame size in samples per channel.
pub fn decoder_frame_size(handle: i64) -> Result<i32> {
    DECODERS.with(handle, |decoder| Ok(decoder.frame_size()))
}

/// Decodes one packet into a frame of interleaved PCM. An absent
/// packet requests loss concealment regardless of `use_fec`.
pub fn decoder_decode(handle: i64, packet: Option<&[u8]>, use_fec: bool) -> Result<Vec<i16>> {
    DECODERS.with(handle, |decoder| decoder.decode(packet, use_fec))
}

/// Recovers up to `requested_frames` trailing frames ending at the
/// supplied packet. The returned set is chronological, its last element
/// the decoded current frame, and may be shorter than requested.
pub fn decoder_recover(handle: i64, packet: &[u8], requested_frames: i32) -> Result<Vec<Vec<i16>>> {
    if requested_frames <= 0 {
        return Err(Error::InvalidArgument(format!(
            "requested frame count must be greater than 0: {}",
            requested_frames
        )));
    }
    DECODERS.with(handle, |decoder| {
        decoder.recover(packet, requested_frames as usize)
    })
}

/// Clears decoder history without destroying the session.
pub fn decoder_reset(handle: i64) -> Result<()> {
    DECODERS.with(handle, |decoder| decoder.reset())
}

/// Destroys the decoder session. A zero or already-destroyed handle is
/// a no-op.
pub fn decoder_destroy(handle: i64) {
    DECODERS.remove(handle);
}
