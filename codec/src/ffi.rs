//! FFI bindings to libopus.

use std::os::raw::{c_char, c_int, c_uchar};

/// Opaque encoder state.
pub enum OpusEncoder {}

/// Opaque decoder state.
pub enum OpusDecoder {}

/// Opaque deep-redundancy decoder state (libopus 1.5+).
#[cfg(feature = "dred")]
pub enum OpusDREDDecoder {}

/// Opaque deep-redundancy feature container (libopus 1.5+).
#[cfg(feature = "dred")]
pub enum OpusDRED {}

/// opus_int32 type (from opus_types.h)
pub type OpusInt32 = i32;

/// opus_int16 type (from opus_types.h)
pub type OpusInt16 = i16;

// Return codes
pub const OPUS_OK: c_int = 0;
pub const OPUS_BAD_ARG: c_int = -1;
pub const OPUS_BUFFER_TOO_SMALL: c_int = -2;
pub const OPUS_INTERNAL_ERROR: c_int = -3;
pub const OPUS_INVALID_PACKET: c_int = -4;
pub const OPUS_UNIMPLEMENTED: c_int = -5;
pub const OPUS_INVALID_STATE: c_int = -6;
pub const OPUS_ALLOC_FAIL: c_int = -7;

// Application types
pub const OPUS_APPLICATION_VOIP: c_int = 2048;
pub const OPUS_APPLICATION_AUDIO: c_int = 2049;
pub const OPUS_APPLICATION_RESTRICTED_LOWDELAY: c_int = 2051;

// CTL macros (request codes)
pub const OPUS_RESET_STATE: c_int = 4028;

unsafe extern "C" {
    // Version string
    pub fn opus_get_version_string() -> *const c_char;

    // Encoder
    pub fn opus_encoder_create(
        fs: OpusInt32,
        channels: c_int,
        application: c_int,
        error: *mut c_int,
    ) -> *mut OpusEncoder;

    pub fn opus_encoder_destroy(enc: *mut OpusEncoder);

    pub fn opus_encode(
        enc: *mut OpusEncoder,
        pcm: *const OpusInt16,
        frame_size: c_int,
        data: *mut c_uchar,
        max_data_bytes: OpusInt32,
    ) -> OpusInt32;

    pub fn opus_encoder_ctl(enc: *mut OpusEncoder, request: c_int, ...) -> c_int;

    // Decoder
    pub fn opus_decoder_create(
        fs: OpusInt32,
        channels: c_int,
        error: *mut c_int,
    ) -> *mut OpusDecoder;

    pub fn opus_decoder_destroy(dec: *mut OpusDecoder);

    pub fn opus_decode(
        dec: *mut OpusDecoder,
        data: *const c_uchar,
        len: OpusInt32,
        pcm: *mut OpusInt16,
        frame_size: c_int,
        decode_fec: c_int,
    ) -> c_int;

    pub fn opus_decoder_ctl(dec: *mut OpusDecoder, request: c_int, ...) -> c_int;
}

#[cfg(feature = "dred")]
unsafe extern "C" {
    // Deep redundancy (DRED)
    pub fn opus_dred_decoder_create(error: *mut c_int) -> *mut OpusDREDDecoder;

    pub fn opus_dred_decoder_destroy(dec: *mut OpusDREDDecoder);

    pub fn opus_dred_alloc(error: *mut c_int) -> *mut OpusDRED;

    pub fn opus_dred_free(dec: *mut OpusDRED);

    pub fn opus_dred_parse(
        dred_dec: *mut OpusDREDDecoder,
        dred: *mut OpusDRED,
        data: *const c_uchar,
        len: OpusInt32,
        max_dred_samples: OpusInt32,
        sampling_rate: OpusInt32,
        dred_end: *mut c_int,
        defer_processing: c_int,
    ) -> c_int;

    pub fn opus_decoder_dred_decode(
        st: *mut OpusDecoder,
        dred: *const OpusDRED,
        dred_offset: OpusInt32,
        pcm: *mut OpusInt16,
        frame_size: OpusInt32,
    ) -> c_int;
}
