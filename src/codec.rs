//! # LZMA2 Codec
//!
//! Regular-file payloads are compressed as a raw LZMA2 stream (no `.xz` container).
//! The only parameter the decoder needs, the dictionary size, travels as the single
//! LZMA2 property byte that the archive stores in front of the stream.

use std::io::{self, Read, Write};

use tracing::debug;
use liblzma::read::XzDecoder;
use liblzma::stream::{Error as XzError, Filters, LzmaOptions, Stream};
use liblzma::write::XzEncoder;

use crate::compress::Method;
use crate::error::CodecError;

/// Smallest dictionary liblzma accepts.
const DICT_MIN: u32 = 1 << 12;

/// Largest valid LZMA2 property byte.
const PROPERTY_MAX: u8 = 40;

/// Output of a compression call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressed {
    pub data: Vec<u8>,
    pub property: u8,
}

/// The compress/decompress service used for regular-file payloads.
pub trait Codec {
    fn compress(&self, input: &[u8], level: u32) -> Result<Compressed, CodecError>;

    /// Decompresses `input`, which must expand to exactly `output_size` bytes.
    fn decompress(&self, input: &[u8], property: u8, output_size: u64) -> Result<Vec<u8>, CodecError>;
}

/// Maps a 0-9 level onto an xz preset and the largest dictionary that level may use.
pub fn level_params(level: u32) -> Option<(u32, u32)> {
    let params = match level {
        0 => (0, 1 << 16),
        1 => (1, 1 << 20),
        2 => (3, 1 << 22),
        3 => (5, 1 << 24),
        4 => (7, 1 << 25),
        5 | 6 => (7, 1 << 26),
        7..=9 => (9, 1 << 27),
        _ => return None,
    };
    Some(params)
}

/// Dictionary size encoded by an LZMA2 property byte.
pub fn dict_for_property(property: u8) -> Option<u32> {
    match property {
        p if p > PROPERTY_MAX => None,
        PROPERTY_MAX => Some(u32::MAX),
        p => Some((2 | (p as u32 & 1)) << (p as u32 / 2 + 11)),
    }
}

/// Smallest property byte whose dictionary holds at least `dict` bytes.
pub fn property_for_dict(dict: u32) -> u8 {
    (0..PROPERTY_MAX)
        .find(|&p| dict_for_property(p).map_or(false, |d| d >= dict))
        .unwrap_or(PROPERTY_MAX)
}

fn map_stream_error(e: &XzError) -> CodecError {
    match e {
        XzError::Mem | XzError::MemLimit => CodecError::Memory,
        XzError::Options => CodecError::Unsupported,
        _ => CodecError::Corrupt,
    }
}

fn map_io_error(e: io::Error) -> CodecError {
    if let Some(inner) = e.get_ref().and_then(|r| r.downcast_ref::<XzError>()) {
        return map_stream_error(inner);
    }
    match e.kind() {
        io::ErrorKind::OutOfMemory => CodecError::Memory,
        _ => CodecError::Corrupt,
    }
}

fn lzma2_filters(preset: u32, dict: u32) -> Result<Filters, CodecError> {
    let mut options = LzmaOptions::new_preset(preset).map_err(|e| map_stream_error(&e))?;
    options.dict_size(dict);
    let mut filters = Filters::new();
    filters.lzma2(&options);
    Ok(filters)
}

/// Raw LZMA2 codec backed by liblzma.
#[derive(Debug, Clone)]
pub struct Lzma2Codec {
    method: Method,
    threads: usize,
}

impl Lzma2Codec {
    pub fn new(method: Method, threads: usize) -> Self {
        Self { method, threads }
    }

    fn check_method(&self) -> Result<(), CodecError> {
        match self.method {
            Method::Lzma2 => Ok(()),
            Method::Lzma => Err(CodecError::Unsupported),
        }
    }
}

impl Default for Lzma2Codec {
    fn default() -> Self {
        Self::new(Method::Lzma2, 1)
    }
}

impl Codec for Lzma2Codec {
    fn compress(&self, input: &[u8], level: u32) -> Result<Compressed, CodecError> {
        self.check_method()?;
        let (preset, max_dict) = level_params(level).ok_or(CodecError::Unsupported)?;

        // No point in a dictionary larger than the data itself.
        let wanted = u32::try_from(input.len())
            .unwrap_or(u32::MAX)
            .clamp(DICT_MIN, max_dict);
        let property = property_for_dict(wanted);
        let dict = dict_for_property(property).ok_or(CodecError::Unsupported)?;

        let filters = lzma2_filters(preset, dict)?;
        let stream = Stream::new_raw_encoder(&filters).map_err(|e| map_stream_error(&e))?;
        let mut encoder = XzEncoder::new_stream(Vec::with_capacity(input.len() / 2 + 64), stream);
        encoder.write_all(input).map_err(map_io_error)?;
        let data = encoder.finish().map_err(map_io_error)?;

        debug!(
            level,
            dict,
            threads = self.threads,
            input = input.len(),
            output = data.len(),
            "lzma2 compress"
        );
        Ok(Compressed { data, property })
    }

    fn decompress(&self, input: &[u8], property: u8, output_size: u64) -> Result<Vec<u8>, CodecError> {
        self.check_method()?;
        let dict = dict_for_property(property).ok_or(CodecError::Unsupported)?;
        // preset only seeds the option struct; a raw decoder reads nothing but the dictionary
        let filters = lzma2_filters(6, dict)?;
        let stream = Stream::new_raw_decoder(&filters).map_err(|e| map_stream_error(&e))?;
        let decoder = XzDecoder::new_stream(input, stream);

        let capacity = usize::try_from(output_size).map_err(|_| CodecError::Memory)?;
        let mut out = Vec::with_capacity(capacity.min(64 << 20));
        // one extra byte lets us notice a stream longer than announced
        decoder
            .take(output_size.saturating_add(1))
            .read_to_end(&mut out)
            .map_err(map_io_error)?;
        if out.len() as u64 != output_size {
            return Err(CodecError::Corrupt);
        }
        Ok(out)
    }
}
