//! Encoding and decoding of the base64 `<peaks>` payload of an mzXML scan.
use std::io::prelude::*;

use flate2::read::ZlibDecoder;

use crate::peaks::PeakList;

/// The byte order of the encoded numbers, `network` is big-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Network,
    Little,
}

/// How the `<peaks>` element of a scan was encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeaksEncoding {
    /// Either 32 or 64 bits per value
    pub precision: u8,
    pub byte_order: ByteOrder,
    pub zlib_compressed: bool,
}

impl Default for PeaksEncoding {
    fn default() -> Self {
        Self {
            precision: 32,
            byte_order: ByteOrder::Network,
            zlib_compressed: false,
        }
    }
}

/// Encode a peak list as interleaved m/z-intensity pairs of big-endian 32-bit floats,
/// base64 encoded without line breaks.
pub fn encode_peaks(peaks: &PeakList) -> String {
    let mut bytestring: Vec<u8> = Vec::with_capacity(peaks.len() * 8);
    for (mz, intensity) in peaks.iter() {
        bytestring.extend_from_slice(&(*mz as f32).to_be_bytes());
        bytestring.extend_from_slice(&(*intensity as f32).to_be_bytes());
    }
    base64_simd::STANDARD.encode_to_string(&bytestring)
}

fn read_value(chunk: &[u8], encoding: &PeaksEncoding) -> f64 {
    match (encoding.precision, encoding.byte_order) {
        (64, ByteOrder::Network) => f64::from_be_bytes(chunk.try_into().unwrap_or_default()),
        (64, ByteOrder::Little) => f64::from_le_bytes(chunk.try_into().unwrap_or_default()),
        (_, ByteOrder::Network) => f32::from_be_bytes(chunk.try_into().unwrap_or_default()) as f64,
        (_, ByteOrder::Little) => f32::from_le_bytes(chunk.try_into().unwrap_or_default()) as f64,
    }
}

/// Decode the text of a `<peaks>` element into a peak list
pub fn decode_peaks(text: &[u8], encoding: &PeaksEncoding) -> Result<PeakList, String> {
    let cleaned: Vec<u8> = text
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Ok(PeakList::default());
    }
    let mut bytestring = base64_simd::STANDARD
        .decode_to_vec(&cleaned)
        .map_err(|e| format!("Failed to decode base64 peaks: {e}"))?;

    if encoding.zlib_compressed {
        let mut decompressed = Vec::new();
        ZlibDecoder::new(bytestring.as_slice())
            .read_to_end(&mut decompressed)
            .map_err(|e| format!("Failed to decompress peaks: {e}"))?;
        bytestring = decompressed;
    }

    let width = match encoding.precision {
        32 => 4,
        64 => 8,
        other => return Err(format!("Unsupported precision {other}")),
    };
    if bytestring.len() % (width * 2) != 0 {
        return Err(format!(
            "Peak payload of {} bytes is not a whole number of {}-bit pairs",
            bytestring.len(),
            encoding.precision
        ));
    }

    let n = bytestring.len() / (width * 2);
    let mut peaks = PeakList::with_capacity(n);
    for pair in bytestring.chunks_exact(width * 2) {
        let (mz, intensity) = pair.split_at(width);
        peaks.push(read_value(mz, encoding), read_value(intensity, encoding));
    }
    Ok(peaks)
}
