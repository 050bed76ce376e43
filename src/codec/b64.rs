//! Chunked base64 body encoding
//!
//! Response bodies that are not valid UTF-8 are stored base64-encoded.
//! Encoding walks the buffer in fixed-size chunks to bound peak memory on
//! multi-megabyte bodies; the chunk size is a multiple of 3 so chunk
//! boundaries never split a base64 quantum and the concatenated output is
//! identical to a single-shot encode.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const ENCODE_CHUNK_BYTES: usize = 3 * 1024;

/// Encode bytes to standard base64, processing fixed-size chunks.
pub fn encode_chunked(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(ENCODE_CHUNK_BYTES) {
        STANDARD.encode_string(chunk, &mut out);
    }
    out
}

/// Decode a base64 body back to raw bytes.
pub fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text)
}
