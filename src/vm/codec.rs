//! Transport packing for flat machine states.
//!
//! A word sequence becomes 32 big-endian bytes per word, zlib-compressed,
//! then base64. The result is a printable machine image that survives
//! copy-paste and line-based transports. [`unpack`] is the exact inverse
//! and rejects anything it did not produce.

use crate::types::word::{Word, WORD_BYTES};
use crate::vm::errors::VmError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Packs a word sequence into its printable transport form.
pub fn pack(words: &[Word]) -> String {
    let mut bytes = Vec::with_capacity(words.len() * WORD_BYTES);
    for word in words {
        let mut buf = [0u8; WORD_BYTES];
        word.to_big_endian(&mut buf);
        bytes.extend_from_slice(&buf);
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // writing into a Vec sink cannot fail
    let _ = encoder.write_all(&bytes);
    let compressed = encoder.finish().unwrap_or_default();
    STANDARD.encode(compressed)
}

/// Unpacks the transport form back into words.
///
/// Corrupt base64, corrupt zlib streams and payloads that are not a whole
/// number of words are reported, never truncated.
pub fn unpack(text: &str) -> Result<Vec<Word>, VmError> {
    let compressed = STANDARD
        .decode(text.trim())
        .map_err(|e| VmError::Transport(e.to_string()))?;
    let mut bytes = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut bytes)
        .map_err(|e| VmError::Transport(e.to_string()))?;
    if bytes.len() % WORD_BYTES != 0 {
        return Err(VmError::Transport(format!(
            "payload of {} bytes is not a whole number of words",
            bytes.len()
        )));
    }
    Ok(bytes.chunks(WORD_BYTES).map(Word::from_big_endian).collect())
}
