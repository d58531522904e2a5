//! Cryptographic primitives.
//!
//! Byte-level hash and signature functions are lifted to single machine
//! words: a word is encoded as its 32 big-endian bytes, the byte-level
//! function runs, and the 32-byte digest decodes back into a word. The
//! digest width of SHA3-256 matches the word width exactly, so no
//! truncation or padding rule is ever exercised.

pub mod key_pair;

pub use key_pair::{ec_verify, PrivateKey, PublicKey};

use crate::types::word::{Word, WORD_BYTES};
use sha3::{Digest, Sha3_256};

/// SHA3-256 of the word's big-endian encoding, decoded back as a word.
pub fn word_hash(w: Word) -> Word {
    let mut bytes = [0u8; WORD_BYTES];
    w.to_big_endian(&mut bytes);
    let digest: [u8; WORD_BYTES] = Sha3_256::digest(bytes).into();
    Word::from_big_endian(&digest)
}
