//! ECDSA key pairs on NIST P-256.
//!
//! Signatures are made over a SHA3-256 digest of the message. Verification
//! is total: malformed keys or signatures verify `false` instead of
//! returning an error.

use p256::ecdsa::signature::{DigestSigner, DigestVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;
use sha3::{Digest, Sha3_256};

/// Private key for signing.
///
/// Generated from cryptographically secure OS randomness. Never serialized
/// by the machine; the raw scalar leaves this type only through
/// [`PrivateKey::to_bytes`].
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

/// Public key for signature verification.
#[derive(Clone, Debug)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PrivateKey {
    /// Generates a new random private key using OS-provided entropy.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    /// Creates a private key from its 32 raw scalar bytes.
    ///
    /// Returns `None` if the bytes are not a valid P-256 scalar.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        SigningKey::from_slice(bytes).ok().map(|key| Self { key })
    }

    /// Returns the raw scalar bytes. Handle with care; never logged.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.to_bytes().into()
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.key.verifying_key().to_owned(),
        }
    }

    /// Signs a message over its SHA3-256 digest.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.key.sign_digest(Sha3_256::new_with_prefix(message));
        signature.to_bytes().as_slice().to_vec()
    }
}

impl PublicKey {
    /// SEC1 uncompressed point encoding (65 bytes).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.key.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Creates a public key from a SEC1 point encoding.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        VerifyingKey::from_sec1_bytes(bytes)
            .ok()
            .map(|key| Self { key })
    }

    /// Verifies `signature` against the SHA3-256 digest of `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match Signature::from_slice(signature) {
            Ok(sig) => self
                .key
                .verify_digest(Sha3_256::new_with_prefix(message), &sig)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// Verifies a signature from raw key, signature and message bytes.
///
/// Never errors: anything malformed verifies `false`.
pub fn ec_verify(key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    match PublicKey::from_bytes(key) {
        Some(public) => public.verify(message, signature),
        None => false,
    }
}
