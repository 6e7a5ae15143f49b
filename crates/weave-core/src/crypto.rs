//! Hashing and encoding primitives for the weave.
//!
//! Provides three things:
//!   1. SHA-256 hashing: chunk data hashes, leaf and branch ids
//!   2. Byte-range "notes": 32-byte big-endian offsets mixed into node ids
//!   3. base64url (unpadded): how every binary value travels in JSON
//!
//! There is no unsafe code in this module.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Size of every digest and node id.
pub const HASH_SIZE: usize = 32;

/// Size of an encoded byte-range note.
pub const NOTE_SIZE: usize = 32;

// ── SHA-256 ───────────────────────────────────────────────────────────────────

/// Hash a byte slice, returning a 32-byte SHA-256 digest.
pub fn hash(data: &[u8]) -> [u8; HASH_SIZE] {
    Sha256::digest(data).into()
}

/// Hash each message, then hash the concatenation of those digests.
///
///   hash_all([a, b, c]) = H(H(a) || H(b) || H(c))
///
/// This is how leaf and branch ids are formed.
pub fn hash_all(messages: &[&[u8]]) -> [u8; HASH_SIZE] {
    let mut outer = Hasher::new();
    for message in messages {
        outer.update(&hash(message));
    }
    outer.finalize()
}

/// Incremental SHA-256 hasher for payloads that arrive in pieces.
///
/// # Example
/// ```
/// use weave_core::crypto::Hasher;
/// let mut h = Hasher::new();
/// h.update(b"hello ");
/// h.update(b"world");
/// let digest = h.finalize();
/// assert_eq!(digest, weave_core::crypto::hash(b"hello world"));
/// ```
pub struct Hasher(Sha256);

impl Hasher {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> [u8; HASH_SIZE] {
        self.0.finalize().into()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

// ── Notes ─────────────────────────────────────────────────────────────────────

/// Encode a byte offset as a 32-byte note: 24 zero bytes, then the
/// offset as a big-endian u64.
pub fn note(value: usize) -> [u8; NOTE_SIZE] {
    let mut buf = [0u8; NOTE_SIZE];
    buf[NOTE_SIZE - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    buf
}

/// Decode a note. Returns `None` if the slice is not exactly `NOTE_SIZE`
/// bytes or the value does not fit a `usize`.
pub fn read_note(buf: &[u8]) -> Option<usize> {
    if buf.len() != NOTE_SIZE {
        return None;
    }
    // Any set bit in the high 24 bytes is an offset we cannot represent.
    if buf[..NOTE_SIZE - 8].iter().any(|b| *b != 0) {
        return None;
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&buf[NOTE_SIZE - 8..]);
    usize::try_from(u64::from_be_bytes(low)).ok()
}

// ── base64url ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("invalid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

pub fn b64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

pub fn b64url_decode(text: &str) -> Result<Vec<u8>, EncodingError> {
    Ok(URL_SAFE_NO_PAD.decode(text.trim_end_matches('='))?)
}

/// Decode a base64url string that must hold exactly one digest.
pub fn b64url_decode_hash(text: &str) -> Result<[u8; HASH_SIZE], EncodingError> {
    let bytes = b64url_decode(text)?;
    <[u8; HASH_SIZE]>::try_from(bytes.as_slice()).map_err(|_| EncodingError::Length {
        expected: HASH_SIZE,
        actual: bytes.len(),
    })
}
