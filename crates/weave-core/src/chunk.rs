//! Chunker: splits a payload into bounded, contiguous byte ranges.

use crate::crypto::{hash, HASH_SIZE};

/// Largest chunk the network accepts.
pub const MAX_CHUNK_SIZE: usize = 256 * 1024;

/// Smallest chunk allowed anywhere except as the only chunk of a payload.
pub const MIN_CHUNK_SIZE: usize = 32 * 1024;

/// One chunk of a payload: the hash of its bytes and its half-open range
/// `[min_byte_range, max_byte_range)` within the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub data_hash: [u8; HASH_SIZE],
    pub min_byte_range: usize,
    pub max_byte_range: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.max_byte_range - self.min_byte_range
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `data` into chunks.
///
/// Full `MAX_CHUNK_SIZE` chunks are cut while more than that remains. When a
/// full cut would leave a non-empty tail below `MIN_CHUNK_SIZE`, the rest is
/// instead split in half (rounding the first half up), so neither of the
/// last two chunks is undersized. Empty input yields no chunks.
pub fn chunk_data(data: &[u8]) -> Vec<Chunk> {
    let mut chunks = Vec::with_capacity(data.len() / MAX_CHUNK_SIZE + 1);
    let mut cursor = 0;

    while data.len() - cursor > MAX_CHUNK_SIZE {
        let remaining = data.len() - cursor;
        let mut size = MAX_CHUNK_SIZE;
        let next = remaining - MAX_CHUNK_SIZE;
        if next < MIN_CHUNK_SIZE {
            size = remaining.div_ceil(2);
        }

        chunks.push(Chunk {
            data_hash: hash(&data[cursor..cursor + size]),
            min_byte_range: cursor,
            max_byte_range: cursor + size,
        });
        cursor += size;
    }

    if cursor < data.len() {
        chunks.push(Chunk {
            data_hash: hash(&data[cursor..]),
            min_byte_range: cursor,
            max_byte_range: data.len(),
        });
    }

    chunks
}
