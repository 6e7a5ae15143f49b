//! Chunk plan: the chunks, data root and proofs of one payload, computed
//! once before an upload and read-only afterwards.

use crate::chunk::{chunk_data, Chunk};
use crate::crypto::{b64url_encode, HASH_SIZE};
use crate::merkle::{build_tree, EMPTY_ROOT};
use crate::proof::{generate_proofs, validate_chunk, Proof, ProofError};
use crate::wire::ChunkPayload;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("chunk index {index} out of range ({total} chunks)")]
    IndexOutOfRange { index: usize, total: usize },
    #[error("payload is {actual} bytes, plan was built for {expected}")]
    DataLength { expected: usize, actual: usize },
    #[error("chunk {index} failed validation: {source}")]
    InvalidChunk {
        index: usize,
        #[source]
        source: ProofError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub data_root: [u8; HASH_SIZE],
    pub data_size: usize,
    pub chunks: Vec<Chunk>,
    pub proofs: Vec<Proof>,
}

impl ChunkPlan {
    /// Chunk `data`, build its tree and extract every proof. The tree is
    /// dropped once the proofs are taken.
    pub fn generate(data: &[u8]) -> Self {
        let chunks = chunk_data(data);
        let (data_root, proofs) = match build_tree(&chunks) {
            Some(root) => (root.id(), generate_proofs(&root)),
            None => (EMPTY_ROOT, Vec::new()),
        };
        Self {
            data_root,
            data_size: data.len(),
            chunks,
            proofs,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Data root as it appears in a transaction: base64url, or the empty
    /// string for an empty payload.
    pub fn encoded_root(&self) -> String {
        if self.chunks.is_empty() {
            String::new()
        } else {
            b64url_encode(&self.data_root)
        }
    }

    /// Bytes of chunk `index` within `data`.
    pub fn chunk_bytes<'a>(&self, index: usize, data: &'a [u8]) -> Result<&'a [u8], PlanError> {
        if data.len() != self.data_size {
            return Err(PlanError::DataLength {
                expected: self.data_size,
                actual: data.len(),
            });
        }
        let chunk = self.chunks.get(index).ok_or(PlanError::IndexOutOfRange {
            index,
            total: self.chunks.len(),
        })?;
        Ok(&data[chunk.min_byte_range..chunk.max_byte_range])
    }

    /// Re-check chunk `index` of `data` against this plan's root.
    pub fn validate(&self, index: usize, data: &[u8]) -> Result<(), PlanError> {
        let bytes = self.chunk_bytes(index, data)?;
        let proof = &self.proofs[index];
        validate_chunk(&self.data_root, proof.offset, self.data_size, bytes, &proof.path)
            .map(|_| ())
            .map_err(|source| PlanError::InvalidChunk { index, source })
    }

    /// Body for `POST /chunk` carrying chunk `index` of `data`.
    pub fn payload(&self, index: usize, data: &[u8]) -> Result<ChunkPayload, PlanError> {
        let bytes = self.chunk_bytes(index, data)?;
        let proof = &self.proofs[index];
        Ok(ChunkPayload {
            data_root: b64url_encode(&self.data_root),
            data_size: self.data_size.to_string(),
            data_path: b64url_encode(&proof.path),
            offset: proof.offset.to_string(),
            chunk: b64url_encode(bytes),
        })
    }
}
