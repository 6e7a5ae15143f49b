//! Inclusion proofs: generation from a built tree, and standalone
//! validation against nothing but a data root.
//!
//! Proof layout, root first:
//!
//!   per branch:  left_id (32) || right_id (32) || note(boundary) (32)
//!   leaf:        data_hash (32) || note(max_byte_range) (32)
//!
//! A verifier walks the branches, recomputing each id and following the side
//! of the boundary the claimed offset falls on, then recomputes the leaf id.

use tracing::debug;

use crate::crypto::{b64url_encode, hash, hash_all, note, read_note, HASH_SIZE, NOTE_SIZE};
use crate::merkle::Node;

/// Encoded size of one branch step.
pub const BRANCH_PROOF_LEN: usize = HASH_SIZE * 2 + NOTE_SIZE;

/// Encoded size of the trailing leaf segment.
pub const LEAF_PROOF_LEN: usize = HASH_SIZE + NOTE_SIZE;

/// Inclusion proof for one chunk. `offset` is the last byte the chunk covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub offset: usize,
    pub path: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    #[error("malformed proof: {len} bytes is not 96*k + 64")]
    Malformed { len: usize },
    #[error("malformed proof: byte-range note at depth {depth} is out of range")]
    BadNote { depth: usize },
    #[error("offset {offset} outside [{left_bound}, {right_bound})")]
    OffsetOutOfRange {
        offset: usize,
        left_bound: usize,
        right_bound: usize,
    },
    #[error("branch at depth {depth} does not hash to the expected id")]
    PathMismatch { depth: usize },
    #[error("leaf does not hash to the expected id")]
    LeafMismatch,
    #[error("leaf ends at {leaf_max} but the proven range ends at {right_bound}")]
    BoundMismatch { leaf_max: usize, right_bound: usize },
    #[error("chunk claims offset {claimed} but its proof ends at {proven}")]
    OffsetMismatch { claimed: usize, proven: usize },
    #[error("chunk is {actual} bytes, proof covers {expected}")]
    ChunkSizeMismatch { expected: usize, actual: usize },
    #[error("chunk bytes do not match the proven data hash")]
    DataHashMismatch,
}

impl ProofError {
    /// True when the proof bytes themselves could not be parsed, as opposed
    /// to a well-formed proof that does not resolve to the root.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ProofError::Malformed { .. } | ProofError::BadNote { .. })
    }
}

/// What a successful validation proved about the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedPath {
    /// Last byte of the proven chunk.
    pub offset: usize,
    pub left_bound: usize,
    pub right_bound: usize,
    pub chunk_size: usize,
    pub data_hash: [u8; HASH_SIZE],
}

/// Generate one proof per leaf of `root`, in leaf (byte) order.
///
/// Walks the tree with an explicit stack, so depth is bounded by the heap
/// rather than the call stack.
pub fn generate_proofs(root: &Node) -> Vec<Proof> {
    let mut proofs = Vec::new();
    let mut stack: Vec<(&Node, Vec<u8>)> = vec![(root, Vec::new())];

    while let Some((node, mut prefix)) = stack.pop() {
        match node {
            Node::Leaf {
                data_hash,
                max_byte_range,
                ..
            } => {
                prefix.extend_from_slice(data_hash);
                prefix.extend_from_slice(&note(*max_byte_range));
                proofs.push(Proof {
                    offset: max_byte_range - 1,
                    path: prefix,
                });
            }
            Node::Branch {
                left,
                right,
                byte_range_boundary,
                ..
            } => {
                prefix.extend_from_slice(&left.id());
                prefix.extend_from_slice(&right.id());
                prefix.extend_from_slice(&note(*byte_range_boundary));
                // Right first so the left subtree is popped (and emitted) first.
                stack.push((right, prefix.clone()));
                stack.push((left, prefix));
            }
        }
    }

    proofs
}

/// Validate `path` as the proof for the byte at `offset` within
/// `[left_bound, right_bound)` against `data_root`.
pub fn validate_path(
    data_root: &[u8; HASH_SIZE],
    offset: usize,
    left_bound: usize,
    right_bound: usize,
    path: &[u8],
) -> Result<ValidatedPath, ProofError> {
    if offset < left_bound || offset >= right_bound {
        return Err(ProofError::OffsetOutOfRange {
            offset,
            left_bound,
            right_bound,
        });
    }

    let len = path.len();
    if len < LEAF_PROOF_LEN || (len - LEAF_PROOF_LEN) % BRANCH_PROOF_LEN != 0 {
        return Err(ProofError::Malformed { len });
    }
    let (branches, leaf) = path.split_at(len - LEAF_PROOF_LEN);

    let mut expected = *data_root;
    let mut left_bound = left_bound;
    let mut right_bound = right_bound;

    for (depth, step) in branches.chunks_exact(BRANCH_PROOF_LEN).enumerate() {
        let (left_id, rest) = step.split_at(HASH_SIZE);
        let (right_id, boundary_note) = rest.split_at(HASH_SIZE);
        let boundary = read_note(boundary_note).ok_or(ProofError::BadNote { depth })?;

        if hash_all(&[left_id, right_id, boundary_note]) != expected {
            return Err(ProofError::PathMismatch { depth });
        }

        let go_right = offset >= boundary;
        let next = if go_right {
            left_bound = left_bound.max(boundary);
            right_id
        } else {
            right_bound = right_bound.min(boundary);
            left_id
        };
        expected.copy_from_slice(next);

        debug!(
            depth,
            boundary,
            side = if go_right { "right" } else { "left" },
            next = %b64url_encode(&expected),
            "proof branch verified"
        );
    }

    let (data_hash, max_note) = leaf.split_at(HASH_SIZE);
    let leaf_max = read_note(max_note).ok_or(ProofError::BadNote {
        depth: branches.len() / BRANCH_PROOF_LEN,
    })?;
    if hash_all(&[data_hash, max_note]) != expected {
        return Err(ProofError::LeafMismatch);
    }
    if leaf_max != right_bound {
        return Err(ProofError::BoundMismatch {
            leaf_max,
            right_bound,
        });
    }

    let mut proven_hash = [0u8; HASH_SIZE];
    proven_hash.copy_from_slice(data_hash);

    Ok(ValidatedPath {
        offset: right_bound - 1,
        left_bound,
        right_bound,
        chunk_size: right_bound - left_bound,
        data_hash: proven_hash,
    })
}

/// Validate a chunk's bytes and proof as the sender is about to post them:
/// the proof must resolve to `data_root` for a payload of `data_size` bytes,
/// `offset` must be the last byte of the proven chunk, and the proof must
/// cover exactly `chunk.len()` bytes and commit to `hash(chunk)`.
///
/// Unlike [`validate_path`], which accepts any offset inside the chunk the
/// way a receiving node does, the declared offset must be exact here.
pub fn validate_chunk(
    data_root: &[u8; HASH_SIZE],
    offset: usize,
    data_size: usize,
    chunk: &[u8],
    path: &[u8],
) -> Result<ValidatedPath, ProofError> {
    let proven = validate_path(data_root, offset, 0, data_size, path)?;
    if offset != proven.offset {
        return Err(ProofError::OffsetMismatch {
            claimed: offset,
            proven: proven.offset,
        });
    }
    if proven.chunk_size != chunk.len() {
        return Err(ProofError::ChunkSizeMismatch {
            expected: proven.chunk_size,
            actual: chunk.len(),
        });
    }
    if hash(chunk) != proven.data_hash {
        return Err(ProofError::DataHashMismatch);
    }
    Ok(proven)
}
