//! weave-core: chunking, Merkle trees, inclusion proofs and the shared
//! transaction/wire types and client configuration. Everything here is synchronous; the
//! transfer crate builds its retry policy on top.

pub mod chunk;
pub mod config;
pub mod crypto;
pub mod merkle;
pub mod plan;
pub mod proof;
pub mod tx;
pub mod wire;

pub use chunk::{chunk_data, Chunk, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use plan::{ChunkPlan, PlanError};
pub use proof::{validate_chunk, validate_path, Proof, ProofError, ValidatedPath};
pub use tx::{Tag, Transaction};
pub use wire::ChunkPayload;
