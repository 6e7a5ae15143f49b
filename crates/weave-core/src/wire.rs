//! Weave wire format: the JSON bodies exchanged with a gateway.
//!
//! These types ARE the protocol. Field names and the string encoding of
//! numbers match what gateways accept; changing them breaks uploads.
//! Binary values are base64url without padding.

use serde::{Deserialize, Serialize};

// ── Chunk body ────────────────────────────────────────────────────────────────

/// Body of `POST <base>/chunk`.
///
/// A receiving node can verify the chunk against `data_root` using only
/// `data_path`, `offset` and `data_size`, before persisting anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Root of the payload this chunk belongs to.
    pub data_root: String,
    /// Total payload size in bytes, as a decimal string.
    pub data_size: String,
    /// Encoded inclusion proof.
    pub data_path: String,
    /// Last byte the chunk covers, as a decimal string.
    pub offset: String,
    /// The chunk bytes.
    pub chunk: String,
}

// ── Error body ────────────────────────────────────────────────────────────────

/// Error object returned by a gateway on rejection: `{"error": "<code>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Chunk rejections that can never succeed on retry. Receiving one aborts
/// the whole transfer.
pub const FATAL_CHUNK_UPLOAD_ERRORS: [&str; 7] = [
    "invalid_json",
    "chunk_too_big",
    "data_path_too_big",
    "offset_too_big",
    "data_size_too_big",
    "chunk_proof_ratio_not_attractive",
    "invalid_proof",
];

/// HTTP status a gateway returns when the caller is rate limited.
pub const STATUS_RATE_LIMITED: u16 = 429;

pub fn is_fatal_code(code: &str) -> bool {
    FATAL_CHUNK_UPLOAD_ERRORS.contains(&code)
}

/// Extract the error code from a response body. A JSON error object yields
/// its `error` field; anything else is returned trimmed, as-is.
pub fn error_code(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => body.trim().to_string(),
    }
}
