//! Transfer errors.
//!
//! Transient failures (network errors, timeouts, 5xx, unclassified
//! rejections) are not errors here: the uploader records them and retries.
//! Everything in [`UploadError`] ends the current drive loop.

use weave_core::crypto::EncodingError;
use weave_core::PlanError;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(reqwest::Error),
    /// No connection could be made; nothing reached the gateway.
    #[error("gateway unreachable: {0}")]
    Unreachable(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            TransportError::Unreachable(e.to_string())
        } else {
            TransportError::Http(e)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    // ── Construction ──────────────────────────────────────────────────────────
    #[error("transaction is not signed")]
    Unsigned,
    #[error("transaction carries {size} bytes of data but no data root")]
    MissingDataRoot { size: usize },
    #[error("data mismatch: transaction root {expected:?}, payload root {actual:?}")]
    DataRootMismatch { expected: String, actual: String },
    #[error("data size mismatch: transaction declares {declared:?}, payload is {actual} bytes")]
    DataSizeMismatch { declared: String, actual: usize },
    #[error("serialized upload state is malformed: {0}")]
    MalformedState(String),
    #[error("transaction {id} not found: {status}")]
    NotFound { id: String, status: i32 },
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Transport(#[from] TransportError),

    // ── Fatal transfer ────────────────────────────────────────────────────────
    #[error("fatal error uploading chunk {chunk_index}: {status}: {code}")]
    Fatal {
        chunk_index: usize,
        status: u16,
        code: String,
    },
    #[error("unable to upload transaction: {status}: {error}")]
    TxRejected { status: u16, error: String },
    #[error(transparent)]
    InvalidChunk(#[from] PlanError),

    // ── Terminal states ───────────────────────────────────────────────────────
    #[error("unable to complete upload after {errors} consecutive errors: {last_status}: {last_error}")]
    Exhausted {
        errors: u32,
        last_status: i32,
        last_error: String,
    },
    #[error("upload is already complete")]
    AlreadyComplete,
    #[error("chunk {index} has not been delivered yet")]
    NotDelivered { index: usize },
    #[error("upload was abandoned after a fatal error")]
    Abandoned,
    #[error("upload cancelled with {remaining} chunks outstanding")]
    Cancelled { remaining: usize },
    #[error("chunk worker failed: {0}")]
    Worker(String),
}

impl UploadError {
    /// Errors that mean the current chunk plan can never be delivered and
    /// the transfer must restart from scratch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            UploadError::Fatal { .. }
                | UploadError::TxRejected { .. }
                | UploadError::InvalidChunk(_)
                | UploadError::Abandoned
        )
    }

    /// Errors after which the serialized state is still a valid resume point.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            UploadError::Exhausted { .. } | UploadError::Cancelled { .. } | UploadError::Worker(_)
        )
    }
}
