//! Upload progress as data: the resumable record, where an uploader
//! comes from, and which phase it is in.

use serde::{Deserialize, Serialize};

use weave_core::Transaction;

use crate::error::UploadError;

/// Externalised uploader state. Holds everything needed to resume except
/// the payload bytes, which the caller supplies again on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedUploader {
    pub chunk_index: usize,
    pub tx_posted: bool,
    /// Transaction metadata; `data` is always empty here.
    pub transaction: Transaction,
    /// Unix milliseconds at which the last request finished.
    #[serde(default)]
    pub last_request_time_end: u64,
    #[serde(default)]
    pub last_response_status: i32,
    #[serde(default)]
    pub last_response_error: String,
}

impl SerializedUploader {
    /// State for a transaction already accepted by the gateway, with no
    /// chunk known to be delivered.
    pub fn posted(transaction: Transaction) -> Self {
        Self {
            chunk_index: 0,
            tx_posted: true,
            transaction: transaction.without_data(),
            last_request_time_end: 0,
            last_response_status: 0,
            last_response_error: String::new(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, UploadError> {
        serde_json::from_str(text).map_err(|e| UploadError::MalformedState(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, UploadError> {
        serde_json::to_string_pretty(self).map_err(|e| UploadError::MalformedState(e.to_string()))
    }
}

/// Where an uploader's state comes from, resolved once at construction.
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// A freshly signed transaction, nothing posted yet.
    Fresh(Transaction),
    /// A transaction the gateway already holds, looked up by id.
    ResumeById(String),
    /// A previously serialized uploader.
    ResumeFromState(SerializedUploader),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Transaction not yet accepted.
    Fresh,
    /// Transaction accepted, no chunk delivered yet.
    TxPosted,
    /// Chunks below `next` accepted.
    Uploading { next: usize },
    Complete,
    /// A fatal error or the retry budget ended the transfer.
    Abandoned,
}
