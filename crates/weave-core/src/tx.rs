//! Transaction model: the signed envelope a payload is uploaded under.
//!
//! Signing happens elsewhere. This crate only reads the signing fields and
//! never alters them; the uploader strips and re-attaches `data` as needed.

use serde::{Deserialize, Serialize};

use crate::crypto::{b64url_decode, EncodingError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

/// A transaction as posted to `POST <base>/tx`.
///
/// Amounts and sizes are decimal strings; binary fields are base64url.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transaction {
    pub format: u8,
    pub id: String,
    /// Anchor: a recent ledger reference, opaque here.
    pub last_tx: String,
    pub owner: String,
    pub tags: Vec<Tag>,
    pub target: String,
    pub quantity: String,
    /// Inline payload. Empty unless the whole payload rides in the body.
    pub data: String,
    pub data_size: String,
    pub data_root: String,
    pub reward: String,
    pub signature: String,
}

impl Transaction {
    /// A transaction can be uploaded only once it carries an id and signature.
    pub fn is_signed(&self) -> bool {
        !self.id.is_empty() && !self.signature.is_empty()
    }

    /// Copy of this transaction with the inline payload removed.
    pub fn without_data(&self) -> Self {
        Self {
            data: String::new(),
            ..self.clone()
        }
    }

    /// Declared payload size. A missing size reads as zero.
    pub fn declared_size(&self) -> Option<usize> {
        if self.data_size.is_empty() {
            return Some(0);
        }
        self.data_size.parse().ok()
    }

    /// Decode the inline payload, if any.
    pub fn inline_data(&self) -> Result<Vec<u8>, EncodingError> {
        b64url_decode(&self.data)
    }
}
