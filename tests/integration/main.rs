//! weave integration test harness.
//!
//! Every test starts its own mock gateway on a loopback port and drives the
//! real reqwest transport against it:
//!
//!   cargo test --test integration
//!
//! Gateways are independent, so tests run in parallel.

mod infra;
mod sequential;

use bytes::Bytes;
use weave_core::config::UploadSettings;
use weave_core::{ChunkPlan, Transaction};

// ── Harness ───────────────────────────────────────────────────────────────────

pub const KIB: usize = 1024;

/// Deterministic, non-repeating-per-chunk test payload.
pub fn payload(len: usize) -> Bytes {
    Bytes::from(
        (0..len)
            .map(|i| (i as u32).wrapping_mul(2_654_435_761).rotate_left(7) as u8)
            .collect::<Vec<u8>>(),
    )
}

/// A transaction committed to `data`, with placeholder owner and signature.
pub fn signed_tx(id: &str, data: &[u8]) -> Transaction {
    let plan = ChunkPlan::generate(data);
    Transaction {
        format: 2,
        id: id.to_string(),
        last_tx: "anchor".to_string(),
        owner: "owner".to_string(),
        data_root: plan.encoded_root(),
        data_size: data.len().to_string(),
        reward: "1000".to_string(),
        signature: "signature".to_string(),
        ..Default::default()
    }
}

/// Settings with no backoff so retries happen immediately.
pub fn fast_settings() -> UploadSettings {
    UploadSettings {
        error_delay_ms: 0,
        max_jitter: 0.0,
        retry_delay_ms: 1,
        rate_limited_delay_ms: 5,
        ..Default::default()
    }
}
