//! Sequential uploader: the resumable transfer state machine.
//!
//! Each [`Uploader::upload_chunk`] call makes at most one request: it posts
//! the transaction if the gateway does not have it yet, otherwise it posts
//! the chunk at the cursor. The cursor only moves after the gateway answers
//! 200 for that chunk, so a serialized uploader never re-sends an accepted
//! chunk. Transient failures are recorded and retried on the next call
//! after a jittered backoff; fatal rejections abandon the upload.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use weave_core::config::UploadSettings;
use weave_core::crypto::b64url_encode;
use weave_core::wire::{is_fatal_code, STATUS_RATE_LIMITED};
use weave_core::{ChunkPlan, Transaction};

use crate::error::{TransportError, UploadError};
use crate::state::{Phase, SerializedUploader, UploadSource};
use crate::transport::{ApiResponse, Transport};

/// Status recorded for a request that never got an HTTP response.
pub const NETWORK_ERROR_STATUS: i32 = -1;

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Uploads one signed transaction and its payload.
///
/// Not safe for concurrent stepping: callers serialize calls to
/// `upload_chunk`. The concurrent driver lives in [`crate::concurrent`].
pub struct Uploader<T> {
    pub(crate) transport: Arc<T>,
    pub(crate) settings: UploadSettings,
    /// Signed metadata; `data` is always empty.
    pub(crate) transaction: Transaction,
    pub(crate) data: Bytes,
    pub(crate) plan: Arc<ChunkPlan>,
    pub(crate) chunk_index: usize,
    pub(crate) tx_posted: bool,
    pub(crate) abandoned: bool,
    last_request_time_end: u64,
    last_response_status: i32,
    last_response_error: String,
    total_error_count: u32,
}

/// The transaction must commit to exactly the payload we are about to send.
fn check_integrity(tx: &Transaction, plan: &ChunkPlan) -> Result<(), UploadError> {
    if !plan.is_empty() && tx.data_root.is_empty() {
        return Err(UploadError::MissingDataRoot {
            size: plan.data_size,
        });
    }
    let actual = plan.encoded_root();
    if tx.data_root != actual {
        return Err(UploadError::DataRootMismatch {
            expected: tx.data_root.clone(),
            actual,
        });
    }
    if tx.declared_size() != Some(plan.data_size) {
        return Err(UploadError::DataSizeMismatch {
            declared: tx.data_size.clone(),
            actual: plan.data_size,
        });
    }
    Ok(())
}

impl<T: Transport> Uploader<T> {
    /// Prepare a fresh upload. If `data` is empty and the transaction carries
    /// an inline payload, that payload is used instead.
    pub fn new(
        transport: Arc<T>,
        transaction: Transaction,
        data: Bytes,
        settings: UploadSettings,
    ) -> Result<Self, UploadError> {
        if !transaction.is_signed() {
            return Err(UploadError::Unsigned);
        }
        let data = if data.is_empty() && !transaction.data.is_empty() {
            Bytes::from(transaction.inline_data()?)
        } else {
            data
        };
        let transaction = transaction.without_data();
        let plan = ChunkPlan::generate(&data);
        check_integrity(&transaction, &plan)?;

        info!(
            id = %transaction.id,
            data_root = %transaction.data_root,
            data_size = data.len(),
            chunks = plan.len(),
            "upload prepared"
        );

        Ok(Self {
            transport,
            settings,
            transaction,
            data,
            plan: Arc::new(plan),
            chunk_index: 0,
            tx_posted: false,
            abandoned: false,
            last_request_time_end: 0,
            last_response_status: 0,
            last_response_error: String::new(),
            total_error_count: 0,
        })
    }

    /// Rehydrate a serialized uploader. The chunk plan is rebuilt from
    /// `data` and must reproduce the transaction's data root.
    ///
    /// The consecutive-error budget starts over on resume.
    pub fn from_serialized(
        transport: Arc<T>,
        state: SerializedUploader,
        data: Bytes,
        settings: UploadSettings,
    ) -> Result<Self, UploadError> {
        if !state.transaction.is_signed() {
            return Err(UploadError::Unsigned);
        }
        let transaction = state.transaction.without_data();
        let plan = ChunkPlan::generate(&data);
        check_integrity(&transaction, &plan)?;

        if state.chunk_index > plan.len() {
            return Err(UploadError::MalformedState(format!(
                "chunk_index {} is beyond the {} chunks of the payload",
                state.chunk_index,
                plan.len()
            )));
        }
        if !state.tx_posted && state.chunk_index != 0 {
            return Err(UploadError::MalformedState(
                "chunk_index is set but the transaction was never posted".to_string(),
            ));
        }

        info!(
            id = %transaction.id,
            chunk_index = state.chunk_index,
            chunks = plan.len(),
            tx_posted = state.tx_posted,
            "upload resumed"
        );

        Ok(Self {
            transport,
            settings,
            transaction,
            data,
            plan: Arc::new(plan),
            chunk_index: state.chunk_index,
            tx_posted: state.tx_posted,
            abandoned: false,
            last_request_time_end: state.last_request_time_end,
            last_response_status: state.last_response_status,
            last_response_error: state.last_response_error,
            total_error_count: 0,
        })
    }

    /// Fetch a transaction the gateway already holds and build a resume
    /// record for it, starting at chunk 0.
    pub async fn from_transaction_id(
        transport: &T,
        id: &str,
    ) -> Result<SerializedUploader, UploadError> {
        let resp = transport.get_tx(id).await?;
        if resp.status != 200 {
            return Err(UploadError::NotFound {
                id: id.to_string(),
                status: i32::from(resp.status),
            });
        }
        let transaction: Transaction = serde_json::from_str(&resp.body)
            .map_err(|e| UploadError::MalformedState(format!("transaction {id}: {e}")))?;
        Ok(SerializedUploader::posted(transaction))
    }

    /// Resolve an [`UploadSource`] into an uploader.
    pub async fn from_source(
        transport: Arc<T>,
        source: UploadSource,
        data: Bytes,
        settings: UploadSettings,
    ) -> Result<Self, UploadError> {
        match source {
            UploadSource::Fresh(tx) => Self::new(transport, tx, data, settings),
            UploadSource::ResumeById(id) => {
                let state = Self::from_transaction_id(&transport, &id).await?;
                Self::from_serialized(transport, state, data, settings)
            }
            UploadSource::ResumeFromState(state) => {
                Self::from_serialized(transport, state, data, settings)
            }
        }
    }

    // ── Progress ──────────────────────────────────────────────────────────────

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn total_chunks(&self) -> usize {
        self.plan.len()
    }

    pub fn uploaded_chunks(&self) -> usize {
        self.chunk_index
    }

    pub fn pct_complete(&self) -> u8 {
        if self.plan.is_empty() {
            return if self.is_complete() { 100 } else { 0 };
        }
        (self.chunk_index * 100 / self.plan.len()) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.tx_posted && self.chunk_index == self.plan.len()
    }

    pub fn last_response_status(&self) -> i32 {
        self.last_response_status
    }

    pub fn last_response_error(&self) -> &str {
        &self.last_response_error
    }

    pub fn total_error_count(&self) -> u32 {
        self.total_error_count
    }

    pub fn phase(&self) -> Phase {
        if self.abandoned {
            Phase::Abandoned
        } else if !self.tx_posted {
            Phase::Fresh
        } else if self.is_complete() {
            Phase::Complete
        } else if self.chunk_index == 0 {
            Phase::TxPosted
        } else {
            Phase::Uploading {
                next: self.chunk_index,
            }
        }
    }

    pub fn to_serialized(&self) -> SerializedUploader {
        SerializedUploader {
            chunk_index: self.chunk_index,
            tx_posted: self.tx_posted,
            transaction: self.transaction.clone(),
            last_request_time_end: self.last_request_time_end,
            last_response_status: self.last_response_status,
            last_response_error: self.last_response_error.clone(),
        }
    }

    // ── Stepping ──────────────────────────────────────────────────────────────

    /// Advance the upload by at most one request.
    ///
    /// Returns `Ok(())` both on success and after a transient failure; the
    /// latter is visible through `last_response_status`/`last_response_error`
    /// and delays the next call.
    pub async fn upload_chunk(&mut self) -> Result<(), UploadError> {
        self.step(None).await
    }

    /// [`Uploader::upload_chunk`] that gives up with
    /// [`UploadError::Cancelled`] once `cancel` fires, either during the
    /// backoff wait or before the request goes out. A request already on the
    /// wire is always awaited.
    pub async fn upload_chunk_or_cancel(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        self.step(Some(cancel)).await
    }

    fn cancelled(&self) -> UploadError {
        UploadError::Cancelled {
            remaining: self.plan.len() - self.chunk_index,
        }
    }

    async fn step(&mut self, cancel: Option<&CancellationToken>) -> Result<(), UploadError> {
        if self.abandoned {
            return Err(UploadError::Abandoned);
        }
        if self.is_complete() {
            return Err(UploadError::AlreadyComplete);
        }
        if self.total_error_count >= self.settings.max_consecutive_errors {
            self.abandoned = true;
            warn!(
                id = %self.transaction.id,
                errors = self.total_error_count,
                status = self.last_response_status,
                error = %self.last_response_error,
                "giving up on upload"
            );
            return Err(UploadError::Exhausted {
                errors: self.total_error_count,
                last_status: self.last_response_status,
                last_error: self.last_response_error.clone(),
            });
        }

        let delay = self.next_delay();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
            match cancel {
                Some(cancel) => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(self.cancelled()),
                    _ = tokio::time::sleep(delay) => {}
                },
                None => tokio::time::sleep(delay).await,
            }
        }
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(self.cancelled());
        }

        if !self.tx_posted {
            return self.post_transaction().await;
        }

        let index = self.chunk_index;
        if self.send_chunk(index).await? {
            self.chunk_index += 1;
            info!(
                chunk_index = index,
                uploaded = self.chunk_index,
                total = self.plan.len(),
                "chunk accepted"
            );
            if self.is_complete() {
                info!(id = %self.transaction.id, "upload complete");
            }
        }
        Ok(())
    }

    /// Step until complete. Transient failures are retried under the backoff
    /// policy; the first non-recoverable error is returned.
    pub async fn once(&mut self) -> Result<(), UploadError> {
        while !self.is_complete() {
            self.upload_chunk().await?;
        }
        Ok(())
    }

    /// Post an already-accepted chunk again without moving the cursor.
    /// Returns whether the gateway accepted it.
    pub async fn resend_chunk(&mut self, index: usize) -> Result<bool, UploadError> {
        if self.abandoned {
            return Err(UploadError::Abandoned);
        }
        if !self.tx_posted || index >= self.chunk_index {
            return Err(UploadError::NotDelivered { index });
        }
        self.send_chunk(index).await
    }

    /// Delay owed before the next request: what is left of the error window
    /// since the last request ended, minus up to `max_jitter` of it.
    pub(crate) fn next_delay(&self) -> Duration {
        if self.last_response_error.is_empty() {
            return Duration::ZERO;
        }
        let window_end = self
            .last_request_time_end
            .saturating_add(self.settings.error_delay_ms);
        let remaining = window_end.saturating_sub(now_ms());
        if remaining == 0 {
            return Duration::ZERO;
        }
        let max_jitter = if self.settings.max_jitter.is_finite() {
            self.settings.max_jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let jitter = rand::thread_rng().gen_range(0.0..=max_jitter);
        Duration::from_millis(remaining).mul_f64(1.0 - jitter)
    }

    fn record(&mut self, outcome: Result<ApiResponse, TransportError>, accepted: fn(u16) -> bool) {
        self.last_request_time_end = now_ms();
        match outcome {
            Ok(resp) => {
                self.last_response_status = i32::from(resp.status);
                self.last_response_error = if accepted(resp.status) {
                    String::new()
                } else {
                    resp.error_code()
                };
            }
            Err(e) => {
                self.last_response_status = NETWORK_ERROR_STATUS;
                self.last_response_error = e.to_string();
            }
        }
    }

    fn http_status(&self) -> u16 {
        u16::try_from(self.last_response_status).unwrap_or(0)
    }

    async fn post_transaction(&mut self) -> Result<(), UploadError> {
        let inline = self.plan.len() <= self.settings.max_chunks_in_body;
        let mut body = self.transaction.clone();
        if inline {
            body.data = b64url_encode(&self.data);
        }

        let outcome = self.transport.post_tx(&body).await;
        self.record(outcome, |status| (200..300).contains(&status));

        if self.last_response_error.is_empty() {
            self.tx_posted = true;
            self.total_error_count = 0;
            if inline {
                self.chunk_index = self.plan.len();
            }
            info!(
                id = %self.transaction.id,
                inline,
                status = self.last_response_status,
                "transaction posted"
            );
            return Ok(());
        }

        let status = self.last_response_status;
        let transient = status == NETWORK_ERROR_STATUS
            || status == i32::from(STATUS_RATE_LIMITED)
            || status >= 500;
        if transient {
            self.total_error_count += 1;
            warn!(
                id = %self.transaction.id,
                status,
                error = %self.last_response_error,
                errors = self.total_error_count,
                "transaction post failed, will retry"
            );
            return Ok(());
        }

        self.abandoned = true;
        Err(UploadError::TxRejected {
            status: self.http_status(),
            error: self.last_response_error.clone(),
        })
    }

    /// Validate and post chunk `index`. Returns whether it was accepted.
    async fn send_chunk(&mut self, index: usize) -> Result<bool, UploadError> {
        if let Err(e) = self.plan.validate(index, &self.data) {
            self.abandoned = true;
            return Err(e.into());
        }
        let payload = self.plan.payload(index, &self.data)?;

        let outcome = self.transport.post_chunk(&payload).await;
        self.record(outcome, |status| status == 200);

        if self.last_response_error.is_empty() {
            self.total_error_count = 0;
            return Ok(true);
        }

        if is_fatal_code(&self.last_response_error) {
            self.abandoned = true;
            warn!(
                chunk_index = index,
                status = self.last_response_status,
                error = %self.last_response_error,
                "fatal chunk rejection, abandoning upload"
            );
            return Err(UploadError::Fatal {
                chunk_index: index,
                status: self.http_status(),
                code: self.last_response_error.clone(),
            });
        }

        self.total_error_count += 1;
        warn!(
            chunk_index = index,
            status = self.last_response_status,
            error = %self.last_response_error,
            errors = self.total_error_count,
            "chunk upload failed, will retry"
        );
        Ok(false)
    }
}
