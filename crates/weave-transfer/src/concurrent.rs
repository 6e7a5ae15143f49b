//! Concurrent driver: posts the transaction, then spreads the pending
//! chunks over a fixed set of workers.
//!
//! Workers own disjoint index sets, so every chunk is submitted by exactly
//! one of them. A worker retries its chunk on transient failures with a
//! short fixed delay (longer after a 429) until the gateway answers 200.
//! A fatal rejection or a chunk that fails local validation cancels every
//! other worker.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use weave_core::wire::{is_fatal_code, STATUS_RATE_LIMITED};
use weave_core::ChunkPlan;

use crate::error::UploadError;
use crate::transport::Transport;
use crate::uploader::Uploader;

/// Totals for one concurrent run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrentReport {
    /// Chunks accepted by the gateway.
    pub submitted: usize,
    /// Extra posts caused by transient failures.
    pub retries: usize,
}

struct ChunkWorker<T> {
    id: usize,
    transport: Arc<T>,
    plan: Arc<ChunkPlan>,
    data: Bytes,
    retry_delay: Duration,
    rate_limited_delay: Duration,
    stop: CancellationToken,
}

/// What a worker got done before it returned.
#[derive(Debug, Default)]
struct WorkerOutcome {
    report: ConcurrentReport,
    remaining: usize,
}

impl<T: Transport> ChunkWorker<T> {
    async fn run(self, indices: Vec<usize>) -> Result<WorkerOutcome, UploadError> {
        let mut outcome = WorkerOutcome::default();
        for (done, &index) in indices.iter().enumerate() {
            if self.stop.is_cancelled() {
                outcome.remaining = indices.len() - done;
                return Ok(outcome);
            }
            if !self.deliver(index, &mut outcome.report).await? {
                outcome.remaining = indices.len() - done;
                return Ok(outcome);
            }
            outcome.report.submitted += 1;
        }
        debug!(
            worker = self.id,
            submitted = outcome.report.submitted,
            "worker finished"
        );
        Ok(outcome)
    }

    /// Post chunk `index` until accepted. Returns `false` if stopped first.
    async fn deliver(
        &self,
        index: usize,
        report: &mut ConcurrentReport,
    ) -> Result<bool, UploadError> {
        self.plan.validate(index, &self.data)?;
        let payload = self.plan.payload(index, &self.data)?;

        loop {
            // A request on the wire runs to completion; the gateway may
            // persist the chunk even if we stop right after.
            let outcome = self.transport.post_chunk(&payload).await;

            let delay = match outcome {
                Ok(resp) if resp.status == 200 => return Ok(true),
                Ok(resp) => {
                    let code = resp.error_code();
                    if is_fatal_code(&code) {
                        return Err(UploadError::Fatal {
                            chunk_index: index,
                            status: resp.status,
                            code,
                        });
                    }
                    warn!(
                        worker = self.id,
                        chunk_index = index,
                        status = resp.status,
                        error = %code,
                        "chunk post failed, retrying"
                    );
                    if resp.status == STATUS_RATE_LIMITED {
                        self.rate_limited_delay
                    } else {
                        self.retry_delay
                    }
                }
                Err(e) => {
                    warn!(
                        worker = self.id,
                        chunk_index = index,
                        error = %e,
                        "chunk post failed, retrying"
                    );
                    self.retry_delay
                }
            };

            if self.stop.is_cancelled() {
                return Ok(false);
            }
            report.retries += 1;
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => return Ok(false),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Split `pending` over `width` workers by stride: worker `w` gets
/// `pending[w], pending[w + width], ...`.
fn partition(pending: &[usize], width: usize) -> Vec<Vec<usize>> {
    let mut sets = vec![Vec::new(); width];
    for (i, &index) in pending.iter().enumerate() {
        sets[i % width].push(index);
    }
    sets
}

impl<T: Transport> Uploader<T> {
    /// Deliver every remaining chunk using up to `settings.concurrency`
    /// workers. Cancelling `cancel` stops the run between requests and
    /// returns [`UploadError::Cancelled`]. Requests already sent are
    /// awaited, never dropped mid-flight.
    ///
    /// On success the uploader is complete. On cancellation or failure the
    /// cursor is left where it was, since completed indices need not be
    /// contiguous; a later sequential resume re-sends from the cursor.
    pub async fn upload_concurrently(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<ConcurrentReport, UploadError> {
        if self.abandoned {
            return Err(UploadError::Abandoned);
        }

        while !self.tx_posted {
            self.upload_chunk_or_cancel(&cancel).await?;
        }
        if self.is_complete() {
            return Ok(ConcurrentReport::default());
        }

        let pending: Vec<usize> = (self.chunk_index..self.plan.len()).collect();
        let width = self.settings.concurrency.max(1).min(pending.len());
        let stop = cancel.child_token();

        info!(
            id = %self.transaction.id,
            pending = pending.len(),
            workers = width,
            "starting concurrent chunk upload"
        );

        let mut workers = JoinSet::new();
        for (id, indices) in partition(&pending, width).into_iter().enumerate() {
            let worker = ChunkWorker {
                id,
                transport: self.transport.clone(),
                plan: self.plan.clone(),
                data: self.data.clone(),
                retry_delay: self.settings.retry_delay(),
                rate_limited_delay: self.settings.rate_limited_delay(),
                stop: stop.clone(),
            };
            workers.spawn(worker.run(indices));
        }

        let mut report = ConcurrentReport::default();
        let mut remaining = 0;
        let mut failure: Option<UploadError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(outcome)) => {
                    report.submitted += outcome.report.submitted;
                    report.retries += outcome.report.retries;
                    remaining += outcome.remaining;
                }
                Ok(Err(e)) => {
                    stop.cancel();
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    stop.cancel();
                    failure.get_or_insert(UploadError::Worker(e.to_string()));
                }
            }
        }

        if let Some(e) = failure {
            if e.is_fatal() {
                self.abandoned = true;
            }
            warn!(id = %self.transaction.id, error = %e, "concurrent upload stopped");
            return Err(e);
        }
        if remaining > 0 {
            info!(id = %self.transaction.id, remaining, "concurrent upload cancelled");
            return Err(UploadError::Cancelled { remaining });
        }

        self.chunk_index = self.plan.len();
        info!(
            id = %self.transaction.id,
            submitted = report.submitted,
            retries = report.retries,
            "upload complete"
        );
        Ok(report)
    }
}
