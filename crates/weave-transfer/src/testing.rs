//! In-memory transport double for uploader tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use weave_core::wire::ChunkPayload;
use weave_core::{ChunkPlan, Transaction};

use crate::error::TransportError;
use crate::transport::{ApiResponse, Transport};

type ChunkResponder =
    Box<dyn Fn(usize, usize) -> Result<ApiResponse, TransportError> + Send + Sync>;

/// Scripted gateway. `/tx` answers from a queue (200 once empty); `/chunk`
/// answers from a closure of `(offset, attempt)` where `attempt` counts
/// earlier posts of the same offset.
pub(crate) struct MockTransport {
    tx_script: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    chunk_responder: ChunkResponder,
    get_response: Option<ApiResponse>,
    chunk_latency: Option<Duration>,
    attempts: Mutex<HashMap<usize, usize>>,
    pub tx_posts: Mutex<Vec<Transaction>>,
    pub chunk_offsets: Mutex<Vec<usize>>,
    /// `/chunk` requests that ran to completion.
    pub chunks_finished: Mutex<usize>,
}

impl MockTransport {
    pub fn ok() -> Self {
        Self::with_chunks(|_, _| Ok(ApiResponse::new(200, "OK")))
    }

    pub fn with_chunks(
        responder: impl Fn(usize, usize) -> Result<ApiResponse, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            tx_script: Mutex::new(VecDeque::new()),
            chunk_responder: Box::new(responder),
            get_response: None,
            chunk_latency: None,
            attempts: Mutex::new(HashMap::new()),
            tx_posts: Mutex::new(Vec::new()),
            chunk_offsets: Mutex::new(Vec::new()),
            chunks_finished: Mutex::new(0),
        }
    }

    pub fn script_tx(self, responses: Vec<Result<ApiResponse, TransportError>>) -> Self {
        *self.tx_script.lock().unwrap() = responses.into();
        self
    }

    pub fn serving_tx(mut self, response: ApiResponse) -> Self {
        self.get_response = Some(response);
        self
    }

    /// Every `/chunk` request takes `latency` before it is answered.
    pub fn with_chunk_latency(mut self, latency: Duration) -> Self {
        self.chunk_latency = Some(latency);
        self
    }

    pub fn chunk_calls(&self) -> usize {
        self.chunk_offsets.lock().unwrap().len()
    }

    /// Chunk indices posted so far, in call order.
    pub fn chunk_indices(&self, plan: &ChunkPlan) -> Vec<usize> {
        self.chunk_offsets
            .lock()
            .unwrap()
            .iter()
            .map(|offset| {
                plan.proofs
                    .iter()
                    .position(|p| p.offset == *offset)
                    .expect("posted offset belongs to the plan")
            })
            .collect()
    }
}

impl Transport for MockTransport {
    async fn post_tx(&self, tx: &Transaction) -> Result<ApiResponse, TransportError> {
        self.tx_posts.lock().unwrap().push(tx.clone());
        self.tx_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ApiResponse::new(200, "OK")))
    }

    async fn post_chunk(&self, chunk: &ChunkPayload) -> Result<ApiResponse, TransportError> {
        let offset: usize = chunk.offset.parse().expect("offset is numeric");
        self.chunk_offsets.lock().unwrap().push(offset);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(offset).or_insert(0);
            *n += 1;
            *n - 1
        };
        if let Some(latency) = self.chunk_latency {
            tokio::time::sleep(latency).await;
        }
        *self.chunks_finished.lock().unwrap() += 1;
        (self.chunk_responder)(offset, attempt)
    }

    async fn get_tx(&self, _id: &str) -> Result<ApiResponse, TransportError> {
        Ok(self
            .get_response
            .clone()
            .unwrap_or_else(|| ApiResponse::new(404, "Not Found")))
    }
}
