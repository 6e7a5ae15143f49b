//! In-process mock gateway.
//!
//! Serves `POST /tx`, `POST /chunk` and `GET /tx/{id}` on a loopback port.
//! Every chunk is checked against its proof the way a real node would,
//! and answered `400 {"error":"invalid_proof"}` if it does not verify.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::task::JoinHandle;

use weave_core::crypto::{b64url_decode, b64url_decode_hash};
use weave_core::{validate_chunk, ChunkPayload, ChunkPlan, Transaction};
use weave_transfer::HttpTransport;

type Reply = (StatusCode, String);

#[derive(Default)]
struct GatewayState {
    txs: HashMap<String, Transaction>,
    tx_posts: usize,
    inline_payloads: HashMap<String, Vec<u8>>,
    chunk_offsets: Vec<usize>,
    accepted: HashSet<(String, usize)>,
    tx_script: VecDeque<Reply>,
    chunk_script: VecDeque<Reply>,
    rejected_offsets: HashMap<usize, Reply>,
}

type Shared = Arc<Mutex<GatewayState>>;

pub struct MockGateway {
    pub url: String,
    state: Shared,
    server: JoinHandle<()>,
}

impl MockGateway {
    pub async fn start() -> Result<Self> {
        let state: Shared = Arc::default();
        let app = Router::new()
            .route("/tx", post(handle_post_tx))
            .route("/tx/{id}", get(handle_get_tx))
            .route("/chunk", post(handle_post_chunk))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { url, state, server })
    }

    pub fn transport(&self) -> HttpTransport {
        HttpTransport::new(&self.url, Duration::from_secs(10)).expect("client builds")
    }

    /// Answer the next `/tx` posts with these replies before accepting.
    pub fn script_tx(&self, replies: &[(u16, &str)]) {
        self.state.lock().unwrap().tx_script.extend(to_replies(replies));
    }

    /// Answer the next `/chunk` posts with these replies before validating.
    pub fn script_chunks(&self, replies: &[(u16, &str)]) {
        self.state.lock().unwrap().chunk_script.extend(to_replies(replies));
    }

    /// Always reject chunks at `offset`.
    pub fn reject_offset(&self, offset: usize, status: u16, body: &str) {
        let reply = to_replies(&[(status, body)]).remove(0);
        self.state.lock().unwrap().rejected_offsets.insert(offset, reply);
    }

    /// Seed a transaction as if it had been posted earlier.
    pub fn insert_tx(&self, tx: Transaction) {
        self.state.lock().unwrap().txs.insert(tx.id.clone(), tx);
    }

    pub fn tx_posts(&self) -> usize {
        self.state.lock().unwrap().tx_posts
    }

    pub fn inline_payload(&self, id: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().inline_payloads.get(id).cloned()
    }

    /// Offsets of every `/chunk` request, accepted or not, in arrival order.
    pub fn chunk_offsets(&self) -> Vec<usize> {
        self.state.lock().unwrap().chunk_offsets.clone()
    }

    /// Whether every chunk of `plan` has been accepted.
    pub fn holds(&self, plan: &ChunkPlan) -> bool {
        let root = plan.encoded_root();
        let state = self.state.lock().unwrap();
        plan.proofs
            .iter()
            .all(|p| state.accepted.contains(&(root.clone(), p.offset)))
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn to_replies(replies: &[(u16, &str)]) -> Vec<Reply> {
    replies
        .iter()
        .map(|(status, body)| {
            (
                StatusCode::from_u16(*status).expect("valid status"),
                body.to_string(),
            )
        })
        .collect()
}

fn reject(code: &str) -> Reply {
    (
        StatusCode::BAD_REQUEST,
        serde_json::json!({ "error": code }).to_string(),
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn handle_post_tx(State(state): State<Shared>, Json(tx): Json<Transaction>) -> Reply {
    let mut state = state.lock().unwrap();
    state.tx_posts += 1;
    if let Some(reply) = state.tx_script.pop_front() {
        return reply;
    }
    if !tx.data.is_empty() {
        let Ok(data) = b64url_decode(&tx.data) else {
            return reject("invalid_json");
        };
        if ChunkPlan::generate(&data).encoded_root() != tx.data_root {
            return reject("invalid_data_root");
        }
        state.inline_payloads.insert(tx.id.clone(), data);
    }
    state.txs.insert(tx.id.clone(), tx.without_data());
    (StatusCode::OK, "OK".to_string())
}

async fn handle_get_tx(State(state): State<Shared>, Path(id): Path<String>) -> Reply {
    let state = state.lock().unwrap();
    match state.txs.get(&id) {
        Some(tx) => (
            StatusCode::OK,
            serde_json::to_string(tx).unwrap_or_default(),
        ),
        None => (StatusCode::NOT_FOUND, "Not Found".to_string()),
    }
}

async fn handle_post_chunk(State(state): State<Shared>, Json(chunk): Json<ChunkPayload>) -> Reply {
    let mut state = state.lock().unwrap();

    let Ok(offset) = chunk.offset.parse::<usize>() else {
        return reject("invalid_json");
    };
    state.chunk_offsets.push(offset);

    if let Some(reply) = state.chunk_script.pop_front() {
        return reply;
    }
    if let Some(reply) = state.rejected_offsets.get(&offset) {
        return reply.clone();
    }
    if !state.txs.values().any(|tx| tx.data_root == chunk.data_root) {
        return reject("data_root_not_found");
    }

    let decoded = (|| {
        let root = b64url_decode_hash(&chunk.data_root).ok()?;
        let path = b64url_decode(&chunk.data_path).ok()?;
        let bytes = b64url_decode(&chunk.chunk).ok()?;
        let size = chunk.data_size.parse::<usize>().ok()?;
        Some((root, path, bytes, size))
    })();
    let Some((root, path, bytes, size)) = decoded else {
        return reject("invalid_json");
    };

    if validate_chunk(&root, offset, size, &bytes, &path).is_err() {
        return reject("invalid_proof");
    }
    state.accepted.insert((chunk.data_root, offset));
    (StatusCode::OK, "OK".to_string())
}
