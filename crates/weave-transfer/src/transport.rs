//! Gateway transport: the three requests the uploader makes.
//!
//! The uploader and the concurrent driver only see the [`Transport`] trait,
//! so a caller injects the client (and with it timeouts) rather than relying
//! on a process-wide default. [`HttpTransport`] is the reqwest-backed one.

use std::future::Future;
use std::time::Duration;

use weave_core::config::GatewayConfig;
use weave_core::wire::{error_code, ChunkPayload};
use weave_core::Transaction;

use crate::error::TransportError;

/// Status and raw body of a gateway response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Error code carried by the body, or `HTTP <status>` when the body
    /// says nothing, so a failure is never recorded as an empty error.
    pub fn error_code(&self) -> String {
        let code = error_code(&self.body);
        if code.is_empty() {
            format!("HTTP {}", self.status)
        } else {
            code
        }
    }
}

/// Requests against one gateway. Implementations must be safe to share
/// across the concurrent driver's workers.
pub trait Transport: Send + Sync + 'static {
    /// `POST <base>/tx` with the JSON transaction.
    fn post_tx(
        &self,
        tx: &Transaction,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;

    /// `POST <base>/chunk` with one chunk and its proof.
    fn post_chunk(
        &self,
        chunk: &ChunkPayload,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;

    /// `GET <base>/tx/{id}`.
    fn get_tx(&self, id: &str)
        -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;
}

/// reqwest-backed transport. Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, TransportError> {
        Self::new(&config.url, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn read(resp: reqwest::Response) -> Result<ApiResponse, TransportError> {
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(ApiResponse { status, body })
    }
}

impl Transport for HttpTransport {
    async fn post_tx(&self, tx: &Transaction) -> Result<ApiResponse, TransportError> {
        let resp = self.client.post(self.url("tx")).json(tx).send().await?;
        Self::read(resp).await
    }

    async fn post_chunk(&self, chunk: &ChunkPayload) -> Result<ApiResponse, TransportError> {
        let resp = self.client.post(self.url("chunk")).json(chunk).send().await?;
        Self::read(resp).await
    }

    async fn get_tx(&self, id: &str) -> Result<ApiResponse, TransportError> {
        let resp = self.client.get(self.url(&format!("tx/{id}"))).send().await?;
        Self::read(resp).await
    }
}
