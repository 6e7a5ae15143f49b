//! weave-transfer: delivers a signed transaction and its chunks to a
//! gateway, sequentially with backoff or across a pool of workers.

pub mod concurrent;
pub mod error;
pub mod state;
pub mod transport;
pub mod uploader;

#[cfg(test)]
mod testing;

pub use concurrent::ConcurrentReport;
pub use error::{TransportError, UploadError};
pub use state::{Phase, SerializedUploader, UploadSource};
pub use transport::{ApiResponse, HttpTransport, Transport};
pub use uploader::Uploader;
