//! Transport seam for the three upload operations.
//!
//! `UploadTransport` is implemented by the host application over its
//! actual wire (HTTP, WebSocket, in-process). Using a trait keeps the
//! transfer state machine decoupled from transport and testable with
//! mocks.

use std::future::Future;
use std::pin::Pin;

use chunklift_protocol::{
    CompleteUploadRequest, CompleteUploadResponse, UploadChunkRequest, UploadChunkResponse,
    UploadStatusRequest, UploadStatusResponse,
};

/// A boxed future returned by transport methods.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Errors surfaced by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server processed the request and said no.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Unclassified transport failure; fatal for the current attempt.
    #[error("network error: {0}")]
    Network(String),
}

/// Abstract connection to the upload server.
pub trait UploadTransport: Send + Sync {
    /// Sends one chunk's bytes plus placement metadata.
    fn upload_chunk(&self, req: UploadChunkRequest)
    -> TransportFuture<'_, UploadChunkResponse>;

    /// Asks the server to assemble the final file.
    fn complete(&self, req: CompleteUploadRequest) -> TransportFuture<'_, CompleteUploadResponse>;

    /// Fetches the server's receipt bitmap.
    fn status(&self, req: UploadStatusRequest) -> TransportFuture<'_, UploadStatusResponse>;
}
