//! Client side of the chunked upload protocol.
//!
//! [`TransferController`] drives a single file upload one chunk at a
//! time: it plans the chunk layout, reconciles with the server's receipt
//! bitmap on every (re)start, skips chunks already durable, and supports
//! cooperative pause, resume, and cancel around the one in-flight send.
//!
//! The transport is abstract: implement [`UploadTransport`] over
//! whatever carries the three operations.

mod controller;
mod planner;
mod reconciler;
mod source;
mod transport;

pub use controller::{TransferController, TransferStatus};
pub use planner::{chunk_range, total_chunks};
pub use reconciler::{Reconciled, reconcile};
pub use source::ChunkSource;
pub use transport::{TransportError, TransportFuture, UploadTransport};

/// Errors produced by the client transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}
