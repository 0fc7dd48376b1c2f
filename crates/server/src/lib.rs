//! Server side of the chunked upload protocol.
//!
//! [`UploadService`] implements the three operations: receive a chunk,
//! report upload status, and assemble the final file. Chunk receipt is
//! tracked in an in-memory [`ChunkTracker`] for the lifetime of the
//! process; chunk bytes live on disk until finalize consumes them.

mod service;
mod store;
mod validation;

pub use service::{ServiceConfig, UploadService};
pub use store::{ChunkTracker, MarkOutcome};
pub use validation::validate_file_name;

use chunklift_protocol::ErrorResponse;

/// Errors produced by the upload service.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Validation(String),
}

impl ServerError {
    /// Converts the error into the protocol's error payload.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            message: self.to_string(),
        }
    }
}
