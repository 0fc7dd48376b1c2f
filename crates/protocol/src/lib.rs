//! Wire payload types for the chunklift upload protocol.
//!
//! Three transport-agnostic request/response operations:
//! - `uploadChunk`: one chunk's bytes plus placement metadata
//! - `completeUpload`: assemble all chunks into the destination file
//! - `getStatus`: which chunks the server already holds
//!
//! Payloads are camelCase JSON; chunk bytes are base64-encoded strings
//! so they survive any text transport unchanged.

pub mod messages;

pub use messages::{
    CompleteUploadRequest, CompleteUploadResponse, ErrorResponse, UploadChunkRequest,
    UploadChunkResponse, UploadStatusRequest, UploadStatusResponse,
};

/// Default chunk size: 1 MiB.
///
/// Fixed by convention between client and server; every chunk except
/// possibly the last carries exactly this many bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
