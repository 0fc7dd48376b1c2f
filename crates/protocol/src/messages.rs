use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Sends one chunk of a file.
///
/// Chunk numbers are 1-based and contiguous `1..=total_chunks`.
/// The `file_part` field is base64-encoded in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkRequest {
    #[serde(with = "base64_bytes")]
    pub file_part: Vec<u8>,
    pub file_name: String,
    pub chunk_number: u32,
    pub total_chunks: u32,
}

/// Finalizes an upload: assemble chunks `1..=total_chunks` into the
/// destination file and drop server-side tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub file_name: String,
    pub total_chunks: u32,
}

/// Asks which chunks the server already holds for a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusRequest {
    pub file_name: String,
    pub total_chunks: u32,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Acknowledges a durably persisted chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkResponse {
    pub message: String,
    pub chunk_number: u32,
}

/// Confirms upload completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadResponse {
    pub message: String,
    pub file_name: String,
}

/// Per-chunk receipt bitmap: index `i` is `true` iff chunk `i + 1`
/// is durable on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusResponse {
    pub uploaded_chunks: Vec<bool>,
}

/// Error arm of any operation: a human-readable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub message: String,
}

/// Serde adapter: `Vec<u8>` <-> base64 string in JSON.
mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
