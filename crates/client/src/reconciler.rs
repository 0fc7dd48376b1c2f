use tracing::{debug, warn};

use chunklift_protocol::UploadStatusRequest;

use crate::transport::UploadTransport;

/// Result of reconciling with the server before a (re)start.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// The server's receipt bitmap, or all-false when the query failed.
    pub uploaded: Vec<bool>,
    /// 1-based position of the highest `true` entry (0 when none), only
    /// known when the query succeeded. If the bitmap has gaps this
    /// overcounts and later chunks can be skipped incorrectly; that
    /// limitation is inherited, not corrected here.
    pub last_uploaded_chunk: Option<u32>,
    /// `true` when the status query failed and the transfer is falling
    /// back to re-sending everything.
    pub degraded: bool,
}

/// Fetches the server's bitmap so already-durable chunks can be skipped.
///
/// Fails open: on any transport failure the caller gets an all-false
/// bitmap instead of a hard error. Resuming then re-sends everything,
/// which is safe but wasteful.
pub async fn reconcile(
    transport: &dyn UploadTransport,
    file_name: &str,
    total_chunks: u32,
) -> Reconciled {
    let req = UploadStatusRequest {
        file_name: file_name.to_string(),
        total_chunks,
    };
    match transport.status(req).await {
        Ok(resp) => {
            let uploaded = resp.uploaded_chunks;
            if uploaded.len() != total_chunks as usize {
                warn!(
                    file = %file_name,
                    stored = uploaded.len(),
                    expected = total_chunks,
                    "server bitmap length differs from chunk plan"
                );
            }
            let last = uploaded
                .iter()
                .rposition(|&done| done)
                .map(|i| i as u32 + 1)
                .unwrap_or(0);
            debug!(file = %file_name, last_uploaded = last, "reconciled with server");
            Reconciled {
                uploaded,
                last_uploaded_chunk: Some(last),
                degraded: false,
            }
        }
        Err(e) => {
            warn!(file = %file_name, error = %e, "status query failed, re-sending all chunks");
            Reconciled {
                uploaded: vec![false; total_chunks as usize],
                last_uploaded_chunk: None,
                degraded: true,
            }
        }
    }
}
