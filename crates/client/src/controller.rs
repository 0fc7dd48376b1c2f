use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chunklift_protocol::{CompleteUploadRequest, DEFAULT_CHUNK_SIZE, UploadChunkRequest};

use crate::TransferError;
use crate::planner::total_chunks;
use crate::reconciler::reconcile;
use crate::source::ChunkSource;
use crate::transport::UploadTransport;

/// Lifecycle of a file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Idle,
    Uploading,
    Paused,
    Completed,
    Error,
}

struct Inner {
    status: TransferStatus,
    progress_percent: f64,
    /// Index `i` is `true` iff chunk `i + 1` is known durable.
    chunk_done: Vec<bool>,
    /// 1-based number of the highest chunk confirmed in this session.
    last_uploaded_chunk: u32,
    error: String,
}

/// Drives one file's upload: sequencing, skip-on-resume, pause, cancel.
///
/// At most one chunk send is in flight at any time; the upload loop is
/// the only writer of the progress fields. `pause` and `cancel` act
/// through a per-attempt cancellation token observed by the in-flight
/// send, so a send is either fully confirmed or not applied at all.
pub struct TransferController {
    transport: Arc<dyn UploadTransport>,
    path: PathBuf,
    file_name: String,
    chunk_size: u64,
    total_chunks: u32,
    inner: RwLock<Inner>,
    attempt: Mutex<Option<CancellationToken>>,
}

impl TransferController {
    /// Creates a controller for `path` with the default 1 MiB chunk size.
    pub fn new(transport: Arc<dyn UploadTransport>, path: &Path) -> Result<Self, TransferError> {
        Self::with_chunk_size(transport, path, DEFAULT_CHUNK_SIZE as u64)
    }

    /// Creates a controller with an explicit chunk size (non-zero).
    pub fn with_chunk_size(
        transport: Arc<dyn UploadTransport>,
        path: &Path,
        chunk_size: u64,
    ) -> Result<Self, TransferError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::InvalidState(format!("not a file: {}", path.display())))?;
        let file_size = std::fs::metadata(path)?.len();
        let total = total_chunks(file_size, chunk_size);

        Ok(Self {
            transport,
            path: path.to_path_buf(),
            file_name,
            chunk_size,
            total_chunks: total,
            inner: RwLock::new(Inner {
                status: TransferStatus::Idle,
                progress_percent: 0.0,
                chunk_done: vec![false; total as usize],
                last_uploaded_chunk: 0,
                error: String::new(),
            }),
            attempt: Mutex::new(None),
        })
    }

    /// Starts or restarts the upload loop.
    ///
    /// Valid from Idle or Paused. Reconciles with the server, then sends
    /// every chunk past `last_uploaded_chunk` that the server does not
    /// already hold, one at a time. Returns `Ok(())` both on completion
    /// and when interrupted by pause or cancel; any other failure puts
    /// the controller in Error state and propagates.
    pub async fn start(&self) -> Result<(), TransferError> {
        {
            let mut s = self.inner.write().unwrap();
            match s.status {
                TransferStatus::Idle | TransferStatus::Paused => {
                    s.status = TransferStatus::Uploading;
                    s.error.clear();
                }
                other => {
                    return Err(TransferError::InvalidState(format!(
                        "cannot start from {other:?}"
                    )));
                }
            }
        }

        let cancel = CancellationToken::new();
        *self.attempt.lock().unwrap() = Some(cancel.clone());

        info!(file = %self.file_name, chunks = self.total_chunks, "transfer started");
        self.run(cancel).await
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), TransferError> {
        let reconciled = reconcile(
            self.transport.as_ref(),
            &self.file_name,
            self.total_chunks,
        )
        .await;

        let resume_from = {
            let mut s = self.inner.write().unwrap();
            if let Some(last) = reconciled.last_uploaded_chunk {
                s.chunk_done = reconciled.uploaded.clone();
                s.chunk_done.resize(self.total_chunks as usize, false);
                s.last_uploaded_chunk = last;
            }
            s.last_uploaded_chunk
        };

        let mut source = match ChunkSource::open(&self.path, self.chunk_size) {
            Ok(source) => source,
            Err(e) => {
                self.fail("Error reading file");
                return Err(e);
            }
        };

        for chunk_number in (resume_from + 1)..=self.total_chunks {
            if cancel.is_cancelled() {
                debug!(file = %self.file_name, chunk = chunk_number, "loop stopped by pause or cancel");
                return Ok(());
            }

            // A missing index reads as not-uploaded when the server's
            // bitmap is shorter than the plan.
            let already_done = reconciled
                .uploaded
                .get(chunk_number as usize - 1)
                .copied()
                .unwrap_or(false);
            if already_done {
                let mut s = self.inner.write().unwrap();
                if s.status == TransferStatus::Uploading {
                    s.progress_percent = chunk_number as f64 / self.total_chunks as f64 * 100.0;
                }
                debug!(file = %self.file_name, chunk = chunk_number, "chunk already durable, skipping");
                continue;
            }

            let file_part = match source.read_chunk(chunk_number) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.fail("Error reading file");
                    return Err(e);
                }
            };

            let req = UploadChunkRequest {
                file_part,
                file_name: self.file_name.clone(),
                chunk_number,
                total_chunks: self.total_chunks,
            };

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(file = %self.file_name, chunk = chunk_number, "in-flight send aborted");
                    return Ok(());
                }
                result = self.transport.upload_chunk(req) => result,
            };

            match sent {
                Ok(resp) => {
                    self.record_confirmed(chunk_number);
                    debug!(file = %self.file_name, chunk = resp.chunk_number, "chunk confirmed");
                }
                Err(e) => {
                    warn!(file = %self.file_name, chunk = chunk_number, error = %e, "chunk send failed");
                    self.fail("Error uploading chunk");
                    return Err(TransferError::Transport(e.to_string()));
                }
            }
        }

        if cancel.is_cancelled() {
            return Ok(());
        }

        let req = CompleteUploadRequest {
            file_name: self.file_name.clone(),
            total_chunks: self.total_chunks,
        };
        match self.transport.complete(req).await {
            Ok(_) => {
                let mut s = self.inner.write().unwrap();
                if s.status == TransferStatus::Uploading {
                    s.status = TransferStatus::Completed;
                    s.progress_percent = 100.0;
                }
                info!(file = %self.file_name, "transfer completed");
                Ok(())
            }
            Err(e) => {
                warn!(file = %self.file_name, error = %e, "finalize failed");
                self.fail("Error completing upload");
                Err(TransferError::Transport(e.to_string()))
            }
        }
    }

    /// Pauses the transfer: aborts the one in-flight send and keeps all
    /// confirmed progress. Valid only while Uploading.
    pub fn pause(&self) -> Result<(), TransferError> {
        {
            let mut s = self.inner.write().unwrap();
            if s.status != TransferStatus::Uploading {
                return Err(TransferError::InvalidState(format!(
                    "cannot pause from {:?}",
                    s.status
                )));
            }
            s.status = TransferStatus::Paused;
        }
        if let Some(token) = self.attempt.lock().unwrap().take() {
            token.cancel();
        }
        info!(file = %self.file_name, "transfer paused");
        Ok(())
    }

    /// Resumes a paused transfer: re-reconciles and continues past
    /// `last_uploaded_chunk`. Valid only from Paused with chunks left.
    pub async fn resume(&self) -> Result<(), TransferError> {
        {
            let s = self.inner.read().unwrap();
            if s.status != TransferStatus::Paused {
                return Err(TransferError::InvalidState(format!(
                    "cannot resume from {:?}",
                    s.status
                )));
            }
            if s.last_uploaded_chunk >= self.total_chunks {
                return Err(TransferError::InvalidState(
                    "no chunks left to resume".into(),
                ));
            }
        }
        info!(file = %self.file_name, "transfer resuming");
        self.start().await
    }

    /// Cancels the transfer: aborts any in-flight send and resets all
    /// local fields to their initial values.
    ///
    /// Server-side partial state is deliberately left intact; a later
    /// fresh `start` reconciles against it and skips durable chunks.
    pub fn cancel(&self) -> Result<(), TransferError> {
        {
            let mut s = self.inner.write().unwrap();
            if s.status == TransferStatus::Idle {
                return Err(TransferError::InvalidState("no transfer to cancel".into()));
            }
            s.status = TransferStatus::Idle;
            s.progress_percent = 0.0;
            s.chunk_done = vec![false; self.total_chunks as usize];
            s.last_uploaded_chunk = 0;
            s.error.clear();
        }
        if let Some(token) = self.attempt.lock().unwrap().take() {
            token.cancel();
        }
        info!(file = %self.file_name, "transfer cancelled");
        Ok(())
    }

    /// Applies a confirmed chunk to the session fields.
    ///
    /// No-op unless the transfer is still Uploading: `pause` and `cancel`
    /// flip the status under the same lock, and a send that resolved in
    /// that window must not dirty the fields they just settled.
    fn record_confirmed(&self, chunk_number: u32) {
        let mut s = self.inner.write().unwrap();
        if s.status != TransferStatus::Uploading {
            debug!(file = %self.file_name, chunk = chunk_number, "late confirmation dropped");
            return;
        }
        s.chunk_done[chunk_number as usize - 1] = true;
        s.last_uploaded_chunk = chunk_number;
        s.progress_percent = chunk_number as f64 / self.total_chunks as f64 * 100.0;
    }

    fn fail(&self, message: &str) {
        let mut s = self.inner.write().unwrap();
        if s.status != TransferStatus::Uploading {
            return;
        }
        s.status = TransferStatus::Error;
        s.error = message.to_string();
    }

    /// Current lifecycle state.
    pub fn status(&self) -> TransferStatus {
        self.inner.read().unwrap().status
    }

    /// Percentage of chunks processed, 0.0 to 100.0.
    pub fn progress_percent(&self) -> f64 {
        self.inner.read().unwrap().progress_percent
    }

    /// 1-based number of the highest chunk confirmed in this session.
    pub fn last_uploaded_chunk(&self) -> u32 {
        self.inner.read().unwrap().last_uploaded_chunk
    }

    /// Copy of the per-chunk done flags.
    pub fn chunk_flags(&self) -> Vec<bool> {
        self.inner.read().unwrap().chunk_done.clone()
    }

    /// Last error message (empty when none).
    pub fn error_message(&self) -> String {
        self.inner.read().unwrap().error.clone()
    }

    /// Number of chunks in the plan.
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// The file name key used with the server.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}
