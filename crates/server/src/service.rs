use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use chunklift_protocol::{
    CompleteUploadRequest, CompleteUploadResponse, UploadChunkRequest, UploadChunkResponse,
    UploadStatusRequest, UploadStatusResponse,
};

use crate::ServerError;
use crate::store::{ChunkTracker, MarkOutcome};
use crate::validation::validate_file_name;

/// Upload service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding chunk files and assembled destination files.
    pub storage_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("uploads"),
        }
    }
}

/// Implements the three upload operations over a storage directory and
/// an in-memory [`ChunkTracker`].
///
/// Safe to share across concurrent requests: tracker updates are
/// synchronized and chunk writes for distinct chunk numbers touch
/// distinct files.
pub struct UploadService {
    storage_dir: PathBuf,
    tracker: ChunkTracker,
}

impl UploadService {
    /// Creates the service, creating the storage directory if missing.
    pub fn new(config: ServiceConfig) -> Result<Self, ServerError> {
        std::fs::create_dir_all(&config.storage_dir)?;
        Ok(Self {
            storage_dir: config.storage_dir,
            tracker: ChunkTracker::new(),
        })
    }

    /// Receives one chunk: persists its bytes, then records it in the
    /// file's bitmap.
    ///
    /// The bitmap is only touched after the write succeeds, so a chunk is
    /// either fully durable and tracked or absent entirely. A chunk racing
    /// a finalize for the same file is rejected and its bytes removed.
    pub async fn upload_chunk(
        &self,
        req: &UploadChunkRequest,
    ) -> Result<UploadChunkResponse, ServerError> {
        if req.file_part.is_empty() {
            return Err(ServerError::Validation("no chunk data in request".into()));
        }
        validate_file_name(&req.file_name)?;
        if req.chunk_number == 0 || req.chunk_number > req.total_chunks {
            return Err(ServerError::Validation(format!(
                "chunk number {} out of range 1..={}",
                req.chunk_number, req.total_chunks
            )));
        }

        self.tracker.get_or_create(&req.file_name, req.total_chunks);

        let path = self.chunk_path(&req.file_name, req.chunk_number);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &req.file_part).await?;

        // The mark after the write is the one finalize check: a finalize
        // that started (or finished and removed the entry) while the write
        // was in flight would never see this chunk, so the orphaned bytes
        // are removed and the request rejected instead of claiming success.
        match self.tracker.try_mark_uploaded(&req.file_name, req.chunk_number) {
            MarkOutcome::Marked => {}
            MarkOutcome::OutOfRange => {
                // The entry was created with a different total than this
                // request carries. The chunk bytes are on disk but outside
                // the tracked bitmap.
                warn!(
                    file = %req.file_name,
                    chunk = req.chunk_number,
                    total = req.total_chunks,
                    "chunk falls outside the tracked bitmap"
                );
            }
            MarkOutcome::Finalizing => {
                warn!(
                    file = %req.file_name,
                    chunk = req.chunk_number,
                    "chunk arrived during finalize, discarding"
                );
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    // NotFound means the assembly consumed it already.
                    if e.kind() != std::io::ErrorKind::NotFound {
                        return Err(e.into());
                    }
                }
                return Err(ServerError::Validation(format!(
                    "finalize in progress for {}",
                    req.file_name
                )));
            }
        }

        debug!(
            file = %req.file_name,
            chunk = req.chunk_number,
            bytes = req.file_part.len(),
            "chunk persisted"
        );

        Ok(UploadChunkResponse {
            message: "Chunk uploaded successfully.".into(),
            chunk_number: req.chunk_number,
        })
    }

    /// Reports the receipt bitmap for a file.
    ///
    /// Untracked files get a fresh all-false bitmap of the requested
    /// length. A tracked bitmap is returned as-is even when its length
    /// differs from the requested total; callers must treat the mismatch
    /// as suspicious.
    pub fn status(&self, req: &UploadStatusRequest) -> UploadStatusResponse {
        let uploaded_chunks = match self.tracker.bitmap(&req.file_name) {
            Some(bitmap) => {
                if bitmap.len() != req.total_chunks as usize {
                    warn!(
                        file = %req.file_name,
                        stored = bitmap.len(),
                        requested = req.total_chunks,
                        "status request total disagrees with tracked bitmap length"
                    );
                }
                bitmap
            }
            None => vec![false; req.total_chunks as usize],
        };
        UploadStatusResponse { uploaded_chunks }
    }

    /// Assembles chunks `1..=total_chunks` into the destination file, in
    /// strict ascending order, deleting each chunk as it is consumed,
    /// then drops the tracking entry.
    ///
    /// A missing chunk is skipped with a warning rather than failing,
    /// which can leave a truncated destination. No rollback is performed
    /// on I/O failure.
    pub async fn complete(
        &self,
        req: &CompleteUploadRequest,
    ) -> Result<CompleteUploadResponse, ServerError> {
        validate_file_name(&req.file_name)?;

        self.tracker.begin_finalize(&req.file_name);

        match self.assemble(&req.file_name, req.total_chunks).await {
            Ok(()) => {
                self.tracker.remove(&req.file_name);
                info!(file = %req.file_name, total = req.total_chunks, "upload finalized");
                Ok(CompleteUploadResponse {
                    message: "File upload completed successfully.".into(),
                    file_name: req.file_name.clone(),
                })
            }
            Err(e) => {
                self.tracker.abort_finalize(&req.file_name);
                Err(e)
            }
        }
    }

    async fn assemble(&self, file_name: &str, total_chunks: u32) -> Result<(), ServerError> {
        let dest_path = self.final_path(file_name);
        let mut dest = tokio::fs::File::create(&dest_path).await?;

        for chunk_number in 1..=total_chunks {
            let chunk_path = self.chunk_path(file_name, chunk_number);
            let bytes = match tokio::fs::read(&chunk_path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(
                        file = %file_name,
                        chunk = chunk_number,
                        "chunk missing during finalize, skipping"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            dest.write_all(&bytes).await?;
            tokio::fs::remove_file(&chunk_path).await?;
        }

        dest.flush().await?;
        Ok(())
    }

    /// Shared tracker, exposed for status introspection.
    pub fn tracker(&self) -> &ChunkTracker {
        &self.tracker
    }

    /// Destination path for an assembled file.
    pub fn final_path(&self, file_name: &str) -> PathBuf {
        self.storage_dir.join(file_name)
    }

    fn chunk_path(&self, file_name: &str, chunk_number: u32) -> PathBuf {
        self.storage_dir
            .join(format!("{file_name}.part{chunk_number}"))
    }

    /// Storage directory root.
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> UploadService {
        UploadService::new(ServiceConfig {
            storage_dir: dir.path().to_path_buf(),
        })
        .unwrap()
    }

    fn chunk_req(file_name: &str, chunk_number: u32, total: u32, data: &[u8]) -> UploadChunkRequest {
        UploadChunkRequest {
            file_part: data.to_vec(),
            file_name: file_name.into(),
            chunk_number,
            total_chunks: total,
        }
    }

    #[tokio::test]
    async fn rejects_empty_payload() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let result = svc.upload_chunk(&chunk_req("a.bin", 1, 2, b"")).await;
        assert!(matches!(result, Err(ServerError::Validation(_))));
        // Bitmap untouched: the file is not even tracked.
        assert!(svc.tracker().bitmap("a.bin").is_none());
    }

    #[tokio::test]
    async fn rejects_out_of_range_chunk_number() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let result = svc.upload_chunk(&chunk_req("a.bin", 3, 2, b"x")).await;
        assert!(matches!(result, Err(ServerError::Validation(_))));

        let result = svc.upload_chunk(&chunk_req("a.bin", 0, 2, b"x")).await;
        assert!(matches!(result, Err(ServerError::Validation(_))));
    }

    #[tokio::test]
    async fn rejects_traversal_file_name() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let result = svc
            .upload_chunk(&chunk_req("../escape.bin", 1, 1, b"x"))
            .await;
        assert!(matches!(result, Err(ServerError::Validation(_))));
    }

    #[tokio::test]
    async fn upload_marks_bitmap_after_write() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let resp = svc
            .upload_chunk(&chunk_req("a.bin", 2, 3, b"chunk two"))
            .await
            .unwrap();
        assert_eq!(resp.chunk_number, 2);

        let on_disk = std::fs::read(dir.path().join("a.bin.part2")).unwrap();
        assert_eq!(on_disk, b"chunk two");

        let status = svc.status(&UploadStatusRequest {
            file_name: "a.bin".into(),
            total_chunks: 3,
        });
        assert_eq!(status.uploaded_chunks, vec![false, true, false]);
    }

    #[tokio::test]
    async fn reupload_overwrites_chunk() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        svc.upload_chunk(&chunk_req("a.bin", 1, 1, b"first"))
            .await
            .unwrap();
        svc.upload_chunk(&chunk_req("a.bin", 1, 1, b"second"))
            .await
            .unwrap();

        let on_disk = std::fs::read(dir.path().join("a.bin.part1")).unwrap();
        assert_eq!(on_disk, b"second");
    }

    #[tokio::test]
    async fn status_for_unknown_file_is_all_false() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let status = svc.status(&UploadStatusRequest {
            file_name: "never-seen.bin".into(),
            total_chunks: 4,
        });
        assert_eq!(status.uploaded_chunks, vec![false; 4]);
    }

    #[tokio::test]
    async fn status_returns_stored_bitmap_on_length_mismatch() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        svc.upload_chunk(&chunk_req("a.bin", 1, 3, b"x"))
            .await
            .unwrap();

        // Requesting with a different total returns the stored bitmap as-is.
        let status = svc.status(&UploadStatusRequest {
            file_name: "a.bin".into(),
            total_chunks: 5,
        });
        assert_eq!(status.uploaded_chunks.len(), 3);
    }

    #[tokio::test]
    async fn complete_assembles_in_order_and_clears_state() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        // Upload out of order; assembly must still be ascending.
        svc.upload_chunk(&chunk_req("a.bin", 3, 3, b"CC"))
            .await
            .unwrap();
        svc.upload_chunk(&chunk_req("a.bin", 1, 3, b"AA"))
            .await
            .unwrap();
        svc.upload_chunk(&chunk_req("a.bin", 2, 3, b"BB"))
            .await
            .unwrap();

        let resp = svc
            .complete(&CompleteUploadRequest {
                file_name: "a.bin".into(),
                total_chunks: 3,
            })
            .await
            .unwrap();
        assert_eq!(resp.file_name, "a.bin");

        let assembled = std::fs::read(dir.path().join("a.bin")).unwrap();
        assert_eq!(assembled, b"AABBCC");

        // Chunk files consumed.
        for n in 1..=3 {
            assert!(!dir.path().join(format!("a.bin.part{n}")).exists());
        }

        // Tracking cleared: status is all-false again.
        let status = svc.status(&UploadStatusRequest {
            file_name: "a.bin".into(),
            total_chunks: 3,
        });
        assert_eq!(status.uploaded_chunks, vec![false; 3]);
    }

    #[tokio::test]
    async fn complete_skips_missing_chunk() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        svc.upload_chunk(&chunk_req("a.bin", 1, 3, b"AA"))
            .await
            .unwrap();
        svc.upload_chunk(&chunk_req("a.bin", 3, 3, b"CC"))
            .await
            .unwrap();

        // Chunk 2 never arrived; finalize still succeeds with a shorter file.
        svc.complete(&CompleteUploadRequest {
            file_name: "a.bin".into(),
            total_chunks: 3,
        })
        .await
        .unwrap();

        let assembled = std::fs::read(dir.path().join("a.bin")).unwrap();
        assert_eq!(assembled, b"AACC");
    }

    #[tokio::test]
    async fn complete_with_zero_chunks_writes_empty_file() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        svc.complete(&CompleteUploadRequest {
            file_name: "empty.bin".into(),
            total_chunks: 0,
        })
        .await
        .unwrap();

        let assembled = std::fs::read(dir.path().join("empty.bin")).unwrap();
        assert!(assembled.is_empty());
    }

    #[tokio::test]
    async fn upload_rejected_while_finalizing() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        svc.upload_chunk(&chunk_req("a.bin", 1, 2, b"AA"))
            .await
            .unwrap();
        svc.tracker().begin_finalize("a.bin");

        let result = svc.upload_chunk(&chunk_req("a.bin", 2, 2, b"BB")).await;
        assert!(matches!(result, Err(ServerError::Validation(_))));
        // The rejected chunk leaves neither bytes nor a bitmap entry.
        assert!(!dir.path().join("a.bin.part2").exists());
        assert_eq!(
            svc.tracker().bitmap("a.bin").unwrap(),
            vec![true, false]
        );

        // A failed finalize clears the flag and uploads work again.
        svc.tracker().abort_finalize("a.bin");
        svc.upload_chunk(&chunk_req("a.bin", 2, 2, b"BB"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn finalize_consuming_the_entry_refuses_a_late_mark() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        svc.upload_chunk(&chunk_req("a.bin", 1, 2, b"AA"))
            .await
            .unwrap();

        // A finalize runs while a chunk write is still in flight: the
        // entry is gone by the time that write tries to mark itself.
        svc.complete(&CompleteUploadRequest {
            file_name: "a.bin".into(),
            total_chunks: 2,
        })
        .await
        .unwrap();

        assert_eq!(
            svc.tracker().try_mark_uploaded("a.bin", 2),
            MarkOutcome::Finalizing
        );
    }

    #[tokio::test]
    async fn upload_after_successful_finalize_starts_a_new_session() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        svc.upload_chunk(&chunk_req("a.bin", 1, 1, b"AA"))
            .await
            .unwrap();
        svc.complete(&CompleteUploadRequest {
            file_name: "a.bin".into(),
            total_chunks: 1,
        })
        .await
        .unwrap();

        // Same name again is a fresh upload, not a finalize rejection.
        svc.upload_chunk(&chunk_req("a.bin", 1, 1, b"BB"))
            .await
            .unwrap();
        assert_eq!(svc.tracker().bitmap("a.bin").unwrap(), vec![true]);
    }
}
