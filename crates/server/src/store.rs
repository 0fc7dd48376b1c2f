use std::collections::HashMap;
use std::sync::RwLock;

/// Tracking state for one in-flight file upload.
#[derive(Debug)]
struct Entry {
    /// Index `i` is `true` iff chunk `i + 1` has been durably written.
    /// Length is fixed at creation.
    uploaded: Vec<bool>,
    /// Set while a finalize for this file is running; chunk uploads are
    /// rejected during that window instead of racing the assembly.
    finalizing: bool,
}

/// Outcome of [`ChunkTracker::try_mark_uploaded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// Chunk recorded in the bitmap.
    Marked,
    /// Entry exists but the number falls outside its bitmap.
    OutOfRange,
    /// A finalize holds the entry, or already consumed it (the entry is
    /// gone). The chunk must not be reported as durable.
    Finalizing,
}

/// Process-wide chunk receipt tracker, keyed by file name (thread-safe).
///
/// Entries are created lazily on the first chunk for a file name and
/// removed when finalize succeeds. Nothing is persisted: a restart
/// forgets all tracking (chunk files on disk survive but are invisible
/// to `bitmap`).
#[derive(Debug, Default)]
pub struct ChunkTracker {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ChunkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures an entry exists for `file_name`, creating an all-false
    /// bitmap of `total_chunks` on first arrival.
    ///
    /// Atomic: concurrent first arrivals for the same name produce a
    /// single entry. An existing entry's bitmap length is never changed,
    /// even when `total_chunks` disagrees with it.
    pub fn get_or_create(&self, file_name: &str, total_chunks: u32) {
        let mut entries = self.entries.write().unwrap();
        entries
            .entry(file_name.to_string())
            .or_insert_with(|| Entry {
                uploaded: vec![false; total_chunks as usize],
                finalizing: false,
            });
    }

    /// Marks chunk `chunk_number` (1-based) as durably received.
    ///
    /// The finalize check and the bitmap update happen under one write
    /// lock, so a mark can never slip past a finalize that has already
    /// claimed (or removed) the entry. [`MarkOutcome::OutOfRange`] means
    /// the request carried a different `total_chunks` than the one the
    /// entry was created with.
    pub fn try_mark_uploaded(&self, file_name: &str, chunk_number: u32) -> MarkOutcome {
        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(file_name) {
            Some(entry) if entry.finalizing => MarkOutcome::Finalizing,
            Some(entry) => {
                let idx = chunk_number as usize - 1;
                if idx < entry.uploaded.len() {
                    entry.uploaded[idx] = true;
                    MarkOutcome::Marked
                } else {
                    MarkOutcome::OutOfRange
                }
            }
            None => MarkOutcome::Finalizing,
        }
    }

    /// Returns a copy of the tracked bitmap, or `None` if untracked.
    pub fn bitmap(&self, file_name: &str) -> Option<Vec<bool>> {
        let entries = self.entries.read().unwrap();
        entries.get(file_name).map(|e| e.uploaded.clone())
    }

    /// Marks the entry as finalizing so concurrent chunk uploads for the
    /// same file are rejected. No-op if the file is untracked.
    pub fn begin_finalize(&self, file_name: &str) {
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get_mut(file_name) {
            entry.finalizing = true;
        }
    }

    /// Clears the finalizing flag after a failed finalize so the caller
    /// can retry.
    pub fn abort_finalize(&self, file_name: &str) {
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get_mut(file_name) {
            entry.finalizing = false;
        }
    }

    /// Returns `true` if a finalize is currently running for `file_name`.
    pub fn is_finalizing(&self, file_name: &str) -> bool {
        let entries = self.entries.read().unwrap();
        entries.get(file_name).is_some_and(|e| e.finalizing)
    }

    /// Drops all tracking for `file_name`.
    pub fn remove(&self, file_name: &str) {
        let mut entries = self.entries.write().unwrap();
        entries.remove(file_name);
    }
}
