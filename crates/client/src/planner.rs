//! Pure chunk layout math: how many chunks a file needs and which byte
//! range each 1-based chunk number covers.

use std::ops::Range;

/// Number of chunks needed for `file_size` bytes at `chunk_size` bytes
/// per chunk (ceil division). An empty file needs zero chunks.
///
/// `chunk_size` must be non-zero.
pub fn total_chunks(file_size: u64, chunk_size: u64) -> u32 {
    (file_size.div_ceil(chunk_size)) as u32
}

/// Byte range `[start, end)` covered by `chunk_number` (1-based).
///
/// Every chunk except possibly the last spans exactly `chunk_size` bytes;
/// the last is clipped to `file_size`.
pub fn chunk_range(chunk_number: u32, chunk_size: u64, file_size: u64) -> Range<u64> {
    let start = (chunk_number as u64 - 1) * chunk_size;
    let end = (start + chunk_size).min(file_size);
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_needs_no_chunks() {
        assert_eq!(total_chunks(0, 1024), 0);
    }

    #[test]
    fn exact_multiple_has_no_tail_chunk() {
        assert_eq!(total_chunks(4096, 1024), 4);
        assert_eq!(chunk_range(4, 1024, 4096), 3072..4096);
    }

    #[test]
    fn remainder_adds_one_chunk() {
        assert_eq!(total_chunks(4097, 1024), 5);
        assert_eq!(chunk_range(5, 1024, 4097), 4096..4097);
    }

    #[test]
    fn single_byte_file() {
        assert_eq!(total_chunks(1, 1024), 1);
        assert_eq!(chunk_range(1, 1024, 1), 0..1);
    }

    #[test]
    fn default_chunk_size_with_short_tail() {
        // 2,500,000 bytes at 1 MiB per chunk.
        let file_size = 2_500_000;
        let chunk_size = 1_048_576;
        assert_eq!(total_chunks(file_size, chunk_size), 3);
        assert_eq!(chunk_range(1, chunk_size, file_size), 0..1_048_576);
        assert_eq!(chunk_range(2, chunk_size, file_size), 1_048_576..2_097_152);
        assert_eq!(chunk_range(3, chunk_size, file_size), 2_097_152..2_500_000);
    }

    #[test]
    fn ranges_partition_the_file() {
        for (file_size, chunk_size) in [
            (0u64, 7u64),
            (1, 7),
            (6, 7),
            (7, 7),
            (8, 7),
            (2_500_000, 1_048_576),
            (1_000_003, 4096),
        ] {
            let total = total_chunks(file_size, chunk_size);
            let mut covered = 0u64;
            let mut expected_start = 0u64;
            for n in 1..=total {
                let range = chunk_range(n, chunk_size, file_size);
                assert_eq!(range.start, expected_start);
                assert!(range.end > range.start);
                covered += range.end - range.start;
                expected_start = range.end;
            }
            assert_eq!(covered, file_size);
        }
    }
}
