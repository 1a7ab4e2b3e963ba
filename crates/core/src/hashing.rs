//! SHA-256 helpers used to deduplicate uploads.
//!
//! Large files are hashed in fixed-size chunks. Chunk reads may complete
//! out of order, so [`OrderedChunkHasher`] buffers early chunks until the
//! gap before them is filled and always feeds the digest in offset order.

use std::collections::BTreeMap;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::CoreError;

/// Default chunk size for file hashing (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Incremental SHA-256 over chunks that may arrive in any order.
#[derive(Default)]
pub struct OrderedChunkHasher {
    hasher: Sha256,
    /// Offset of the next byte the digest expects.
    next_offset: u64,
    /// Chunks received ahead of `next_offset`, keyed by their offset.
    pending: BTreeMap<u64, Vec<u8>>,
    reordered: usize,
}

impl OrderedChunkHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the chunk starting at `offset`.
    ///
    /// In-order chunks go straight into the digest, followed by any
    /// buffered chunks they make contiguous. A chunk that overlaps bytes
    /// already hashed or buffered is rejected.
    pub fn accept(&mut self, offset: u64, chunk: Vec<u8>) -> Result<(), CoreError> {
        if offset < self.next_offset || self.pending.contains_key(&offset) {
            return Err(CoreError::Validation(format!(
                "chunk at offset {offset} was already hashed"
            )));
        }

        let end = offset + chunk.len() as u64;
        let before = self.pending.range(..offset).next_back();
        let after = self.pending.range(offset..).next();
        let overlap = before
            .filter(|(start, data)| **start + data.len() as u64 > offset)
            .or(after.filter(|(start, _)| **start < end));
        if let Some((start, data)) = overlap {
            return Err(CoreError::Validation(format!(
                "chunk {offset}..{end} overlaps buffered chunk {start}..{}",
                start + data.len() as u64
            )));
        }

        if offset != self.next_offset {
            self.reordered += 1;
            self.pending.insert(offset, chunk);
            return Ok(());
        }

        self.feed(chunk);
        while let Some(next) = self.pending.remove(&self.next_offset) {
            self.feed(next);
        }
        Ok(())
    }

    /// Number of bytes already folded into the digest.
    pub fn hashed_bytes(&self) -> u64 {
        self.next_offset
    }

    /// How many chunks had to be buffered because they arrived early.
    pub fn reordered_chunks(&self) -> usize {
        self.reordered
    }

    /// Finish the digest. Fails if some chunks are still waiting on a gap.
    pub fn finish(self) -> Result<String, CoreError> {
        if let Some(offset) = self.pending.keys().next() {
            return Err(CoreError::Validation(format!(
                "missing bytes {}..{offset} before buffered chunk",
                self.next_offset
            )));
        }
        Ok(format!("{:x}", self.hasher.finalize()))
    }

    fn feed(&mut self, chunk: Vec<u8>) {
        self.next_offset += chunk.len() as u64;
        self.hasher.update(&chunk);
    }
}

/// Hash a file on disk, reading it `chunk_size` bytes at a time.
pub async fn sha256_file(path: impl AsRef<Path>, chunk_size: usize) -> Result<String, CoreError> {
    if chunk_size == 0 {
        return Err(CoreError::Validation("chunk size must be positive".into()));
    }

    let path = path.as_ref();
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = OrderedChunkHasher::new();
    let mut buf = vec![0u8; chunk_size];

    loop {
        let n = read_full(&mut file, &mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.accept(hasher.hashed_bytes(), buf[..n].to_vec())?;
    }

    tracing::debug!(
        path = %path.display(),
        bytes = hasher.hashed_bytes(),
        "Hashed file",
    );
    hasher.finish()
}

/// Fill `buf` as far as the file allows. Returns the number of bytes read.
async fn read_full(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn empty_input_produces_known_hash() {
        assert_eq!(sha256_hex(b""), EMPTY_SHA256);
    }

    #[test]
    fn consistent_output() {
        let data = b"hello world";
        assert_eq!(sha256_hex(data), sha256_hex(data));
        assert_eq!(sha256_hex(data).len(), 64);
    }

    #[test]
    fn in_order_chunks_match_whole_buffer() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut hasher = OrderedChunkHasher::new();
        for (i, chunk) in data.chunks(1024).enumerate() {
            hasher.accept((i * 1024) as u64, chunk.to_vec()).unwrap();
        }
        assert_eq!(hasher.reordered_chunks(), 0);
        assert_eq!(hasher.finish().unwrap(), sha256_hex(&data));
    }

    #[test]
    fn out_of_order_chunks_match_whole_buffer() {
        let data = b"abcdefghijklmnopqrstuvwxyz".to_vec();
        let mut hasher = OrderedChunkHasher::new();

        hasher.accept(20, data[20..].to_vec()).unwrap();
        hasher.accept(10, data[10..20].to_vec()).unwrap();
        assert_eq!(hasher.hashed_bytes(), 0);

        hasher.accept(0, data[..10].to_vec()).unwrap();
        assert_eq!(hasher.hashed_bytes(), 26);
        assert_eq!(hasher.reordered_chunks(), 2);
        assert_eq!(hasher.finish().unwrap(), sha256_hex(&data));
    }

    #[test]
    fn finish_with_gap_fails() {
        let mut hasher = OrderedChunkHasher::new();
        hasher.accept(4, b"efgh".to_vec()).unwrap();
        assert!(hasher.finish().is_err());
    }

    #[test]
    fn duplicate_chunk_is_rejected() {
        let mut hasher = OrderedChunkHasher::new();
        hasher.accept(0, b"abcd".to_vec()).unwrap();
        assert!(hasher.accept(0, b"abcd".to_vec()).is_err());
    }

    #[test]
    fn chunk_covering_buffered_chunk_is_rejected() {
        let mut hasher = OrderedChunkHasher::new();
        hasher.accept(3, b"defg".to_vec()).unwrap();

        let err = hasher.accept(0, b"abcdefghij".to_vec()).unwrap_err();

        assert!(err.to_string().contains("overlaps buffered chunk 3..7"));
        assert_eq!(hasher.hashed_bytes(), 0);
    }

    #[test]
    fn chunk_starting_inside_buffered_chunk_is_rejected() {
        let mut hasher = OrderedChunkHasher::new();
        hasher.accept(4, b"efgh".to_vec()).unwrap();
        assert!(hasher.accept(6, b"gh".to_vec()).is_err());

        // The buffered chunk is untouched and still completes the digest.
        hasher.accept(0, b"abcd".to_vec()).unwrap();
        assert_eq!(hasher.finish().unwrap(), sha256_hex(b"abcdefgh"));
    }

    #[test]
    fn adjacent_chunks_are_not_overlaps() {
        let mut hasher = OrderedChunkHasher::new();
        hasher.accept(8, b"ij".to_vec()).unwrap();
        hasher.accept(4, b"efgh".to_vec()).unwrap();
        hasher.accept(0, b"abcd".to_vec()).unwrap();
        assert_eq!(hasher.finish().unwrap(), sha256_hex(b"abcdefghij"));
    }

    #[tokio::test]
    async fn file_hash_matches_buffer_hash() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), &data).unwrap();

        let digest = sha256_file(file.path(), 4096).await.unwrap();
        assert_eq!(digest, sha256_hex(&data));
    }

    #[tokio::test]
    async fn empty_file_hashes_to_empty_digest() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let digest = sha256_file(file.path(), DEFAULT_CHUNK_SIZE).await.unwrap();
        assert_eq!(digest, EMPTY_SHA256);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = sha256_file(dir.path().join("nope.bin"), DEFAULT_CHUNK_SIZE).await;
        assert!(matches!(result, Err(CoreError::Io(_))));
    }
}
