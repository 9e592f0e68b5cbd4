//! Zstd codec for blockzip.
//!
//! Uses the bulk API of the zstd crate: each block is a standalone zstd
//! frame, so any block can be decompressed without its neighbours.

use crate::compression::core::Codec;
use crate::constants::DEFAULT_COMPRESSION_LEVEL;
use crate::error::{BlockzipError, Result};

/// Zstd codec with a fixed compression level.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    /// Compression level (1-22, higher = better compression but slower)
    level: i32,
}

impl ZstdCodec {
    /// Create a new ZstdCodec with the specified compression level.
    ///
    /// # Arguments
    /// * `level` - Compression level (1-22). Higher values provide better compression but are slower.
    pub fn with_level(level: i32) -> Result<Self> {
        if !(1..=22).contains(&level) {
            return Err(BlockzipError::Other(format!(
                "Invalid zstd compression level: {}. Must be between 1 and 22.",
                level
            )));
        }

        Ok(Self { level })
    }

    /// The configured compression level.
    pub fn level(&self) -> i32 {
        self.level
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl Codec for ZstdCodec {
    fn compress_bound(&self, len: usize) -> usize {
        zstd::zstd_safe::compress_bound(len)
    }

    fn compress(&self, src: &[u8]) -> Result<Vec<u8>> {
        // Size the output to the worst case, then shrink to what was produced.
        let bound = self.compress_bound(src.len());
        let mut out = Vec::new();
        out.try_reserve_exact(bound).map_err(|e| {
            BlockzipError::ResourceExhausted(format!(
                "Cannot allocate {} bytes for compression: {}",
                bound, e
            ))
        })?;
        out.resize(bound, 0);

        let written = zstd::bulk::compress_to_buffer(src, &mut out[..], self.level)
            .map_err(|e| BlockzipError::Compression(format!("Zstd compression failed: {}", e)))?;
        out.truncate(written);
        out.shrink_to_fit();
        Ok(out)
    }

    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.try_reserve_exact(expected_len).map_err(|e| {
            BlockzipError::ResourceExhausted(format!(
                "Cannot allocate {} bytes for decompression: {}",
                expected_len, e
            ))
        })?;
        out.resize(expected_len, 0);

        let actual = zstd::bulk::decompress_to_buffer(src, &mut out[..]).map_err(|e| {
            BlockzipError::Decompression(format!("Zstd decompression failed: {}", e))
        })?;
        if actual != expected_len {
            return Err(BlockzipError::Decompression(format!(
                "Zstd decompression size mismatch: expected {}, got {}",
                expected_len, actual
            )));
        }

        Ok(out)
    }
}
