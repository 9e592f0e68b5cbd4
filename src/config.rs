//! Configuration for a Blockzip session.

use crate::compression::ZstdCodec;
use crate::constants::{
    DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_MAX_BLOCKS, DEFAULT_CACHE_MEMORY_LIMIT,
    DEFAULT_COMPRESSION_LEVEL, DEFAULT_WORKER_THREADS,
};
use crate::error::{BlockzipError, Result};

/// Configuration options for a [`crate::Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of decompression workers. With one worker, decompression runs
    /// on the caller's thread and no pool is started. Also bounds read-ahead.
    pub worker_threads: usize,

    /// Nominal block capacity for newly created write streams.
    pub block_size: usize,

    /// Reader cache size budget in decompressed bytes.
    ///
    /// `None` selects 8 MiB, grown by one block per worker when more than one
    /// worker is configured, so every in-flight block has room.
    pub cache_memory_limit: Option<usize>,

    /// Maximum number of blocks resident in the reader cache.
    pub cache_max_blocks: usize,

    /// Zstd compression level (1-22).
    pub compression_level: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            block_size: DEFAULT_BLOCK_SIZE,
            cache_memory_limit: None,
            cache_max_blocks: DEFAULT_CACHE_MAX_BLOCKS,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl SessionConfig {
    /// Sets the number of decompression workers (at least one).
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads.max(1);
        self
    }

    /// Sets the block size used by new write streams.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets an explicit reader cache size budget.
    pub fn with_cache_memory_limit(mut self, bytes: usize) -> Self {
        self.cache_memory_limit = Some(bytes);
        self
    }

    /// Sets the reader cache count budget (at least one block).
    pub fn with_cache_max_blocks(mut self, max_blocks: usize) -> Self {
        self.cache_max_blocks = max_blocks.max(1);
        self
    }

    /// Sets the zstd compression level.
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// The reader cache size budget after applying the worker scaling.
    pub fn effective_cache_memory_limit(&self) -> usize {
        match self.cache_memory_limit {
            Some(limit) => limit,
            None if self.worker_threads > 1 => DEFAULT_CACHE_MEMORY_LIMIT
                .saturating_add(self.worker_threads.saturating_mul(self.block_size)),
            None => DEFAULT_CACHE_MEMORY_LIMIT,
        }
    }

    /// Checks that the configuration can be used to open a session.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size > u32::MAX as usize {
            return Err(BlockzipError::Other(format!(
                "Block size ({}) must be between 1 and {} bytes",
                self.block_size,
                u32::MAX
            )));
        }
        if self.worker_threads == 0 {
            return Err(BlockzipError::Other(
                "At least one worker thread is required".to_string(),
            ));
        }
        if self.cache_max_blocks == 0 {
            return Err(BlockzipError::Other(
                "The reader cache must hold at least one block".to_string(),
            ));
        }
        ZstdCodec::with_level(self.compression_level)?;
        Ok(())
    }
}
