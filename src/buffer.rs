// Copyright 2024
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Paired source/compressed byte regions of one block.
//!
//! A [`Buffer`] owns the decompressed bytes (`source`) and the codec output
//! (`compressed`) of a single block, and tracks at most one outstanding
//! asynchronous decompression job.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use log::debug;

use crate::compression::Codec;
use crate::error::{BlockzipError, Result};
use crate::parallel::{DecompressJob, DecompressPool, JobHandle, JobMode};

/// Outcome of [`Buffer::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// All requested bytes were copied.
    Complete(usize),
    /// Only this many bytes fit; the buffer is now full. `Truncated(0)`
    /// means the buffer was already full.
    Truncated(usize),
}

impl WriteStatus {
    /// Number of bytes actually copied.
    pub fn written(&self) -> usize {
        match *self {
            WriteStatus::Complete(n) | WriteStatus::Truncated(n) => n,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, WriteStatus::Truncated(_))
    }
}

/// Source and compressed regions of a block plus its pending job.
pub struct Buffer {
    /// Capacity limit of `source`.
    max_source_len: usize,
    source: Vec<u8>,
    compressed: Bytes,
    /// Outstanding asynchronous decompression, if any.
    pending: Option<JobHandle>,
    codec: Arc<dyn Codec>,
    pool: Option<Arc<DecompressPool>>,
}

impl Buffer {
    /// Creates an empty buffer. Nothing is allocated until the first write.
    pub fn new(
        max_source_len: usize,
        codec: Arc<dyn Codec>,
        pool: Option<Arc<DecompressPool>>,
    ) -> Self {
        Self {
            max_source_len,
            source: Vec::new(),
            compressed: Bytes::new(),
            pending: None,
            codec,
            pool,
        }
    }

    pub fn max_source_len(&self) -> usize {
        self.max_source_len
    }

    pub fn set_max_source_len(&mut self, max_source_len: usize) {
        self.max_source_len = max_source_len;
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn source_len(&self) -> usize {
        self.source.len()
    }

    pub fn compressed(&self) -> &Bytes {
        &self.compressed
    }

    pub fn compressed_len(&self) -> usize {
        self.compressed.len()
    }

    /// Replaces the source region, releasing the previous one.
    pub fn set_source(&mut self, source: Vec<u8>) {
        self.discard_pending();
        self.source = source;
    }

    /// Replaces the compressed region, releasing the previous one.
    pub fn set_compressed(&mut self, compressed: Bytes) {
        self.discard_pending();
        self.compressed = compressed;
    }

    /// Appends as many bytes as fit below `max_source_len`.
    ///
    /// The source region is allocated at full capacity on the first write.
    /// A short write is reported as [`WriteStatus::Truncated`]; the caller
    /// has to continue in another buffer.
    pub fn write(&mut self, data: &[u8]) -> Result<WriteStatus> {
        let remaining = self.max_source_len.saturating_sub(self.source.len());
        let count = remaining.min(data.len());

        if count > 0 {
            if self.source.capacity() - self.source.len() < count {
                self.source.try_reserve_exact(remaining).map_err(|e| {
                    BlockzipError::ResourceExhausted(format!(
                        "Cannot allocate {} bytes of block source: {}",
                        remaining, e
                    ))
                })?;
            }
            self.source.extend_from_slice(&data[..count]);
        }

        if count < data.len() {
            Ok(WriteStatus::Truncated(count))
        } else {
            Ok(WriteStatus::Complete(count))
        }
    }

    /// Releases both regions, waiting for an outstanding job first.
    pub fn clear(&mut self) {
        self.discard_pending();
        self.source = Vec::new();
        self.compressed = Bytes::new();
    }

    pub fn clear_source(&mut self) {
        self.source = Vec::new();
    }

    pub fn clear_compressed(&mut self) {
        self.compressed = Bytes::new();
    }

    /// Compresses `source` into a fresh compressed region.
    pub fn compress(&mut self) -> Result<()> {
        let compressed = self.codec.compress(&self.source)?;
        self.compressed = Bytes::from(compressed);
        Ok(())
    }

    /// Decompresses `compressed` into `source`.
    ///
    /// With `run_async` set and a pool of more than one worker, the job is
    /// dispatched and this call returns without waiting for the result. The
    /// compressed region is released once the result has been collected.
    /// Otherwise decompression runs here and the compressed region is
    /// released immediately.
    pub fn decompress(&mut self, run_async: bool) -> Result<()> {
        self.decompress_with_mode(run_async, JobMode::SingleBuffer)
    }

    /// Like [`Buffer::decompress`], with control over whether the compressed
    /// region survives.
    pub fn decompress_with_mode(&mut self, run_async: bool, mode: JobMode) -> Result<()> {
        if self.pending.is_some() {
            return Ok(());
        }
        if self.compressed.is_empty() {
            return Err(BlockzipError::InvalidOperation(
                "Cannot decompress a buffer without compressed data".to_string(),
            ));
        }

        match &self.pool {
            Some(pool) if run_async && pool.worker_count() > 1 => {
                let job = DecompressJob::new(
                    self.compressed.clone(),
                    self.max_source_len,
                    Arc::clone(&self.codec),
                );
                self.pending = Some(pool.submit(job, mode)?);
            }
            _ => {
                self.source = self.codec.decompress(&self.compressed, self.max_source_len)?;
                if mode == JobMode::SingleBuffer {
                    self.compressed = Bytes::new();
                }
            }
        }

        Ok(())
    }

    /// Blocks until the outstanding job, if any, completes and installs its
    /// output. A failure on the worker is returned here.
    pub fn wait_for_decompress(&mut self) -> Result<()> {
        if let Some(handle) = self.pending.take() {
            let mode = handle.mode();
            self.source = handle.wait()?;
            if mode == JobMode::SingleBuffer {
                self.compressed = Bytes::new();
            }
        }
        Ok(())
    }

    pub fn is_compressed(&self) -> bool {
        !self.compressed.is_empty()
    }

    /// True when decompressed bytes are present and no job is in flight.
    pub fn is_decompressed(&self) -> bool {
        self.pending.is_none() && !self.source.is_empty()
    }

    /// True while a dispatched job has not been collected.
    pub fn decompress_is_active(&self) -> bool {
        self.pending.is_some()
    }

    fn discard_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            if let Err(e) = handle.wait() {
                debug!("Discarding failed decompression: {}", e);
            }
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("max_source_len", &self.max_source_len)
            .field("source_len", &self.source.len())
            .field("compressed_len", &self.compressed.len())
            .field("pending", &self.pending.is_some())
            .finish()
    }
}
