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

//! Read side of a block.

use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::{trace, warn};

use crate::block::header::BlockHeader;
use crate::block::utils::{clamp_seek, decompress_payload, read_exact_at};
use crate::buffer::Buffer;
use crate::cache::{BlockKey, ReaderCache};
use crate::constants::BLOCK_HEADER_SIZE;
use crate::error::{lock_poisoned, BlockzipError, Result};
use crate::session::Session;

/// How often `read` re-admits a block that was evicted by another stream
/// between admission and copy before giving up.
const MAX_ADMISSION_ATTEMPTS: usize = 8;

/// A block of an existing container.
///
/// The header is read when the block is opened. The compressed payload is only
/// loaded when the reader cache admits the block.
#[derive(Debug)]
pub struct ReadBlock {
    key: BlockKey,
    /// Store offset of the block header.
    base_position: u64,
    header: BlockHeader,
    /// Cursor within the decompressed bytes.
    position: u64,
    buffer: Arc<Mutex<Buffer>>,
    cache: Arc<ReaderCache>,
}

impl ReadBlock {
    /// Reads and validates the block header at `base_position`.
    pub fn open<S: Read + Seek>(
        store: &mut S,
        base_position: u64,
        key: BlockKey,
        session: &Session,
    ) -> Result<Self> {
        let mut raw = [0u8; BLOCK_HEADER_SIZE as usize];
        read_exact_at(store, base_position, &mut raw)?;
        let header = BlockHeader::decode(&raw)?;

        if header.compressed_len == 0 {
            return Err(BlockzipError::CorruptedHeader(format!(
                "Block {} at offset {} has no compressed payload",
                key.index, base_position
            )));
        }
        if header.source_len == 0 || header.source_len > header.block_size {
            return Err(BlockzipError::CorruptedHeader(format!(
                "Block {} holds {} bytes but its block size is {}",
                key.index, header.source_len, header.block_size
            )));
        }

        let buffer = Buffer::new(
            header.source_len as usize,
            Arc::clone(session.codec()),
            session.pool().cloned(),
        );

        Ok(Self {
            key,
            base_position,
            header,
            position: 0,
            buffer: Arc::new(Mutex::new(buffer)),
            cache: Arc::clone(session.cache()),
        })
    }

    pub fn key(&self) -> BlockKey {
        self.key
    }

    pub fn index(&self) -> u32 {
        self.key.index
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn base_position(&self) -> u64 {
        self.base_position
    }

    pub fn source_len(&self) -> u64 {
        self.header.source_len as u64
    }

    pub fn compressed_len(&self) -> u64 {
        self.header.compressed_len as u64
    }

    pub fn block_size(&self) -> u64 {
        self.header.block_size as u64
    }

    /// Bytes the block occupies in the store, header included.
    pub fn stored_size(&self) -> u64 {
        self.header.stored_size()
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Moves the cursor, clamped to `[0, source_len)`.
    pub fn seek(&mut self, pos: SeekFrom) -> u64 {
        let len = self.source_len();
        self.position = clamp_seek(pos, self.position, len, len.saturating_sub(1));
        self.position
    }

    /// Admits the block to the reader cache, loading the payload and starting
    /// decompression if it is not resident. Returns true when a load happened.
    pub fn cache_in<S: Read + Seek>(&self, store: &mut S) -> Result<bool> {
        let payload_position = self.base_position + BLOCK_HEADER_SIZE;
        let compressed_len = self.header.compressed_len as usize;
        let index = self.key.index;

        self.cache.cache_in(
            self.key,
            self.header.source_len as usize,
            &self.buffer,
            |buffer| {
                if buffer.is_decompressed() || buffer.decompress_is_active() {
                    return Ok(());
                }
                if !buffer.is_compressed() {
                    let mut payload = Vec::new();
                    payload.try_reserve_exact(compressed_len).map_err(|e| {
                        BlockzipError::ResourceExhausted(format!(
                            "Cannot allocate {} bytes for block {}: {}",
                            compressed_len, index, e
                        ))
                    })?;
                    payload.resize(compressed_len, 0);
                    read_exact_at(store, payload_position, &mut payload)?;
                    buffer.set_compressed(Bytes::from(payload));
                }
                trace!("Loaded block {} ({} compressed bytes)", index, compressed_len);
                buffer.decompress(true)
            },
        )
    }

    /// Drops the block from the reader cache and releases its bytes.
    pub fn cache_out(&self) -> Result<bool> {
        self.cache.cache_out(self.key)
    }

    pub fn is_cached(&self) -> Result<bool> {
        self.cache.is_cached(self.key)
    }

    /// True when the decompressed bytes are resident and no job is pending.
    pub fn is_decompressed(&self) -> Result<bool> {
        Ok(self.buffer.lock().map_err(lock_poisoned)?.is_decompressed())
    }

    /// Makes the block resident and waits for its decompression. Calling it
    /// again on a resident block is a no-op.
    pub fn decompress<S: Read + Seek>(&self, store: &mut S) -> Result<()> {
        self.cache_in(store)?;
        let mut buffer = self.buffer.lock().map_err(lock_poisoned)?;
        if let Err(e) = decompress_payload(&mut buffer, true) {
            drop(buffer);
            self.cache.cache_out(self.key)?;
            return Err(e);
        }
        Ok(())
    }

    /// Waits for a pending background decompression. A block whose job failed
    /// is dropped from the cache and the failure is returned.
    pub fn wait_for_decompress(&self) -> Result<()> {
        let mut buffer = self.buffer.lock().map_err(lock_poisoned)?;
        if let Err(e) = buffer.wait_for_decompress() {
            drop(buffer);
            self.cache.cache_out(self.key)?;
            return Err(e);
        }
        Ok(())
    }

    /// Copies bytes from the cursor into `out` and advances the cursor.
    ///
    /// Admits the block first and waits for any pending decompression, so a
    /// failure on a worker is returned here. Returns 0 at the end of the block.
    pub fn read<S: Read + Seek>(&mut self, store: &mut S, out: &mut [u8]) -> Result<usize> {
        let source_len = self.source_len();
        if out.is_empty() || self.position >= source_len {
            return Ok(0);
        }

        for _ in 0..MAX_ADMISSION_ATTEMPTS {
            self.cache_in(store)?;

            let mut buffer = self.buffer.lock().map_err(lock_poisoned)?;
            if let Err(e) = buffer.wait_for_decompress() {
                drop(buffer);
                self.cache.cache_out(self.key)?;
                return Err(e);
            }

            if buffer.is_decompressed() {
                let start = self.position as usize;
                let count = out.len().min(buffer.source_len() - start);
                out[..count].copy_from_slice(&buffer.source()[start..start + count]);
                drop(buffer);

                self.position += count as u64;
                return Ok(count);
            }

            // Evicted between admission and copy.
            trace!("Block {} was evicted before it could be read", self.key.index);
        }

        Err(BlockzipError::Other(format!(
            "Block {} was evicted {} times in a row",
            self.key.index, MAX_ADMISSION_ATTEMPTS
        )))
    }

    /// Read blocks are immutable.
    pub fn write(&mut self, _data: &[u8]) -> Result<usize> {
        Err(BlockzipError::ReadOnly(format!(
            "Cannot write to read block {}",
            self.key.index
        )))
    }

    pub fn set_block_size(&mut self, _block_size: usize) -> Result<()> {
        Err(BlockzipError::ReadOnly(format!(
            "Cannot resize read block {}",
            self.key.index
        )))
    }
}

impl Drop for ReadBlock {
    fn drop(&mut self) {
        if let Err(e) = self.cache.invalidate(self.key) {
            warn!("Failed to drop block {} from the cache: {}", self.key.index, e);
        }
    }
}
