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

//! Random-access reader over an existing container.

use std::io::{self, Read, Seek, SeekFrom};

use log::{debug, warn};

use crate::block::utils::{clamp_seek, read_exact_at};
use crate::block::ReadBlock;
use crate::cache::BlockKey;
use crate::constants::{BLOCK_HEADER_SIZE, STREAM_HEADER_SIZE};
use crate::error::{BlockzipError, Result};
use crate::parallel::WorkerPriority;
use crate::session::Session;
use crate::stream::header::StreamHeader;

/// Reads a container written by [`WriteStream`](crate::stream::WriteStream).
///
/// All block headers are read when the stream is opened. Payloads are only
/// loaded and decompressed when a read touches their block, plus a bounded
/// number of blocks ahead of it when the session has worker threads.
#[derive(Debug)]
pub struct ReadStream<S: Read + Seek> {
    store: S,
    base_position: u64,
    header: StreamHeader,
    position: u64,
    blocks: Vec<ReadBlock>,
    stream_id: u64,
    /// Block the cursor was in during the previous read.
    current_block: Option<usize>,
    session: Session,
}

impl<S: Read + Seek> ReadStream<S> {
    /// Opens the container that starts at `base_position` in `store`.
    pub fn open(mut store: S, base_position: u64, session: &Session) -> Result<Self> {
        let mut raw = [0u8; STREAM_HEADER_SIZE as usize];
        read_exact_at(&mut store, base_position, &mut raw)?;
        let header = StreamHeader::decode(&raw)?;

        if header.block_size == 0 {
            return Err(BlockzipError::CorruptedHeader(
                "Stream header has a block size of 0".to_string(),
            ));
        }

        // Every block needs at least its header past the stream header.
        let saved = store.stream_position()?;
        let end = store.seek(SeekFrom::End(0))?;
        store.seek(SeekFrom::Start(saved))?;
        let room = end.saturating_sub(base_position + STREAM_HEADER_SIZE);
        if header.block_count as u64 > room / BLOCK_HEADER_SIZE {
            return Err(BlockzipError::CorruptedHeader(format!(
                "Stream header lists {} blocks but only {} bytes follow it",
                header.block_count, room
            )));
        }

        let stream_id = session.cache().register_stream();
        let block_count = header.block_count as usize;
        let mut blocks = Vec::new();
        let mut offset = base_position + STREAM_HEADER_SIZE;
        let mut total = 0u64;

        for index in 0..header.block_count {
            let key = BlockKey::new(stream_id, index);
            let block = ReadBlock::open(&mut store, offset, key, session)?;

            let is_last = index as usize + 1 == block_count;
            if !is_last && block.source_len() != header.block_size as u64 {
                return Err(BlockzipError::CorruptedHeader(format!(
                    "Block {} holds {} bytes, expected {}",
                    index,
                    block.source_len(),
                    header.block_size
                )));
            }
            if block.source_len() > header.block_size as u64 {
                return Err(BlockzipError::CorruptedHeader(format!(
                    "Final block holds {} bytes, more than the block size {}",
                    block.source_len(),
                    header.block_size
                )));
            }

            offset += block.stored_size();
            total += block.source_len();
            blocks.push(block);
        }

        if total != header.logical_len {
            return Err(BlockzipError::CorruptedHeader(format!(
                "Blocks hold {} bytes but the stream header records {}",
                total, header.logical_len
            )));
        }

        debug!(
            "Opened stream {}: {} bytes in {} blocks of {} bytes",
            stream_id, header.logical_len, header.block_count, header.block_size
        );

        Ok(Self {
            store,
            base_position,
            header,
            position: 0,
            blocks,
            stream_id,
            current_block: None,
            session: session.clone(),
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn base_position(&self) -> u64 {
        self.base_position
    }

    /// Id under which the stream's blocks are tracked by the reader cache.
    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// Number of logical bytes.
    pub fn len(&self) -> u64 {
        self.header.logical_len
    }

    pub fn is_empty(&self) -> bool {
        self.header.logical_len == 0
    }

    pub fn block_size(&self) -> u64 {
        self.header.block_size as u64
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, index: usize) -> Option<&ReadBlock> {
        self.blocks.get(index)
    }

    /// Bytes the container occupies in the store.
    pub fn stream_size(&self) -> u64 {
        STREAM_HEADER_SIZE + self.blocks.iter().map(|b| b.stored_size()).sum::<u64>()
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Moves the cursor. The result is clamped to `[0, len)`, or to 0 for an
    /// empty stream; out-of-range requests never fail.
    pub fn seek(&mut self, pos: SeekFrom) -> u64 {
        let len = self.header.logical_len;
        self.position = clamp_seek(pos, self.position, len, len.saturating_sub(1));
        self.position
    }

    pub fn end_of_file(&self) -> bool {
        self.position >= self.header.logical_len
    }

    /// Reads up to `out.len()` bytes from the cursor. Returns 0 at the end of
    /// the stream.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        let block_size = self.header.block_size as u64;
        let mut total = 0;

        while total < out.len() && self.position < self.header.logical_len {
            let index = (self.position / block_size) as usize;
            let offset = self.position - index as u64 * block_size;
            let entered = self.current_block != Some(index);
            self.current_block = Some(index);

            let block = &mut self.blocks[index];
            block.seek(SeekFrom::Start(offset));
            let count = block.read(&mut self.store, &mut out[total..])?;

            if entered {
                self.read_ahead(index);
            }
            if count == 0 {
                break;
            }

            total += count;
            self.position += count as u64;
        }

        Ok(total)
    }

    /// Number of blocks admitted ahead of the one being read: one per worker,
    /// limited to half of the blocks the cache budgets hold. The cache evicts
    /// the oldest half at once, so a sequential reader keeps the current
    /// block and its read-ahead resident only within that half.
    pub fn read_ahead_depth(&self) -> Result<usize> {
        if self.session.pool().is_none() {
            return Ok(0);
        }
        let cache = self.session.cache();
        let fits = (cache.memory_limit()? / (self.header.block_size as usize).max(1))
            .min(cache.max_blocks()?);
        Ok(self.session.config().worker_threads.min(fits / 2))
    }

    fn read_ahead(&mut self, index: usize) {
        // Failures resurface when the block itself is read.
        let depth = match self.read_ahead_depth() {
            Ok(depth) => depth,
            Err(e) => {
                warn!("Skipping read-ahead: {}", e);
                return;
            }
        };

        let end = (index + 1 + depth).min(self.blocks.len());
        for next in index + 1..end {
            if let Err(e) = self.blocks[next].cache_in(&mut self.store) {
                warn!("Read-ahead of block {} failed: {}", next, e);
                return;
            }
        }
    }

    /// Decompresses every block in the background and waits for all of them.
    ///
    /// The workers run at low priority while the jobs are outstanding and get
    /// their previous priority back afterwards. Blocks the cache budgets cannot
    /// hold are evicted again as later ones are admitted. Every block is
    /// attempted; the first failure is returned.
    pub fn decompress_all(&mut self) -> Result<()> {
        let pool = self.session.pool().cloned();
        let previous = pool
            .as_ref()
            .and_then(|p| p.priority(0))
            .unwrap_or(WorkerPriority::Normal);
        if let Some(pool) = &pool {
            pool.set_priority(WorkerPriority::Low);
        }

        let mut first_error = None;
        for block in &self.blocks {
            if let Err(e) = block.cache_in(&mut self.store) {
                warn!("Failed to load block {}: {}", block.index(), e);
                first_error.get_or_insert(e);
            }
        }
        for block in &self.blocks {
            if let Err(e) = block.wait_for_decompress() {
                warn!("Failed to decompress block {}: {}", block.index(), e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(pool) = &pool {
            pool.set_priority(previous);
        }
        debug!(
            "Decompressed {} blocks of stream {}",
            self.blocks.len(),
            self.stream_id
        );
        first_error.map_or(Ok(()), Err)
    }

    /// Reader streams are immutable.
    pub fn write(&mut self, _data: &[u8]) -> Result<usize> {
        Err(BlockzipError::ReadOnly(
            "Cannot write to a read stream".to_string(),
        ))
    }

    pub fn set_block_size(&mut self, _block_size: usize) -> Result<()> {
        Err(BlockzipError::ReadOnly(
            "Cannot change the block size of a read stream".to_string(),
        ))
    }

    /// Closes the stream and hands back the store.
    pub fn close(self) -> S {
        let ReadStream { store, .. } = self;
        store
    }
}

impl<S: Read + Seek> Read for ReadStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ReadStream::read(self, buf).map_err(io::Error::from)
    }
}

impl<S: Read + Seek> Seek for ReadStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(ReadStream::seek(self, pos))
    }
}
