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

//! Sequential writer producing a container.

use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::block::utils::{clamp_seek, to_u32, write_all_at};
use crate::block::WriteBlock;
use crate::compression::Codec;
use crate::constants::STREAM_HEADER_SIZE;
use crate::error::{BlockzipError, Result};
use crate::session::Session;
use crate::stream::header::StreamHeader;

/// Writes a logical byte stream as a run of compressed blocks.
///
/// Writing is strictly sequential. When the first byte of a new block is
/// written, the previous block is compressed, stored and released, so at most
/// one block is held in memory. The stream header is written by
/// [`flush`](WriteStream::flush), which also runs when the stream is closed
/// or dropped.
#[derive(Debug)]
pub struct WriteStream<S: Write + Seek> {
    store: Option<S>,
    base_position: u64,
    header: StreamHeader,
    position: u64,
    blocks: Vec<WriteBlock>,
    /// Store bytes taken by flushed blocks.
    stored_len: u64,
    codec: Arc<dyn Codec>,
}

impl<S: Write + Seek> WriteStream<S> {
    /// Starts a container at `base_position` in `store`, using the session's
    /// block size and codec.
    pub fn create(store: S, base_position: u64, session: &Session) -> Result<Self> {
        let block_size = to_u32(session.config().block_size, "Block size")?;
        Ok(Self {
            store: Some(store),
            base_position,
            header: StreamHeader::new(0, block_size, 0),
            position: 0,
            blocks: Vec::new(),
            stored_len: 0,
            codec: Arc::clone(session.codec()),
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn base_position(&self) -> u64 {
        self.base_position
    }

    /// Number of logical bytes written so far.
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

    pub fn block(&self, index: usize) -> Option<&WriteBlock> {
        self.blocks.get(index)
    }

    /// Bytes the container occupies in the store. Blocks that have not been
    /// compressed yet do not count.
    pub fn stream_size(&self) -> u64 {
        STREAM_HEADER_SIZE + self.blocks.iter().map(|b| b.stored_size()).sum::<u64>()
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Sets the capacity of the blocks. Only valid before anything was written.
    pub fn set_block_size(&mut self, block_size: usize) -> Result<()> {
        if !self.blocks.is_empty() {
            return Err(BlockzipError::InvalidOperation(
                "Cannot change the block size after writing has started".to_string(),
            ));
        }
        if block_size == 0 {
            return Err(BlockzipError::InvalidOperation(
                "Block size must be positive".to_string(),
            ));
        }
        self.header.block_size = to_u32(block_size, "Block size")?;
        Ok(())
    }

    /// Moves the cursor. Only valid before anything was written; the result is
    /// clamped like a reader's.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if !self.blocks.is_empty() {
            return Err(BlockzipError::InvalidOperation(
                "Write streams can only seek before writing".to_string(),
            ));
        }
        let len = self.header.logical_len;
        self.position = clamp_seek(pos, self.position, len, len.saturating_sub(1));
        Ok(self.position)
    }

    /// Always false: a writer's cursor is the end of its data.
    pub fn end_of_file(&self) -> bool {
        false
    }

    /// Write streams are not readable.
    pub fn read(&mut self, _out: &mut [u8]) -> Result<usize> {
        Err(BlockzipError::WriteOnly(
            "Cannot read from a write stream".to_string(),
        ))
    }

    /// Appends `data`, starting new blocks as the current one fills up.
    /// Returns the number of bytes written, which is all of `data`.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let block_size = self.header.block_size as u64;
        let mut written = 0;

        while written < data.len() {
            let index = (self.position / block_size) as usize;
            if index == self.blocks.len() {
                self.start_block()?;
            } else if index > self.blocks.len() {
                return Err(BlockzipError::InvalidOperation(format!(
                    "Cannot write block {} before block {}",
                    index,
                    self.blocks.len()
                )));
            }

            let status = self.blocks[index].write(&data[written..])?;
            let count = status.written();
            if count == 0 {
                return Err(BlockzipError::Other(format!(
                    "Block {} accepted no bytes at offset {}",
                    index, self.position
                )));
            }

            written += count;
            self.position += count as u64;
            self.header.logical_len += count as u64;
        }

        Ok(written)
    }

    /// Compresses every block that has not been stored yet, keeping the
    /// source bytes unless `clear_source` is set. A compressed block takes no
    /// more bytes, so writing continues only if the trailing block is full.
    pub fn compress(&mut self, clear_source: bool) -> Result<()> {
        for block in self.blocks.iter_mut().filter(|b| !b.is_flushed()) {
            block.compress(clear_source)?;
        }
        Ok(())
    }

    /// Flushes every pending block, then writes the stream header. The store
    /// cursor is left at the end of the container.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_blocks()?;

        let stream_size = self.stream_size();
        let store = self.store.as_mut().ok_or_else(closed)?;
        write_all_at(store, self.base_position, &self.header.encode())?;
        store.seek(SeekFrom::Start(self.base_position + stream_size))?;
        store.flush()?;

        debug!(
            "Flushed stream: {} bytes in {} blocks, {} stored bytes",
            self.header.logical_len, self.header.block_count, stream_size
        );
        Ok(())
    }

    /// Flushes the stream and hands back the store.
    pub fn close(mut self) -> Result<S> {
        if let Err(e) = self.flush() {
            // Drop must not retry the flush.
            self.store = None;
            return Err(e);
        }
        self.store.take().ok_or_else(closed)
    }

    /// Flushes the open block and appends a new one.
    fn start_block(&mut self) -> Result<()> {
        self.flush_blocks()?;

        let index = to_u32(self.blocks.len(), "Block count")?;
        let base = self.base_position + STREAM_HEADER_SIZE + self.stored_len;
        let block = WriteBlock::new(
            index,
            base,
            self.header.block_size as usize,
            Arc::clone(&self.codec),
        )?;

        self.blocks.push(block);
        self.header.block_count = index + 1;
        trace!("Started block {} at offset {}", index, base);
        Ok(())
    }

    /// Compresses and stores every block not stored yet, placing each right
    /// after the blocks before it.
    fn flush_blocks(&mut self) -> Result<()> {
        let store = self.store.as_mut().ok_or_else(closed)?;
        for block in self.blocks.iter_mut().filter(|b| !b.is_flushed()) {
            let position = self.base_position + STREAM_HEADER_SIZE + self.stored_len;
            block.compress(true)?;
            block.cache_in(store, Some(position))?;
            self.stored_len += block.stored_size();
        }
        Ok(())
    }
}

fn closed() -> BlockzipError {
    BlockzipError::InvalidOperation("Write stream is closed".to_string())
}

impl<S: Write + Seek> Write for WriteStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        WriteStream::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        WriteStream::flush(self).map_err(io::Error::from)
    }
}

impl<S: Write + Seek> Seek for WriteStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        WriteStream::seek(self, pos).map_err(io::Error::from)
    }
}

impl<S: Write + Seek> Drop for WriteStream<S> {
    fn drop(&mut self) {
        if self.store.is_some() {
            if let Err(e) = self.flush() {
                warn!("Failed to flush write stream on drop: {}", e);
            }
        }
    }
}
