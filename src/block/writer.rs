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

//! Write side of a block.
//!
//! A write block fills its buffer append-only, is compressed exactly once and
//! is then flushed: header and payload go to the store and the in-memory
//! payload is released.

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use bytes::Bytes;
use log::trace;

use crate::block::header::BlockHeader;
use crate::block::utils::{clamp_seek, decompress_payload, read_exact_at, to_u32, write_all_at};
use crate::buffer::{Buffer, WriteStatus};
use crate::compression::Codec;
use crate::constants::BLOCK_HEADER_SIZE;
use crate::error::{BlockzipError, Result};

/// A block being written.
#[derive(Debug)]
pub struct WriteBlock {
    index: u32,
    /// Store offset of the block header.
    base_position: u64,
    header: BlockHeader,
    /// Cursor within the block's bytes.
    position: u64,
    buffer: Buffer,
    flushed: bool,
}

impl WriteBlock {
    /// Creates an empty block that will be stored at `base_position`.
    pub fn new(
        index: u32,
        base_position: u64,
        block_size: usize,
        codec: Arc<dyn Codec>,
    ) -> Result<Self> {
        let header = BlockHeader::new(0, 0, to_u32(block_size, "Block size")?);
        Ok(Self {
            index,
            base_position,
            header,
            position: 0,
            buffer: Buffer::new(block_size, codec, None),
            flushed: false,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
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

    /// True once no more bytes fit.
    pub fn is_full(&self) -> bool {
        self.header.source_len >= self.header.block_size
    }

    pub fn is_compressed(&self) -> bool {
        self.header.compressed_len != 0
    }

    /// True once header and payload have been written to the store.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Bytes the block occupies in the store, header included. 0 until the
    /// block has been compressed.
    pub fn stored_size(&self) -> u64 {
        self.header.stored_size()
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Moves the cursor, clamped to `[0, source_len]`.
    pub fn seek(&mut self, pos: SeekFrom) -> u64 {
        let len = self.source_len();
        self.position = clamp_seek(pos, self.position, len, len);
        self.position
    }

    /// Changes the capacity. Only valid before the block was compressed and
    /// never below the bytes already written.
    pub fn set_block_size(&mut self, block_size: usize) -> Result<()> {
        if self.is_compressed() {
            return Err(BlockzipError::InvalidOperation(format!(
                "Cannot resize block {} after compression",
                self.index
            )));
        }
        if block_size == 0 || block_size < self.header.source_len as usize {
            return Err(BlockzipError::InvalidOperation(format!(
                "Block size {} cannot hold the {} bytes of block {}",
                block_size, self.header.source_len, self.index
            )));
        }

        self.header.block_size = to_u32(block_size, "Block size")?;
        self.buffer.set_max_source_len(block_size);
        Ok(())
    }

    /// Appends bytes at the cursor. The cursor must be at the end of the
    /// block, and the block must not have been compressed yet.
    pub fn write(&mut self, data: &[u8]) -> Result<WriteStatus> {
        if self.is_compressed() {
            return Err(BlockzipError::InvalidOperation(format!(
                "Block {} is already compressed",
                self.index
            )));
        }
        if self.position != self.source_len() {
            return Err(BlockzipError::InvalidOperation(format!(
                "Block {} only accepts appends (cursor {} of {})",
                self.index,
                self.position,
                self.source_len()
            )));
        }

        let status = self.buffer.write(data)?;
        let written = status.written();
        self.header.source_len += written as u32;
        self.position += written as u64;
        Ok(status)
    }

    /// Write blocks are not readable.
    pub fn read(&mut self, _out: &mut [u8]) -> Result<usize> {
        Err(BlockzipError::WriteOnly(format!(
            "Cannot read from write block {}",
            self.index
        )))
    }

    /// Compresses the block. A second call is a no-op.
    pub fn compress(&mut self, clear_source: bool) -> Result<()> {
        if !self.is_compressed() {
            if self.header.source_len == 0 {
                return Err(BlockzipError::InvalidOperation(format!(
                    "Block {} is empty",
                    self.index
                )));
            }
            self.buffer.compress()?;
            self.header.compressed_len =
                to_u32(self.buffer.compressed_len(), "Compressed block")?;
        }
        if clear_source {
            self.buffer.clear_source();
        }
        Ok(())
    }

    /// Restores the block's bytes from its compressed payload. A second call
    /// is a no-op.
    pub fn decompress(&mut self, clear_compressed: bool) -> Result<()> {
        if !self.buffer.is_compressed() && !self.buffer.is_decompressed() {
            return Err(BlockzipError::InvalidOperation(format!(
                "Block {} holds no payload",
                self.index
            )));
        }
        if self.is_compressed() {
            // The payload expands to exactly the bytes written.
            self.buffer.set_max_source_len(self.header.source_len as usize);
        }
        decompress_payload(&mut self.buffer, clear_compressed)
    }

    /// Decompressed bytes currently held in memory.
    pub fn source(&self) -> &[u8] {
        self.buffer.source()
    }

    /// Compressed payload currently held in memory.
    pub fn compressed(&self) -> &Bytes {
        self.buffer.compressed()
    }

    /// Writes the header at the block's store offset.
    pub fn commit_header<S: Write + Seek>(&self, store: &mut S) -> Result<()> {
        write_all_at(store, self.base_position, &self.header.encode())
    }

    /// Writes the compressed payload right after the header.
    pub fn commit_data<S: Write + Seek>(&self, store: &mut S) -> Result<()> {
        write_all_at(
            store,
            self.base_position + BLOCK_HEADER_SIZE,
            self.buffer.compressed(),
        )
    }

    /// Flushes the block: persists header and payload, optionally at a new
    /// offset, then releases the in-memory payload.
    pub fn cache_in<S: Write + Seek>(&mut self, store: &mut S, position: Option<u64>) -> Result<()> {
        if !self.is_compressed() || !self.buffer.is_compressed() {
            return Err(BlockzipError::InvalidOperation(format!(
                "Block {} must be compressed before it is flushed",
                self.index
            )));
        }
        if let Some(position) = position {
            self.base_position = position;
        }

        self.commit_header(store)?;
        self.commit_data(store)?;
        self.buffer.clear();
        self.flushed = true;

        trace!(
            "Flushed block {} at offset {} ({} -> {} bytes)",
            self.index,
            self.base_position,
            self.header.source_len,
            self.header.compressed_len
        );
        Ok(())
    }

    /// Reloads the compressed payload of a flushed block from the store.
    pub fn cache_out<S: Read + Seek>(&mut self, store: &mut S) -> Result<()> {
        if !self.flushed {
            return Err(BlockzipError::InvalidOperation(format!(
                "Block {} has not been flushed",
                self.index
            )));
        }

        let mut payload = vec![0u8; self.header.compressed_len as usize];
        read_exact_at(store, self.base_position + BLOCK_HEADER_SIZE, &mut payload)?;
        self.buffer.set_compressed(Bytes::from(payload));
        Ok(())
    }
}
