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

//! On-disk block header.

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::BLOCK_HEADER_SIZE;
use crate::error::{BlockzipError, Result};

/// Sizes persisted in front of every block payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHeader {
    /// Logical bytes held by the block.
    pub source_len: u32,
    /// Length of the compressed payload. 0 means not yet compressed.
    pub compressed_len: u32,
    /// Nominal capacity of the block.
    pub block_size: u32,
}

impl BlockHeader {
    pub fn new(source_len: u32, compressed_len: u32, block_size: u32) -> Self {
        Self {
            source_len,
            compressed_len,
            block_size,
        }
    }

    /// Serializes the header in little-endian order.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(BLOCK_HEADER_SIZE as usize);
        out.put_u32_le(self.source_len);
        out.put_u32_le(self.compressed_len);
        out.put_u32_le(self.block_size);
        out.freeze()
    }

    /// Parses a header from the first 12 bytes of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < BLOCK_HEADER_SIZE as usize {
            return Err(BlockzipError::UnexpectedEof(format!(
                "Block header needs {} bytes, got {}",
                BLOCK_HEADER_SIZE,
                data.len()
            )));
        }

        let source_len = (&data[0..4]).read_u32::<LittleEndian>()?;
        let compressed_len = (&data[4..8]).read_u32::<LittleEndian>()?;
        let block_size = (&data[8..12]).read_u32::<LittleEndian>()?;

        Ok(Self {
            source_len,
            compressed_len,
            block_size,
        })
    }

    /// Bytes the block occupies in the store, header included. A block that
    /// was never compressed occupies nothing.
    pub fn stored_size(&self) -> u64 {
        if self.compressed_len == 0 {
            0
        } else {
            BLOCK_HEADER_SIZE + self.compressed_len as u64
        }
    }
}
