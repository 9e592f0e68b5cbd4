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

//! On-disk stream header.

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::STREAM_HEADER_SIZE;
use crate::error::{BlockzipError, Result};

/// Sizes persisted at the start of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamHeader {
    /// Total number of logical bytes.
    pub logical_len: u64,
    /// Capacity of every non-final block.
    pub block_size: u32,
    pub block_count: u32,
}

impl StreamHeader {
    pub fn new(logical_len: u64, block_size: u32, block_count: u32) -> Self {
        Self {
            logical_len,
            block_size,
            block_count,
        }
    }

    /// Serializes the header in little-endian order.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(STREAM_HEADER_SIZE as usize);
        out.put_u64_le(self.logical_len);
        out.put_u32_le(self.block_size);
        out.put_u32_le(self.block_count);
        out.freeze()
    }

    /// Parses a header from the first 16 bytes of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < STREAM_HEADER_SIZE as usize {
            return Err(BlockzipError::UnexpectedEof(format!(
                "Stream header needs {} bytes, got {}",
                STREAM_HEADER_SIZE,
                data.len()
            )));
        }

        let logical_len = (&data[0..8]).read_u64::<LittleEndian>()?;
        let block_size = (&data[8..12]).read_u32::<LittleEndian>()?;
        let block_count = (&data[12..16]).read_u32::<LittleEndian>()?;

        Ok(Self {
            logical_len,
            block_size,
            block_count,
        })
    }
}
