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

//! Blocks: the unit of compression.
//!
//! Each block is stored as a fixed 12-byte header followed by its compressed
//! payload:
//!
//! ```text
//! +---------------+------------------+---------------+--------------------+
//! |  source_len   |  compressed_len  |  block_size   |  payload           |
//! |   (4 bytes)   |    (4 bytes)     |   (4 bytes)   |  (compressed_len)  |
//! +---------------+------------------+---------------+--------------------+
//! ```
//!
//! - `source_len`: number of logical bytes held by the block
//! - `compressed_len`: payload length, 0 only while the block was never compressed
//! - `block_size`: nominal capacity the block was written with
//!
//! [`ReadBlock`](reader::ReadBlock) decompresses on demand under control of the
//! reader cache. [`WriteBlock`](writer::WriteBlock) accumulates bytes,
//! compresses once and is then flushed to the store.

pub mod header;
pub mod reader;
pub mod utils;
pub mod writer;

pub use header::BlockHeader;
pub use reader::ReadBlock;
pub use writer::WriteBlock;

#[cfg(test)]
mod tests;
