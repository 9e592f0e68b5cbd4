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

//! Streams: a logical byte sequence stored as a run of blocks.
//!
//! A container starts with a 16-byte stream header, followed by the blocks in
//! order and without gaps:
//!
//! ```text
//! +--------------+--------------+---------------+---------+---------+-----
//! | logical_len  |  block_size  |  block_count  | block 0 | block 1 | ...
//! |  (8 bytes)   |  (4 bytes)   |   (4 bytes)   |         |         |
//! +--------------+--------------+---------------+---------+---------+-----
//! ```
//!
//! Logical offset `p` lives in block `p / block_size`. Every block except the
//! last holds exactly `block_size` bytes. The header is written last, when the
//! writer is flushed.

pub mod header;
pub mod reader;
pub mod writer;

pub use header::StreamHeader;
pub use reader::ReadStream;
pub use writer::WriteStream;

#[cfg(test)]
mod tests;
