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

//! Constants used in the Blockzip container format.

/// Size of the stream header in bytes: u64 logical length, u32 block size,
/// u32 block count.
pub const STREAM_HEADER_SIZE: u64 = 16;

/// Size of a block header in bytes: u32 source length, u32 compressed
/// length, u32 block size.
pub const BLOCK_HEADER_SIZE: u64 = 12;

/// Default nominal block capacity (256 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 18;

/// Default number of decompression workers.
pub const DEFAULT_WORKER_THREADS: usize = 8;

/// Default reader cache size budget before scaling by worker count (8 MiB).
pub const DEFAULT_CACHE_MEMORY_LIMIT: usize = 8 * 1024 * 1024;

/// Default maximum number of resident blocks in the reader cache.
pub const DEFAULT_CACHE_MAX_BLOCKS: usize = 1024;

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;
