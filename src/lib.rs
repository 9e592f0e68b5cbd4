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

//! Blockzip is a seekable, block-oriented compressed container.
//!
//! A logical byte stream written through a [`stream::WriteStream`] is cut into
//! fixed-size blocks, each compressed on its own and laid out after a small
//! stream header. A [`stream::ReadStream`] maps any logical offset back to a
//! block and decompresses only the blocks that are actually touched, keeping a
//! bounded working set resident in a shared [`cache::ReaderCache`] and
//! offloading decompression to a [`parallel::DecompressPool`].
//!
//! ```text
//! StreamHeader { logical_len: u64, block_size: u32, block_count: u32 }
//! BlockHeader  { source_len: u32, compressed_len: u32, block_size: u32 }
//! payload      [compressed_len bytes]
//! BlockHeader  ...
//! ```
//!
//! The shared services are bundled in a [`session::Session`] which is opened
//! once and handed to every stream.

pub mod block;
pub mod buffer;
pub mod cache;
pub mod compression;
pub mod config;
pub mod constants;
pub mod error;
pub mod parallel;
pub mod registry;
pub mod session;
pub mod stream;

pub use config::SessionConfig;
pub use error::{BlockzipError, Result};
pub use registry::{StreamHandle, StreamRegistry};
pub use session::Session;
pub use stream::{ReadStream, WriteStream};
