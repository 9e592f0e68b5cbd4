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

//! Helpers shared by blocks and streams.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::buffer::Buffer;
use crate::error::{BlockzipError, Result};
use crate::parallel::JobMode;

/// Reads exactly `buf.len()` bytes at `position`, then restores the store's
/// cursor.
pub fn read_exact_at<S: Read + Seek>(store: &mut S, position: u64, buf: &mut [u8]) -> Result<()> {
    let saved = store.stream_position()?;
    store.seek(SeekFrom::Start(position))?;

    let result = match store.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(BlockzipError::UnexpectedEof(
            format!("Short read of {} bytes at offset {}", buf.len(), position),
        )),
        Err(e) => Err(BlockzipError::Io(e)),
    };

    store.seek(SeekFrom::Start(saved))?;
    result
}

/// Writes all of `data` at `position`, then restores the store's cursor.
pub fn write_all_at<S: Write + Seek>(store: &mut S, position: u64, data: &[u8]) -> Result<()> {
    let saved = store.stream_position()?;
    store.seek(SeekFrom::Start(position))?;
    let result = store.write_all(data);
    store.seek(SeekFrom::Start(saved))?;
    Ok(result?)
}

/// Converts a length into an on-disk u32 field.
pub fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        BlockzipError::ResourceExhausted(format!(
            "{} of {} bytes does not fit in a 32-bit field",
            what, value
        ))
    })
}

/// Resolves a seek request against a cursor and clamps the result to
/// `[0, max]`. `end` is the length `SeekFrom::End` is relative to.
pub fn clamp_seek(pos: SeekFrom, current: u64, end: u64, max: u64) -> u64 {
    let target = match pos {
        SeekFrom::Start(offset) => offset as i128,
        SeekFrom::Current(delta) => current as i128 + delta as i128,
        SeekFrom::End(delta) => end as i128 + delta as i128,
    };
    target.clamp(0, max as i128) as u64
}

/// Brings a buffer into the decompressed state. No-op if it already is.
pub(crate) fn decompress_payload(buffer: &mut Buffer, clear_compressed: bool) -> Result<()> {
    buffer.wait_for_decompress()?;

    if !buffer.is_decompressed() {
        let mode = if clear_compressed {
            JobMode::SingleBuffer
        } else {
            JobMode::KeepInput
        };
        buffer.decompress_with_mode(false, mode)?;
    } else if clear_compressed {
        buffer.clear_compressed();
    }

    Ok(())
}
