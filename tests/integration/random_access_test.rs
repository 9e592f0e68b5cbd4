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

//! Integration tests for seeking and reading at arbitrary offsets.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::NamedTempFile;

use blockzip::error::Result;
use blockzip::{ReadStream, Session, SessionConfig, WriteStream};

const BLOCK_SIZE: usize = 64 * 1024;
const DATA_LEN: usize = 1 << 20;
const PREFIX_LEN: u64 = 100;

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

fn session(workers: usize, cache_limit: usize) -> Result<Session> {
    Session::open(
        SessionConfig::default()
            .with_worker_threads(workers)
            .with_block_size(BLOCK_SIZE)
            .with_cache_memory_limit(cache_limit),
    )
}

/// Writes `data` after a `PREFIX_LEN`-byte prefix of unrelated bytes.
fn write_with_prefix(data: &[u8], session: &Session) -> Result<NamedTempFile> {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    let mut store = file.reopen()?;
    store.write_all(&[0x5A; PREFIX_LEN as usize])?;

    let mut writer = WriteStream::create(store, PREFIX_LEN, session)?;
    writer.write(data)?;
    writer.close()?;
    Ok(file)
}

fn read_at(reader: &mut ReadStream<File>, offset: u64, len: usize) -> Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(offset));
    let mut out = vec![0u8; len];
    let mut total = 0;
    while total < len {
        let count = reader.read(&mut out[total..])?;
        if count == 0 {
            break;
        }
        total += count;
    }
    out.truncate(total);
    Ok(out)
}

fn check_random_reads(workers: usize, cache_limit: usize) -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let session = session(workers, cache_limit)?;
    let data = random_bytes(DATA_LEN, 11);
    let file = write_with_prefix(&data, &session)?;

    let mut reader = ReadStream::open(File::open(file.path())?, PREFIX_LEN, &session)?;
    assert_eq!(reader.block_count(), DATA_LEN / BLOCK_SIZE);

    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..200 {
        let offset = rng.gen_range(0..DATA_LEN);
        let len = rng.gen_range(1..3 * BLOCK_SIZE);
        let out = read_at(&mut reader, offset as u64, len)?;

        let end = (offset + len).min(DATA_LEN);
        assert_eq!(out.len(), end - offset);
        assert!(out == data[offset..end], "mismatch at offset {}", offset);
    }

    session.shutdown()?;
    Ok(())
}

#[test]
fn test_random_reads_single_threaded() -> Result<()> {
    check_random_reads(1, 4 * BLOCK_SIZE)
}

#[test]
fn test_random_reads_with_workers() -> Result<()> {
    check_random_reads(4, 4 * BLOCK_SIZE)
}

#[test]
fn test_random_reads_with_tiny_cache() -> Result<()> {
    // Budget below one block: only the block being read stays resident.
    check_random_reads(4, BLOCK_SIZE / 2)
}

#[test]
fn test_backwards_scan() -> Result<()> {
    let session = session(2, 8 * BLOCK_SIZE)?;
    let data = random_bytes(DATA_LEN / 4, 5);
    let file = write_with_prefix(&data, &session)?;
    let mut reader = ReadStream::open(File::open(file.path())?, PREFIX_LEN, &session)?;

    let step = 10_000;
    let mut offset = data.len();
    while offset > 0 {
        let start = offset.saturating_sub(step);
        let out = read_at(&mut reader, start as u64, offset - start)?;
        assert!(out == data[start..offset]);
        offset = start;
    }
    Ok(())
}

#[test]
fn test_readers_share_a_session_across_threads() -> Result<()> {
    let session = session(4, 6 * BLOCK_SIZE)?;
    let data = Arc::new(random_bytes(DATA_LEN, 21));
    let file = Arc::new(write_with_prefix(&data, &session)?);

    let handles: Vec<_> = (0..4u64)
        .map(|seed| {
            let session = session.clone();
            let data = Arc::clone(&data);
            let file = Arc::clone(&file);
            thread::spawn(move || -> Result<()> {
                let mut reader =
                    ReadStream::open(File::open(file.path())?, PREFIX_LEN, &session)?;
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..50 {
                    let offset = rng.gen_range(0..DATA_LEN);
                    let len = rng.gen_range(1..2 * BLOCK_SIZE);
                    let out = read_at(&mut reader, offset as u64, len)?;
                    let end = (offset + len).min(DATA_LEN);
                    assert!(out == data[offset..end]);
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("reader thread panicked")?;
    }
    assert!(session.cache().size()? <= 6 * BLOCK_SIZE + BLOCK_SIZE);
    Ok(())
}

#[test]
fn test_seek_past_end_is_clamped() -> Result<()> {
    let session = session(1, 4 * BLOCK_SIZE)?;
    let data = random_bytes(1000, 3);
    let file = write_with_prefix(&data, &session)?;
    let mut reader = ReadStream::open(File::open(file.path())?, PREFIX_LEN, &session)?;

    assert_eq!(reader.seek(SeekFrom::Start(5000)), 999);
    assert_eq!(reader.seek(SeekFrom::End(-1000)), 0);
    assert_eq!(Seek::seek(&mut reader, SeekFrom::Current(10))?, 10);
    assert_eq!(read_at(&mut reader, 990, 100)?, data[990..].to_vec());
    Ok(())
}
