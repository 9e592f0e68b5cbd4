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

//! Integration tests for the reader cache budgets.

use std::fs::File;
use std::io::SeekFrom;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::NamedTempFile;

use blockzip::constants::{BLOCK_HEADER_SIZE, STREAM_HEADER_SIZE};
use blockzip::error::Result;
use blockzip::{ReadStream, Session, SessionConfig, WriteStream};

const MIB: usize = 1 << 20;

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

fn write_container(data: &[u8], session: &Session) -> Result<NamedTempFile> {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    let mut writer = WriteStream::create(file.reopen()?, 0, session)?;
    writer.write(data)?;
    writer.close()?;
    Ok(file)
}

/// 10 MiB in 1 MiB blocks read back under a 2 MiB budget.
fn check_ten_blocks_under_two_mib(workers: usize) -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let session = Session::open(
        SessionConfig::default()
            .with_worker_threads(workers)
            .with_block_size(MIB)
            .with_cache_memory_limit(2 * MIB),
    )?;
    let data = random_bytes(10 * MIB, 1234);
    let file = write_container(&data, &session)?;

    let mut reader = ReadStream::open(File::open(file.path())?, 0, &session)?;
    assert_eq!(reader.block_count(), 10);

    let expected_size = STREAM_HEADER_SIZE
        + (0..reader.block_count())
            .map(|i| {
                let block = reader.block(i).expect("block exists");
                assert!(block.compressed_len() > 0);
                BLOCK_HEADER_SIZE + block.compressed_len()
            })
            .sum::<u64>();
    assert_eq!(reader.stream_size(), expected_size);
    assert_eq!(file.as_file().metadata()?.len(), expected_size);

    let cache = session.cache();
    let mut out = vec![0u8; 64 * 1024];
    let mut offset = 0;
    loop {
        let count = reader.read(&mut out)?;
        if count == 0 {
            break;
        }
        assert!(out[..count] == data[offset..offset + count]);
        offset += count;

        assert!(cache.len()? <= 2, "{} blocks resident", cache.len()?);
        assert!(cache.size()? <= 2 * MIB);
    }
    assert_eq!(offset, data.len());

    session.shutdown()?;
    Ok(())
}

#[test]
fn test_ten_blocks_under_two_mib_single_threaded() -> Result<()> {
    check_ten_blocks_under_two_mib(1)
}

#[test]
fn test_ten_blocks_under_two_mib_with_workers() -> Result<()> {
    check_ten_blocks_under_two_mib(8)
}

#[test]
fn test_count_budget_holds_under_random_access() -> Result<()> {
    let block_size = 16 * 1024;
    let session = Session::open(
        SessionConfig::default()
            .with_worker_threads(4)
            .with_block_size(block_size)
            .with_cache_memory_limit(usize::MAX / 2)
            .with_cache_max_blocks(3),
    )?;
    let data = random_bytes(40 * block_size, 77);
    let file = write_container(&data, &session)?;
    let mut reader = ReadStream::open(File::open(file.path())?, 0, &session)?;

    let mut rng = StdRng::seed_from_u64(8);
    let mut out = vec![0u8; 100];
    for _ in 0..100 {
        let offset = rng.gen_range(0..data.len() - out.len());
        reader.seek(SeekFrom::Start(offset as u64));
        let count = reader.read(&mut out)?;
        assert!(out[..count] == data[offset..offset + count]);
        assert!(session.cache().len()? <= 3);
    }
    Ok(())
}

#[test]
fn test_shrinking_the_budget_evicts() -> Result<()> {
    let block_size = 32 * 1024;
    let session = Session::open(
        SessionConfig::default()
            .with_worker_threads(1)
            .with_block_size(block_size)
            .with_cache_memory_limit(16 * block_size),
    )?;
    let data = random_bytes(8 * block_size, 5);
    let file = write_container(&data, &session)?;
    let mut reader = ReadStream::open(File::open(file.path())?, 0, &session)?;

    let mut out = vec![0u8; data.len()];
    assert_eq!(reader.read(&mut out)?, data.len());
    assert_eq!(session.cache().len()?, 8);
    assert_eq!(session.cache().size()?, 8 * block_size);

    session.cache().set_memory_limit(2 * block_size)?;
    assert!(session.cache().size()? <= 2 * block_size);

    // Evicted blocks are loaded again on demand.
    reader.seek(SeekFrom::Start(0));
    let mut again = vec![0u8; data.len()];
    assert_eq!(reader.read(&mut again)?, data.len());
    assert!(again == data);
    Ok(())
}

#[test]
fn test_closing_a_reader_releases_its_entries() -> Result<()> {
    let block_size = 8 * 1024;
    let session = Session::open(
        SessionConfig::default()
            .with_worker_threads(1)
            .with_block_size(block_size),
    )?;
    let data = random_bytes(4 * block_size, 9);
    let file = write_container(&data, &session)?;

    let mut reader = ReadStream::open(File::open(file.path())?, 0, &session)?;
    let mut out = vec![0u8; data.len()];
    reader.read(&mut out)?;
    assert_eq!(session.cache().len()?, 4);

    drop(reader.close());
    assert!(session.cache().is_empty()?);
    assert_eq!(session.cache().size()?, 0);
    Ok(())
}
