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

//! Integration tests for writing a container and reading it back in full.

use std::fs::File;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::NamedTempFile;

use blockzip::error::Result;
use blockzip::{ReadStream, Session, SessionConfig, WriteStream};

const NOMINAL_BLOCK_SIZE: usize = 4096;

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

/// Writes `data` to a fresh temp file and reads it back through a second
/// file handle.
fn round_trip(data: &[u8], session: &Session) -> Result<Vec<u8>> {
    let file = NamedTempFile::new().expect("Failed to create temp file");

    let mut writer = WriteStream::create(file.reopen()?, 0, session)?;
    writer.write(data)?;
    let stream_size = writer.stream_size();
    writer.close()?;
    assert_eq!(file.as_file().metadata()?.len(), stream_size);

    let mut reader = ReadStream::open(File::open(file.path())?, 0, session)?;
    assert_eq!(reader.len(), data.len() as u64);
    assert_eq!(reader.stream_size(), stream_size);

    let mut out = vec![0u8; data.len() + 1];
    let mut total = 0;
    loop {
        let count = reader.read(&mut out[total..])?;
        if count == 0 {
            break;
        }
        total += count;
    }
    out.truncate(total);
    assert!(reader.end_of_file());
    Ok(out)
}

fn lengths_for(block_size: usize) -> Vec<usize> {
    let partial = block_size / 2;
    let mut lengths = vec![0, 2 * block_size];
    if partial > 0 {
        lengths.push(partial);
        lengths.push(2 * block_size + partial);
    }
    lengths
}

fn check_matrix(workers: usize) -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let block_sizes = [
        1,
        NOMINAL_BLOCK_SIZE - 1,
        NOMINAL_BLOCK_SIZE,
        NOMINAL_BLOCK_SIZE + 1,
        3 << 20,
    ];

    for &block_size in &block_sizes {
        let session = Session::open(
            SessionConfig::default()
                .with_worker_threads(workers)
                .with_block_size(block_size),
        )?;

        for len in lengths_for(block_size) {
            let data = random_bytes(len, (block_size + len) as u64);
            let out = round_trip(&data, &session)?;
            assert_eq!(
                out.len(),
                data.len(),
                "length mismatch for block size {} and {} bytes",
                block_size,
                len
            );
            assert!(
                out == data,
                "content mismatch for block size {} and {} bytes",
                block_size,
                len
            );
        }
        session.shutdown()?;
    }
    Ok(())
}

#[test]
fn test_round_trip_single_threaded() -> Result<()> {
    check_matrix(1)
}

#[test]
fn test_round_trip_with_workers() -> Result<()> {
    check_matrix(4)
}

#[test]
fn test_compressible_data_shrinks() -> Result<()> {
    let session = Session::open(SessionConfig::default().with_worker_threads(2))?;
    let data: Vec<u8> = b"the same sentence over and over. "
        .iter()
        .copied()
        .cycle()
        .take(1 << 20)
        .collect();

    let file = NamedTempFile::new().expect("Failed to create temp file");
    let mut writer = WriteStream::create(file.reopen()?, 0, &session)?;
    writer.write(&data)?;
    writer.close()?;
    assert!(file.as_file().metadata()?.len() < data.len() as u64 / 10);

    assert_eq!(round_trip(&data, &session)?, data);
    Ok(())
}

#[test]
fn test_io_traits_round_trip() -> Result<()> {
    use std::io::{Read, Write};

    let session = Session::open(
        SessionConfig::default()
            .with_worker_threads(1)
            .with_block_size(1000),
    )?;
    let data = random_bytes(12_345, 7);

    let file = NamedTempFile::new().expect("Failed to create temp file");
    let mut writer = WriteStream::create(file.reopen()?, 0, &session)?;
    for chunk in data.chunks(777) {
        Write::write_all(&mut writer, chunk)?;
    }
    Write::flush(&mut writer)?;
    drop(writer);

    let mut reader = ReadStream::open(File::open(file.path())?, 0, &session)?;
    let mut out = Vec::new();
    Read::read_to_end(&mut reader, &mut out)?;
    assert_eq!(out, data);
    Ok(())
}
