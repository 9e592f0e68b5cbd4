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

//! Integration tests for the handle-based registry over real files.

use std::fs::File;
use std::io::SeekFrom;

use tempfile::NamedTempFile;

use blockzip::error::{BlockzipError, Result};
use blockzip::{Session, SessionConfig, StreamRegistry};

fn registry() -> Result<StreamRegistry<File>> {
    let session = Session::open(
        SessionConfig::default()
            .with_worker_threads(2)
            .with_block_size(4096),
    )?;
    Ok(StreamRegistry::new(session))
}

fn pattern(len: usize, salt: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(salt)).collect()
}

#[test]
fn test_two_containers_in_one_file() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let registry = registry()?;
    let file = NamedTempFile::new().expect("Failed to create temp file");
    let first = pattern(10_000, 3);
    let second = pattern(7_000, 5);

    // The second container starts where the first one ends.
    let handle = registry.open_write(file.reopen()?, 0)?;
    registry.write(handle, &first)?;
    registry.close(handle, true)?;

    let handle = registry.open_read(file.reopen()?, 0)?;
    let second_offset = registry.stream_size(handle)?;
    registry.close(handle, true)?;

    let handle = registry.open_write(file.reopen()?, second_offset)?;
    registry.set_block_size(handle, 1000)?;
    assert_eq!(registry.block_size(handle)?, 1000);
    registry.write(handle, &second)?;
    let second_size = registry.stream_size(handle)?;
    registry.close(handle, true)?;

    let a = registry.open_read(file.reopen()?, 0)?;
    let b = registry.open_read(file.reopen()?, second_offset)?;
    assert_eq!(registry.len()?, 2);
    assert_eq!(registry.block_size(b)?, 1000);
    assert_eq!(
        file.as_file().metadata()?.len(),
        second_offset + registry.stream_size(b)?
    );
    assert!(registry.stream_size(b)? >= second_size);

    let mut out = vec![0u8; first.len()];
    assert_eq!(registry.read(a, &mut out)?, first.len());
    assert_eq!(out, first);
    assert!(registry.end_of_file(a)?);

    let mut out = vec![0u8; second.len()];
    assert_eq!(registry.read(b, &mut out)?, second.len());
    assert_eq!(out, second);

    registry.seek(b, SeekFrom::Start(6_990))?;
    assert_eq!(registry.tell(b)?, 6_990);
    let mut tail = [0u8; 32];
    assert_eq!(registry.read(b, &mut tail)?, 10);
    assert_eq!(&tail[..10], &second[6_990..]);

    registry.close(a, true)?;
    assert!(registry.close(b, false)?.is_some());
    assert!(registry.is_empty()?);
    Ok(())
}

#[test]
fn test_handles_are_not_reused() -> Result<()> {
    let registry = registry()?;
    let file = NamedTempFile::new().expect("Failed to create temp file");

    let first = registry.open_write(file.reopen()?, 0)?;
    registry.close(first, true)?;
    let second = registry.open_write(file.reopen()?, 0)?;
    assert_ne!(first, second);

    assert!(matches!(
        registry.tell(first),
        Err(BlockzipError::InvalidHandle(_))
    ));
    assert_eq!(registry.tell(second)?, 0);
    Ok(())
}

#[test]
fn test_writer_rules_apply_through_handles() -> Result<()> {
    let registry = registry()?;
    let file = NamedTempFile::new().expect("Failed to create temp file");

    let handle = registry.open_write(file.reopen()?, 0)?;
    assert_eq!(registry.seek(handle, SeekFrom::Start(0))?, 0);
    registry.write(handle, b"sequential only")?;
    assert!(matches!(
        registry.seek(handle, SeekFrom::Start(0)),
        Err(BlockzipError::InvalidOperation(_))
    ));
    assert!(matches!(
        registry.set_block_size(handle, 10),
        Err(BlockzipError::InvalidOperation(_))
    ));
    assert!(!registry.end_of_file(handle)?);
    registry.close(handle, true)?;

    let handle = registry.open_read(file.reopen()?, 0)?;
    assert!(matches!(
        registry.write(handle, b"x"),
        Err(BlockzipError::ReadOnly(_))
    ));
    registry.close(handle, true)?;
    Ok(())
}
