//! Error types for Blockzip.

use std::io;
use thiserror::Error;

/// The main error type for Blockzip operations.
#[derive(Debug, Error)]
pub enum BlockzipError {
    /// An I/O error occurred on the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backing store ended before a header or payload was complete.
    #[error("Unexpected end of backing store: {0}")]
    UnexpectedEof(String),

    /// Attempted to modify a read-only stream or block.
    #[error("Read-only object: {0}")]
    ReadOnly(String),

    /// Attempted to read from a write-only stream or block.
    #[error("Write-only object: {0}")]
    WriteOnly(String),

    /// The operation is not valid in the current state of the object.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A buffer could not be allocated, or a size does not fit the format.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The codec failed to compress a block.
    #[error("Compression failed: {0}")]
    Compression(String),

    /// The codec failed to decompress a block. A block that fails here
    /// cannot be partially trusted.
    #[error("Decompression failed: {0}")]
    Decompression(String),

    /// Stream or block headers are inconsistent with each other.
    #[error("Corrupted header: {0}")]
    CorruptedHeader(String),

    /// The decompression pool has been shut down.
    #[error("Decompression pool is closed")]
    PoolClosed,

    /// A façade handle does not refer to a live stream.
    #[error("Invalid stream handle: {0}")]
    InvalidHandle(u64),

    /// A general error occurred.
    #[error("{0}")]
    Other(String),
}

impl From<BlockzipError> for io::Error {
    fn from(err: BlockzipError) -> Self {
        match err {
            BlockzipError::Io(e) => e,
            BlockzipError::UnexpectedEof(_) => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            BlockzipError::ReadOnly(_) | BlockzipError::WriteOnly(_) => {
                io::Error::new(io::ErrorKind::Unsupported, err)
            }
            BlockzipError::InvalidOperation(_) | BlockzipError::InvalidHandle(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            BlockzipError::CorruptedHeader(_) | BlockzipError::Decompression(_) => {
                io::Error::new(io::ErrorKind::InvalidData, err)
            }
            other => io::Error::other(other),
        }
    }
}

/// A specialized Result type for Blockzip operations.
pub type Result<T> = std::result::Result<T, BlockzipError>;

/// Maps a poisoned lock into an error instead of panicking.
pub(crate) fn lock_poisoned<E: std::fmt::Display>(e: E) -> BlockzipError {
    BlockzipError::Other(format!("Failed to lock mutex: {}", e))
}
