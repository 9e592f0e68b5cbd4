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

//! Handle-based access to open streams.
//!
//! A [`StreamRegistry`] owns every stream it opens and hands out
//! [`StreamHandle`]s. Handles are never reused, so a call with a closed or
//! unknown handle fails with [`BlockzipError::InvalidHandle`] instead of
//! touching another stream.

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;

use crate::error::{lock_poisoned, BlockzipError, Result};
use crate::session::Session;
use crate::stream::{ReadStream, WriteStream};

/// Opaque reference to a stream owned by a [`StreamRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(u64);

impl StreamHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

enum OpenStream<S: Read + Write + Seek> {
    Reader(ReadStream<S>),
    Writer(WriteStream<S>),
}

/// `None` once the stream has been closed by another caller.
type Slot<S> = Arc<Mutex<Option<OpenStream<S>>>>;

/// Registry of open read and write streams keyed by handle.
pub struct StreamRegistry<S: Read + Write + Seek> {
    session: Session,
    streams: Mutex<HashMap<u64, Slot<S>>>,
    next_id: AtomicU64,
}

impl<S: Read + Write + Seek> StreamRegistry<S> {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            streams: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Opens the container at `offset` in `store` for reading.
    pub fn open_read(&self, store: S, offset: u64) -> Result<StreamHandle> {
        let stream = ReadStream::open(store, offset, &self.session)?;
        self.insert(OpenStream::Reader(stream))
    }

    /// Starts a new container at `offset` in `store`.
    pub fn open_write(&self, store: S, offset: u64) -> Result<StreamHandle> {
        let stream = WriteStream::create(store, offset, &self.session)?;
        self.insert(OpenStream::Writer(stream))
    }

    pub fn block_size(&self, handle: StreamHandle) -> Result<u64> {
        self.with_stream(handle, |stream| {
            Ok(match stream {
                OpenStream::Reader(r) => r.block_size(),
                OpenStream::Writer(w) => w.block_size(),
            })
        })
    }

    pub fn set_block_size(&self, handle: StreamHandle, block_size: usize) -> Result<()> {
        self.with_stream(handle, |stream| match stream {
            OpenStream::Reader(r) => r.set_block_size(block_size),
            OpenStream::Writer(w) => w.set_block_size(block_size),
        })
    }

    pub fn tell(&self, handle: StreamHandle) -> Result<u64> {
        self.with_stream(handle, |stream| {
            Ok(match stream {
                OpenStream::Reader(r) => r.tell(),
                OpenStream::Writer(w) => w.tell(),
            })
        })
    }

    pub fn seek(&self, handle: StreamHandle, pos: SeekFrom) -> Result<u64> {
        self.with_stream(handle, |stream| match stream {
            OpenStream::Reader(r) => Ok(r.seek(pos)),
            OpenStream::Writer(w) => w.seek(pos),
        })
    }

    /// Bytes the container occupies in its store.
    pub fn stream_size(&self, handle: StreamHandle) -> Result<u64> {
        self.with_stream(handle, |stream| {
            Ok(match stream {
                OpenStream::Reader(r) => r.stream_size(),
                OpenStream::Writer(w) => w.stream_size(),
            })
        })
    }

    pub fn read(&self, handle: StreamHandle, out: &mut [u8]) -> Result<usize> {
        self.with_stream(handle, |stream| match stream {
            OpenStream::Reader(r) => r.read(out),
            OpenStream::Writer(w) => w.read(out),
        })
    }

    pub fn write(&self, handle: StreamHandle, data: &[u8]) -> Result<usize> {
        self.with_stream(handle, |stream| match stream {
            OpenStream::Reader(r) => r.write(data),
            OpenStream::Writer(w) => w.write(data),
        })
    }

    pub fn end_of_file(&self, handle: StreamHandle) -> Result<bool> {
        self.with_stream(handle, |stream| {
            Ok(match stream {
                OpenStream::Reader(r) => r.end_of_file(),
                OpenStream::Writer(w) => w.end_of_file(),
            })
        })
    }

    /// Closes the stream; a writer is flushed first. The store is dropped
    /// when `close_backing_store` is set and handed back otherwise.
    pub fn close(&self, handle: StreamHandle, close_backing_store: bool) -> Result<Option<S>> {
        let slot = self
            .streams
            .lock()
            .map_err(lock_poisoned)?
            .remove(&handle.0)
            .ok_or(BlockzipError::InvalidHandle(handle.0))?;

        let stream = slot
            .lock()
            .map_err(lock_poisoned)?
            .take()
            .ok_or(BlockzipError::InvalidHandle(handle.0))?;

        let store = match stream {
            OpenStream::Reader(r) => r.close(),
            OpenStream::Writer(w) => w.close()?,
        };
        debug!("Closed stream {}", handle);

        if close_backing_store {
            drop(store);
            Ok(None)
        } else {
            Ok(Some(store))
        }
    }

    /// Number of open streams.
    pub fn len(&self) -> Result<usize> {
        Ok(self.streams.lock().map_err(lock_poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn insert(&self, stream: OpenStream<S>) -> Result<StreamHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.streams
            .lock()
            .map_err(lock_poisoned)?
            .insert(id, Arc::new(Mutex::new(Some(stream))));
        debug!("Opened stream #{}", id);
        Ok(StreamHandle(id))
    }

    /// Runs `f` on the stream without holding the registry lock.
    fn with_stream<T, F>(&self, handle: StreamHandle, f: F) -> Result<T>
    where
        F: FnOnce(&mut OpenStream<S>) -> Result<T>,
    {
        let slot = self
            .streams
            .lock()
            .map_err(lock_poisoned)?
            .get(&handle.0)
            .cloned()
            .ok_or(BlockzipError::InvalidHandle(handle.0))?;

        let mut guard = slot.lock().map_err(lock_poisoned)?;
        match guard.as_mut() {
            Some(stream) => f(stream),
            None => Err(BlockzipError::InvalidHandle(handle.0)),
        }
    }
}

impl<S: Read + Write + Seek> fmt::Debug for StreamRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("session", &self.session)
            .field("open_streams", &self.len().unwrap_or(0))
            .finish()
    }
}
