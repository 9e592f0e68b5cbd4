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

//! Residency bookkeeping for decompressed read blocks.
//!
//! The [`ReaderCache`] decides which read blocks keep their decompressed bytes
//! in memory. It never owns a block: entries hold a weak reference to the
//! block's [`Buffer`] and the size that was charged for it. Two budgets apply,
//! an aggregate byte limit and a maximum entry count. When either is exceeded
//! the oldest half of the entries is released in one batch.
//!
//! Entries are kept in recency order. A hit on an entry that is already
//! resident moves it to the most-recent end.
//!
//! Locking: the cache lock is always taken before a buffer lock. Callers must
//! not call into the cache while holding the lock of a cached buffer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::{debug, trace};

use crate::buffer::Buffer;
use crate::error::{lock_poisoned, Result};

/// Identifies one block of one open read stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub stream: u64,
    pub index: u32,
}

impl BlockKey {
    pub fn new(stream: u64, index: u32) -> Self {
        Self { stream, index }
    }
}

struct CacheEntry {
    key: BlockKey,
    size: usize,
    buffer: Weak<Mutex<Buffer>>,
}

struct CacheState {
    /// Oldest first.
    entries: VecDeque<CacheEntry>,
    /// Sum of `size` over `entries`.
    size: usize,
    memory_limit: usize,
    max_blocks: usize,
}

impl CacheState {
    fn position(&self, key: &BlockKey) -> Option<usize> {
        self.entries.iter().position(|e| e.key == *key)
    }

    fn over_budget(&self) -> bool {
        self.size > self.memory_limit || self.entries.len() > self.max_blocks
    }

    fn remove_at(&mut self, index: usize) -> Option<CacheEntry> {
        let entry = self.entries.remove(index)?;
        self.size -= entry.size;
        Some(entry)
    }

    /// Evicts the oldest half of the entries until both budgets hold. The
    /// newest entry always survives.
    fn evict(&mut self) -> Result<usize> {
        let mut evicted = 0;
        while self.over_budget() && self.entries.len() > 1 {
            let len = self.entries.len();
            let batch = (len / 2).max(1).min(len - 1);
            for _ in 0..batch {
                if let Some(entry) = self.remove_at(0) {
                    release(&entry)?;
                    evicted += 1;
                }
            }
            debug!(
                "Evicted {} cached blocks, {} bytes in {} blocks remain",
                batch,
                self.size,
                self.entries.len()
            );
        }
        Ok(evicted)
    }
}

fn release(entry: &CacheEntry) -> Result<()> {
    if let Some(buffer) = entry.buffer.upgrade() {
        buffer.lock().map_err(lock_poisoned)?.clear();
    }
    trace!(
        "Released block {} of stream {}",
        entry.key.index,
        entry.key.stream
    );
    Ok(())
}

/// Bounded set of resident decompressed read blocks.
pub struct ReaderCache {
    state: Mutex<CacheState>,
    next_stream: AtomicU64,
}

impl ReaderCache {
    /// Creates a cache with the given byte budget and entry count budget.
    pub fn new(memory_limit: usize, max_blocks: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: VecDeque::new(),
                size: 0,
                memory_limit,
                max_blocks: max_blocks.max(1),
            }),
            next_stream: AtomicU64::new(1),
        }
    }

    /// Hands out a fresh stream id for building [`BlockKey`]s.
    pub fn register_stream(&self) -> u64 {
        self.next_stream.fetch_add(1, Ordering::Relaxed)
    }

    /// Makes the block resident.
    ///
    /// If the block is already resident it becomes the most recent entry.
    /// Otherwise `load` is run with the buffer locked, the entry is appended
    /// and charged `size` bytes, and the budgets are enforced. A failed load
    /// leaves the cache unchanged.
    ///
    /// Returns true when `load` ran.
    pub fn cache_in<F>(
        &self,
        key: BlockKey,
        size: usize,
        buffer: &Arc<Mutex<Buffer>>,
        load: F,
    ) -> Result<bool>
    where
        F: FnOnce(&mut Buffer) -> Result<()>,
    {
        let mut state = self.state.lock().map_err(lock_poisoned)?;

        if let Some(index) = state.position(&key) {
            let last = state.entries.len() - 1;
            if index != last {
                if let Some(entry) = state.entries.remove(index) {
                    state.entries.push_back(entry);
                }
            }
            return Ok(false);
        }

        {
            let mut guard = buffer.lock().map_err(lock_poisoned)?;
            load(&mut guard)?;
        }

        state.entries.push_back(CacheEntry {
            key,
            size,
            buffer: Arc::downgrade(buffer),
        });
        state.size += size;
        trace!(
            "Cached block {} of stream {} ({} bytes)",
            key.index,
            key.stream,
            size
        );

        state.evict()?;
        Ok(true)
    }

    /// Removes the entry and releases the buffer's regions. Returns false if
    /// the block was not resident.
    pub fn cache_out(&self, key: BlockKey) -> Result<bool> {
        let mut state = self.state.lock().map_err(lock_poisoned)?;
        match state.position(&key) {
            Some(index) => {
                if let Some(entry) = state.remove_at(index) {
                    release(&entry)?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drops the entry without touching the buffer.
    pub fn invalidate(&self, key: BlockKey) -> Result<bool> {
        let mut state = self.state.lock().map_err(lock_poisoned)?;
        match state.position(&key) {
            Some(index) => {
                state.remove_at(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Evicts the single oldest entry.
    pub fn cache_out_oldest(&self) -> Result<Option<BlockKey>> {
        let mut state = self.state.lock().map_err(lock_poisoned)?;
        match state.remove_at(0) {
            Some(entry) => {
                release(&entry)?;
                Ok(Some(entry.key))
            }
            None => Ok(None),
        }
    }

    /// Changes the byte budget, evicting immediately if it no longer holds.
    pub fn set_memory_limit(&self, bytes: usize) -> Result<()> {
        let mut state = self.state.lock().map_err(lock_poisoned)?;
        state.memory_limit = bytes;
        state.evict()?;
        Ok(())
    }

    pub fn memory_limit(&self) -> Result<usize> {
        Ok(self.state.lock().map_err(lock_poisoned)?.memory_limit)
    }

    pub fn max_blocks(&self) -> Result<usize> {
        Ok(self.state.lock().map_err(lock_poisoned)?.max_blocks)
    }

    /// Number of resident blocks.
    pub fn len(&self) -> Result<usize> {
        Ok(self.state.lock().map_err(lock_poisoned)?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Bytes charged for all resident blocks.
    pub fn size(&self) -> Result<usize> {
        Ok(self.state.lock().map_err(lock_poisoned)?.size)
    }

    pub fn is_cached(&self, key: BlockKey) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .map_err(lock_poisoned)?
            .position(&key)
            .is_some())
    }

    /// The most recently admitted or promoted block.
    pub fn top(&self) -> Result<Option<BlockKey>> {
        Ok(self
            .state
            .lock()
            .map_err(lock_poisoned)?
            .entries
            .back()
            .map(|e| e.key))
    }
}

impl fmt::Debug for ReaderCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.lock() {
            Ok(state) => f
                .debug_struct("ReaderCache")
                .field("entries", &state.entries.len())
                .field("size", &state.size)
                .field("memory_limit", &state.memory_limit)
                .field("max_blocks", &state.max_blocks)
                .finish(),
            Err(_) => f.write_str("ReaderCache { <poisoned> }"),
        }
    }
}
