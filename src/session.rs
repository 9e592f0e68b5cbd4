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

//! Shared services for streams.
//!
//! A [`Session`] bundles the codec, the reader cache and the decompression
//! pool. It is opened once, cloned into every stream and shut down
//! explicitly, so independent configurations can live side by side in one
//! process.

use std::sync::Arc;

use log::debug;

use crate::cache::ReaderCache;
use crate::compression::{Codec, ZstdCodec};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::parallel::DecompressPool;

/// Codec, reader cache and decompression pool shared by a set of streams.
#[derive(Debug, Clone)]
pub struct Session {
    config: SessionConfig,
    codec: Arc<dyn Codec>,
    cache: Arc<ReaderCache>,
    pool: Option<Arc<DecompressPool>>,
}

impl Session {
    /// Opens a session using a zstd codec at the configured level.
    pub fn open(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let codec = Arc::new(ZstdCodec::with_level(config.compression_level)?);
        Self::with_codec(config, codec)
    }

    /// Opens a session with a custom codec.
    pub fn with_codec(config: SessionConfig, codec: Arc<dyn Codec>) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(ReaderCache::new(
            config.effective_cache_memory_limit(),
            config.cache_max_blocks,
        ));
        let pool = if config.worker_threads > 1 {
            Some(Arc::new(DecompressPool::new(config.worker_threads)?))
        } else {
            None
        };

        debug!(
            "Opened session: {} workers, {} byte cache budget, {} byte blocks",
            config.worker_threads,
            cache.memory_limit()?,
            config.block_size
        );

        Ok(Self {
            config,
            codec,
            cache,
            pool,
        })
    }

    /// The configuration the session was opened with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    pub fn cache(&self) -> &Arc<ReaderCache> {
        &self.cache
    }

    /// The decompression pool, if more than one worker is configured.
    pub fn pool(&self) -> Option<&Arc<DecompressPool>> {
        self.pool.as_ref()
    }

    /// Stops the decompression workers. Streams that still need
    /// asynchronous decompression afterwards fail with `PoolClosed`.
    pub fn shutdown(&self) -> Result<()> {
        match &self.pool {
            Some(pool) => pool.shutdown(),
            None => Ok(()),
        }
    }
}
