//! Asynchronous decompression.
//!
//! A [`DecompressPool`] owns a fixed set of worker threads, each bound to one
//! reusable job slot. Jobs hand their result back through a [`Promise`], so a
//! failure on a worker reaches the thread that waits for the job.

pub mod pool;
pub mod promise;

pub use pool::{DecompressJob, DecompressPool, JobHandle, JobMode, Operation, WorkerPriority};
pub use promise::Promise;
