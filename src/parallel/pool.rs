//! Fixed-size decompression worker pool.
//!
//! Every worker owns exactly one job slot. A slot carries two gates: `start`,
//! raised when a job has been placed in the slot, and `end`, which is open
//! while the slot is idle. Dispatch picks slots round-robin and blocks on the
//! chosen slot's `end` gate until its previous job has finished, which bounds
//! the number of outstanding jobs to the number of workers.
//!
//! ```text
//!   caller                      slot[i]                     worker[i]
//!   submit ── wait end ──▶  pending = job, busy ── start ──▶ run job
//!      ◀──────────── JobHandle (promise)                      fulfill
//!                                 busy = false ◀── end ───────┘
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use log::{debug, error, trace, warn};

use crate::compression::Codec;
use crate::error::{lock_poisoned, BlockzipError, Result};
use crate::parallel::promise::Promise;

/// Operation bound to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Expand the input into exactly `expected_len` bytes.
    Decompress,
}

/// What happens to the job's input once the result is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// The owning buffer releases its compressed region on completion.
    SingleBuffer,
    /// The owning buffer keeps its compressed region.
    KeepInput,
}

/// Scheduling hint for the workers. Never affects results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPriority {
    Low,
    Normal,
    High,
}

impl WorkerPriority {
    fn as_u8(self) -> u8 {
        match self {
            WorkerPriority::Low => 0,
            WorkerPriority::Normal => 1,
            WorkerPriority::High => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerPriority::Low,
            2 => WorkerPriority::High,
            _ => WorkerPriority::Normal,
        }
    }
}

/// A unit of work for the pool: the input bytes of one buffer, the operation
/// to apply and the codec to apply it with.
#[derive(Debug)]
pub struct DecompressJob {
    pub operation: Operation,
    pub input: Bytes,
    pub expected_len: usize,
    pub codec: Arc<dyn Codec>,
}

impl DecompressJob {
    /// Creates a decompression job.
    pub fn new(input: Bytes, expected_len: usize, codec: Arc<dyn Codec>) -> Self {
        Self {
            operation: Operation::Decompress,
            input,
            expected_len,
            codec,
        }
    }

    /// Runs the job on the current thread.
    pub fn run(self) -> Result<Vec<u8>> {
        match self.operation {
            Operation::Decompress => self.codec.decompress(&self.input, self.expected_len),
        }
    }
}

/// Handle to a dispatched job.
#[derive(Debug)]
pub struct JobHandle {
    slot: usize,
    mode: JobMode,
    completion: Promise<Result<Vec<u8>>>,
}

impl JobHandle {
    /// Index of the slot the job was dispatched to.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The mode the job was started in.
    pub fn mode(&self) -> JobMode {
        self.mode
    }

    /// Returns true once the worker has produced a result.
    pub fn is_finished(&self) -> Result<bool> {
        self.completion.is_fulfilled()
    }

    /// Blocks until the job completes and returns its output. Errors raised
    /// on the worker are returned here.
    pub fn wait(self) -> Result<Vec<u8>> {
        self.completion.wait()?
    }
}

struct Dispatched {
    job: DecompressJob,
    completion: Promise<Result<Vec<u8>>>,
}

struct SlotState {
    /// Job placed by `submit`, not yet picked up by the worker.
    pending: Option<Dispatched>,
    /// True from dispatch until the worker has finished the job.
    busy: bool,
    closed: bool,
}

struct Slot {
    index: usize,
    state: Mutex<SlotState>,
    start: Condvar,
    end: Condvar,
    priority: AtomicU8,
}

/// Fixed set of long-lived decompression workers.
pub struct DecompressPool {
    slots: Vec<Arc<Slot>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next: AtomicUsize,
    closed: AtomicBool,
}

impl DecompressPool {
    /// Spawns `worker_threads` workers (at least one).
    pub fn new(worker_threads: usize) -> Result<Self> {
        let worker_threads = worker_threads.max(1);
        let mut slots = Vec::with_capacity(worker_threads);
        let mut workers = Vec::with_capacity(worker_threads);

        for index in 0..worker_threads {
            let slot = Arc::new(Slot {
                index,
                state: Mutex::new(SlotState {
                    pending: None,
                    busy: false,
                    closed: false,
                }),
                start: Condvar::new(),
                end: Condvar::new(),
                priority: AtomicU8::new(WorkerPriority::Normal.as_u8()),
            });

            let slot_clone = Arc::clone(&slot);
            let handle = thread::Builder::new()
                .name(format!("blockzip-worker-{}", index))
                .spawn(move || Self::worker_loop(slot_clone))?;

            slots.push(slot);
            workers.push(handle);
        }

        Ok(Self {
            slots,
            workers: Mutex::new(workers),
            next: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Number of workers (and slots).
    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns true once `shutdown` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Dispatches a job to the next slot.
    ///
    /// Blocks while the chosen slot is still running its previous job.
    pub fn submit(&self, job: DecompressJob, mode: JobMode) -> Result<JobHandle> {
        if self.is_closed() {
            return Err(BlockzipError::PoolClosed);
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let slot = &self.slots[index];

        let mut state = slot.state.lock().map_err(lock_poisoned)?;
        while state.busy && !state.closed {
            state = slot.end.wait(state).map_err(lock_poisoned)?;
        }
        if state.closed {
            return Err(BlockzipError::PoolClosed);
        }

        let completion = Promise::new();
        state.pending = Some(Dispatched {
            job,
            completion: completion.clone(),
        });
        state.busy = true;
        slot.start.notify_one();
        trace!("Dispatched job to slot {}", index);

        Ok(JobHandle {
            slot: index,
            mode,
            completion,
        })
    }

    /// Sets the scheduling hint for every worker.
    pub fn set_priority(&self, priority: WorkerPriority) {
        for slot in &self.slots {
            slot.priority.store(priority.as_u8(), Ordering::Relaxed);
        }
    }

    /// Current scheduling hint of the given slot.
    pub fn priority(&self, slot: usize) -> Option<WorkerPriority> {
        self.slots
            .get(slot)
            .map(|s| WorkerPriority::from_u8(s.priority.load(Ordering::Relaxed)))
    }

    /// Stops the workers.
    ///
    /// Jobs that were dispatched but not yet picked up fail with
    /// [`BlockzipError::PoolClosed`]; a job already running finishes first.
    pub fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        for slot in &self.slots {
            let mut state = slot.state.lock().map_err(lock_poisoned)?;
            state.closed = true;
            if let Some(dispatched) = state.pending.take() {
                let _ = dispatched.completion.fulfill(Err(BlockzipError::PoolClosed));
                state.busy = false;
            }
            slot.start.notify_all();
            slot.end.notify_all();
        }

        let handles = std::mem::take(&mut *self.workers.lock().map_err(lock_poisoned)?);
        for (i, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.join() {
                error!("Failed to join decompression worker {}: {:?}", i, e);
            }
        }

        debug!("Decompression pool with {} workers shut down", self.slots.len());
        Ok(())
    }

    fn next_job(slot: &Slot) -> Option<Dispatched> {
        let mut state = match slot.state.lock() {
            Ok(state) => state,
            Err(e) => {
                error!("Worker {} found a poisoned slot: {}", slot.index, e);
                return None;
            }
        };

        loop {
            if state.closed {
                return None;
            }
            if let Some(dispatched) = state.pending.take() {
                return Some(dispatched);
            }
            state = match slot.start.wait(state) {
                Ok(state) => state,
                Err(e) => {
                    error!("Worker {} failed waiting for a job: {}", slot.index, e);
                    return None;
                }
            };
        }
    }

    fn worker_loop(slot: Arc<Slot>) {
        debug!("Decompression worker {} starting", slot.index);

        while let Some(dispatched) = Self::next_job(&slot) {
            if WorkerPriority::from_u8(slot.priority.load(Ordering::Relaxed)) == WorkerPriority::Low {
                thread::yield_now();
            }

            let Dispatched { job, completion } = dispatched;
            let result = panic::catch_unwind(AssertUnwindSafe(|| job.run())).unwrap_or_else(|_| {
                Err(BlockzipError::Decompression(
                    "codec panicked on a worker thread".to_string(),
                ))
            });

            if let Err(e) = completion.fulfill(result) {
                error!("Worker {} could not publish a result: {}", slot.index, e);
            }
            trace!("Worker {} finished a job", slot.index);

            match slot.state.lock() {
                Ok(mut state) => {
                    state.busy = false;
                    slot.end.notify_all();
                }
                Err(e) => {
                    error!("Worker {} found a poisoned slot: {}", slot.index, e);
                    break;
                }
            }
        }

        debug!("Decompression worker {} exiting", slot.index);
    }
}

impl std::fmt::Debug for DecompressPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecompressPool")
            .field("workers", &self.slots.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for DecompressPool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Failed to shut down decompression pool: {}", e);
        }
    }
}
