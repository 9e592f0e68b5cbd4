//! Completion cell shared by a dispatched decompression job and its handle.
//!
//! The worker publishes the job's outcome once; the buffer that submitted
//! the job takes it once.

use std::sync::{Arc, Condvar, Mutex};

use crate::error::{lock_poisoned, BlockzipError, Result};

#[derive(Debug)]
enum Slot<T> {
    Pending,
    Ready(T),
    Taken,
}

#[derive(Debug)]
struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

/// One end of a completion cell. Clones share the cell: the pool keeps one
/// to [`fulfill`](Promise::fulfill), the job handle keeps the other to
/// [`wait`](Promise::wait).
#[derive(Debug)]
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::Pending),
                ready: Condvar::new(),
            }),
        }
    }

    /// Publishes `value` and wakes the waiter. Fails if a value was already
    /// published.
    pub fn fulfill(&self, value: T) -> Result<()> {
        let mut slot = self.shared.slot.lock().map_err(lock_poisoned)?;
        if !matches!(*slot, Slot::Pending) {
            return Err(BlockzipError::Other(
                "Job result was already published".to_string(),
            ));
        }
        *slot = Slot::Ready(value);
        self.shared.ready.notify_all();
        Ok(())
    }

    /// Blocks until the value is published, then takes it.
    pub fn wait(self) -> Result<T> {
        let mut slot = self.shared.slot.lock().map_err(lock_poisoned)?;
        while matches!(*slot, Slot::Pending) {
            slot = self.shared.ready.wait(slot).map_err(lock_poisoned)?;
        }

        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Ready(value) => Ok(value),
            _ => Err(BlockzipError::Other(
                "Job result was already taken".to_string(),
            )),
        }
    }

    /// True once a value is published and not yet taken.
    pub fn is_fulfilled(&self) -> Result<bool> {
        let slot = self.shared.slot.lock().map_err(lock_poisoned)?;
        Ok(matches!(*slot, Slot::Ready(_)))
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}
