// src/workload/counter.rs

//! Per-workload count of runs that have been launched and not yet completed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

/// Mutex-guarded count of active runs.
///
/// Owned by exactly one workload. The count never goes below zero; every
/// launch increments it once and every completion decrements it once (see
/// [`CounterRelease`]).
#[derive(Debug, Default)]
pub struct ExecutionCounter {
    count: Mutex<usize>,
}

impl ExecutionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> usize {
        *self.lock()
    }

    pub fn inc(&self) {
        *self.lock() += 1;
    }

    pub fn dec(&self) {
        let mut count = self.lock();
        if *count == 0 {
            drop(count);
            warn!("execution counter decremented below zero; ignoring");
            return;
        }
        *count -= 1;
    }

    /// Increment only if the count is below `max`. Returns whether a slot was
    /// taken.
    pub fn try_acquire(&self, max: usize) -> bool {
        let mut count = self.lock();
        if *count < max {
            *count += 1;
            true
        } else {
            false
        }
    }
}

/// Decrements the counter exactly once when dropped, including during a
/// panic unwind.
#[derive(Debug)]
pub struct CounterRelease {
    counter: Arc<ExecutionCounter>,
}

impl CounterRelease {
    pub fn new(counter: Arc<ExecutionCounter>) -> Self {
        Self { counter }
    }
}

impl Drop for CounterRelease {
    fn drop(&mut self) {
        self.counter.dec();
    }
}
