//! Counting semaphore used to park idle workers.
//!
//! Mutex + condvar realization: `wait` blocks until a permit is available
//! and consumes it, `signal` deposits one and wakes a single waiter. Permits
//! accumulate, so a `signal` delivered while nobody waits is not lost —
//! which is exactly what the pool's submit path relies on (a worker that is
//! busy draining when a submission signals it must still find the permit on
//! its next `wait`).

#[cfg(not(all(test, loom)))]
use std::sync::{Condvar, Mutex};

#[cfg(all(test, loom))]
use loom::sync::{Condvar, Mutex};

/// Counting semaphore with `wait`/`signal` semantics.
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `initial` permits.
    pub fn new(initial: usize) -> Self {
        Self {
            permits: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    /// Blocks until a permit is available, then consumes it.
    pub fn wait(&self) {
        let mut permits = self.permits.lock().expect("semaphore mutex poisoned");
        while *permits == 0 {
            permits = self
                .available
                .wait(permits)
                .expect("semaphore mutex poisoned");
        }
        *permits -= 1;
    }

    /// Deposits one permit and wakes a waiter if any.
    pub fn signal(&self) {
        let mut permits = self.permits.lock().expect("semaphore mutex poisoned");
        *permits += 1;
        drop(permits);
        self.available.notify_one();
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let permits = self.permits.lock().expect("semaphore mutex poisoned");
        f.debug_struct("Semaphore").field("permits", &*permits).finish()
    }
}
