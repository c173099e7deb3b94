//! Lightweight mutex built from a contention counter and a [`Semaphore`].
//!
//! `lock` takes an uncontended fast path — a single `fetch_add` with no
//! syscall — and only touches the semaphore when another holder exists.
//! `unlock` mirrors it: the semaphore is signalled only when the counter
//! says a waiter is queued.
//!
//! The pool uses this for the submit side of each worker's deque, where the
//! common case is exactly one submitter and the lock is pure fast path.

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};

#[cfg(not(all(test, loom)))]
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(all(test, loom))]
use loom::sync::atomic::{AtomicUsize, Ordering};

use crate::sem::Semaphore;

/// Mutual exclusion built on [`Semaphore`], guarding a `T`.
///
/// # Invariant
///
/// `contention` counts the holder plus queued waiters. A thread that bumps
/// it from 0 owns the lock outright; any other thread sleeps on the
/// semaphore until the holder hands the lock over in `unlock`.
pub struct Mutex<T> {
    contention: AtomicUsize,
    sem: Semaphore,
    data: UnsafeCell<T>,
}

// SAFETY: the contention/semaphore protocol grants exclusive access to
// `data` between `lock` and guard drop.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

/// RAII guard; the lock is handed to the next waiter (or released) on drop.
pub struct MutexGuard<'a, T> {
    lock: &'a Mutex<T>,
}

impl<T> Mutex<T> {
    /// Creates an unlocked mutex guarding `value`.
    pub fn new(value: T) -> Self {
        Self {
            contention: AtomicUsize::new(0),
            sem: Semaphore::new(0),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, blocking while another thread holds it.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        if self.contention.fetch_add(1, Ordering::Acquire) > 0 {
            // someone holds or is queued for the lock; sleep until the
            // current holder hands it to us
            self.sem.wait();
        }
        MutexGuard { lock: self }
    }

    /// Consumes the mutex and returns the guarded value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// Accesses the guarded value through an exclusive borrow, no locking.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        if self.lock.contention.fetch_sub(1, Ordering::Release) > 1 {
            // a waiter is queued; hand the lock over
            self.lock.sem.signal();
        }
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard exists iff this thread holds the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above; `&mut self` rules out aliasing through the guard.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("contention", &self.contention.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
