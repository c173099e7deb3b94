//! Work-stealing thread pool.
//!
//! # Architecture
//!
//! One [`Deque`] and one [`Semaphore`] per worker. Submissions pick a slot
//! round-robin through an atomic rotor, push into that slot's deque,
//! increment the global pending counter and signal the slot's semaphore.
//! The owning worker wakes, drains its own queue LIFO-from-its-end via
//! `steal` (the CAS serializes it with thieves), and after a spin threshold
//! with an empty local queue starts stealing FIFO from random victims. A
//! worker reparks only once the pending counter reads zero.
//!
//! ```text
//!  submit ──rotor──► queues[s] ──┐          ┌─► worker s: own-queue bias
//!           (mutex, submit-only) │  signal  │        │ 100 spins
//!  pending += 1                  └──sems[s]─┘        ▼
//!                                              random victim steal
//!  steal ok: pending -= 1, run task;  repark when pending == 0
//! ```
//!
//! # Correctness invariants
//!
//! - Every submitted task is either invoked by exactly one worker or
//!   dropped during shutdown, resolving its receiver with
//!   [`TaskError::Cancelled`](crate::TaskError::Cancelled).
//! - A submission's push happens-before its signal, which happens-before
//!   the woken worker's steal.
//! - The drain loop takes no lock: workers touch only stealers, the pending
//!   counter and their own semaphore. The per-queue mutex guards the push
//!   side and is only ever contended by simultaneous submitters that
//!   collide on one slot.
//!
//! # Shutdown
//!
//! Dropping the pool sets every worker's stop flag, signals every
//! semaphore, and joins. A worker woken by the shutdown signal still drains
//! while `pending > 0`, so in practice queued work completes; the pinned
//! guarantee is that tasks already stolen run to completion and anything
//! left in a queue afterwards is cancelled.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_utils::CachePadded;

use crate::deque::{Deque, Stealer};
use crate::metrics::{MetricsSnapshot, WorkerCounters};
use crate::mutex::Mutex;
use crate::rng::Xoroshiro128StarStar;
use crate::sem::Semaphore;
use crate::task::{channel, Receiver, Task};

/// Pool configuration.
///
/// Defaults are the ones the original tuning settled on; profile with your
/// workload before changing them.
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: usize,

    /// Seed for victim selection. Same seed + same submission order =
    /// reproducible steal pattern (modulo timing).
    pub seed: u64,

    /// Drain-loop iterations that prefer the worker's own queue before
    /// victim selection randomizes.
    pub spin_before_random: u32,

    /// Initial capacity of each worker's deque. Must be a positive power of
    /// two; queues grow past it on demand.
    pub queue_capacity: i64,
}

impl PoolConfig {
    /// Validates the configuration. Panics on invalid values.
    pub fn validate(&self) {
        assert!(self.workers > 0, "workers must be > 0");
        assert!(
            self.queue_capacity > 0 && self.queue_capacity & (self.queue_capacity - 1) == 0,
            "queue_capacity must be a positive power of two"
        );
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(1, |n| n.get()),
            seed: 0x853c49e6748fea9b,
            spin_before_random: 100,
            queue_capacity: crate::deque::DEFAULT_CAPACITY,
        }
    }
}

/// Per-worker shared state: the parking semaphore, the stealing side of the
/// worker's deque, its stop flag and its counters.
struct WorkerSlot {
    sem: Semaphore,
    stealer: Stealer<Task>,
    stop: AtomicBool,
    counters: WorkerCounters,
}

/// State shared between submitters and workers.
struct Shared {
    slots: Box<[CachePadded<WorkerSlot>]>,
    /// Submitted-but-not-yet-invoked task count. Incremented per submission,
    /// decremented by the stealing worker before it runs the task.
    pending: CachePadded<AtomicI64>,
}

/// Work-stealing thread pool.
///
/// # Example
///
/// ```
/// use pilfer::ThreadPool;
///
/// let pool = ThreadPool::new(4);
/// let rx = pool.submit(|| 6 * 7);
/// assert_eq!(rx.recv(), Ok(42));
/// ```
pub struct ThreadPool {
    shared: Arc<Shared>,
    /// Push side of each worker's deque. Locked only by submitters; the
    /// mutex serializes the rare case of two submitters colliding on one
    /// slot modulo `workers`.
    queues: Vec<Mutex<Deque<Task>>>,
    /// Round-robin submission cursor.
    rotor: AtomicUsize,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Creates a pool with `nthreads` workers.
    ///
    /// # Panics
    ///
    /// Panics if `nthreads` is 0.
    pub fn new(nthreads: usize) -> Self {
        Self::with_config(PoolConfig {
            workers: nthreads,
            ..PoolConfig::default()
        })
    }

    /// Creates a pool from an explicit configuration.
    pub fn with_config(cfg: PoolConfig) -> Self {
        cfg.validate();

        let mut queues = Vec::with_capacity(cfg.workers);
        let mut slots = Vec::with_capacity(cfg.workers);
        for _ in 0..cfg.workers {
            let queue: Deque<Task> = Deque::new(cfg.queue_capacity);
            slots.push(CachePadded::new(WorkerSlot {
                sem: Semaphore::new(0),
                stealer: queue.stealer(),
                stop: AtomicBool::new(false),
                counters: WorkerCounters::new(),
            }));
            queues.push(Mutex::new(queue));
        }

        let shared = Arc::new(Shared {
            slots: slots.into_boxed_slice(),
            pending: CachePadded::new(AtomicI64::new(0)),
        });

        // One master stream, jumped once per worker: disjoint victim
        // sequences without per-thread reseeding.
        let mut streams = Xoroshiro128StarStar::new(cfg.seed);

        let mut workers = Vec::with_capacity(cfg.workers);
        for id in 0..cfg.workers {
            streams.jump();
            let rng = streams.clone();
            let shared = Arc::clone(&shared);
            let spin_limit = cfg.spin_before_random;

            let handle = thread::Builder::new()
                .name(format!("pilfer-worker-{id}"))
                .spawn(move || worker_loop(id, spin_limit, rng, &shared))
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }

        Self {
            shared,
            queues,
            rotor: AtomicUsize::new(0),
            workers,
        }
    }

    /// Submits `f` for execution and returns the receiving half of its
    /// result channel.
    ///
    /// Any thread may submit, including pool workers; a worker submitting
    /// to itself goes through the same rotor path as everyone else.
    pub fn submit<F, T>(&self, f: F) -> Receiver<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = channel();
        let task = Task::new(f, tx);

        let slot = self.rotor.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        self.shared.pending.fetch_add(1, Ordering::Relaxed);
        self.queues[slot].lock().push(task);
        self.shared.slots[slot].sem.signal();

        rx
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.queues.len()
    }

    /// Sums every worker's counters. Approximate while workers run.
    pub fn metrics(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::default();
        for slot in self.shared.slots.iter() {
            snapshot.merge(&slot.counters);
        }
        snapshot
    }
}

impl Default for ThreadPool {
    /// A pool sized to the machine's available parallelism.
    fn default() -> Self {
        Self::with_config(PoolConfig::default())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        for slot in self.shared.slots.iter() {
            slot.stop.store(true, Ordering::Release);
        }
        // wake every parked worker so it can observe its stop flag
        for slot in self.shared.slots.iter() {
            slot.sem.signal();
        }
        for handle in self.workers.drain(..) {
            // worker bodies catch task panics; join errors would indicate an
            // internal invariant violation, which Drop cannot surface
            let _ = handle.join();
        }
        // `queues` and `shared` drop next; tasks still sitting in a deque
        // are dropped with it, resolving their receivers with `Cancelled`
    }
}

/// Worker body: park on the semaphore, drain until the pending counter hits
/// zero, re-check the stop flag, repeat.
fn worker_loop(id: usize, spin_limit: u32, mut rng: Xoroshiro128StarStar, shared: &Shared) {
    let nworkers = shared.slots.len();
    let me = &shared.slots[id];

    loop {
        me.sem.wait();

        let mut spin: u32 = 0;
        loop {
            // A freshly woken worker almost always has work in its own
            // queue (submissions target a specific slot), so the first
            // `spin_limit` iterations stay local; after that an empty local
            // queue means the wakeup was for cross-queue help.
            let victim = if spin < spin_limit || !me.stealer.is_empty() {
                id
            } else {
                rng.next_usize(nworkers)
            };
            spin = spin.wrapping_add(1);

            me.counters.record_steal_attempt();
            if let Some(task) = shared.slots[victim].stealer.steal() {
                shared.pending.fetch_sub(1, Ordering::Release);
                me.counters.record_steal_success();
                task.run();
                me.counters.record_task_executed();
            }

            if shared.pending.load(Ordering::Acquire) <= 0 {
                break;
            }
        }

        if me.stop.load(Ordering::Acquire) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskError;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn submit_runs_and_delivers() {
        let pool = ThreadPool::new(2);
        let rx = pool.submit(|| 1 + 1);
        assert_eq!(rx.recv(), Ok(2));
    }

    #[test]
    fn single_worker_pool_executes_everything() {
        let pool = ThreadPool::new(1);
        let receivers: Vec<_> = (0..100).map(|i| pool.submit(move || i * 2)).collect();
        for (i, rx) in receivers.into_iter().enumerate() {
            assert_eq!(rx.recv(), Ok(i * 2));
        }
    }

    #[test]
    fn worker_submitting_to_the_pool_does_not_deadlock() {
        let pool = Arc::new(ThreadPool::new(2));
        let inner_pool = Arc::clone(&pool);
        let rx = pool.submit(move || {
            let nested = inner_pool.submit(|| 5);
            // release the worker-held pool handle before the result lands so
            // the final drop (and the destructor's joins) happens on the
            // test thread, never on a worker joining itself
            drop(inner_pool);
            nested.recv()
        });
        assert_eq!(rx.recv(), Ok(Ok(5)));
    }

    #[test]
    fn panicking_task_reports_and_pool_survives() {
        let pool = ThreadPool::new(2);
        let bad = pool.submit::<_, ()>(|| panic!("task exploded"));
        let good = pool.submit(|| 3);
        assert_eq!(
            bad.recv(),
            Err(TaskError::Panicked("task exploded".to_owned()))
        );
        assert_eq!(good.recv(), Ok(3));
        // pool still schedules after the panic
        assert_eq!(pool.submit(|| 4).recv(), Ok(4));
    }

    #[test]
    fn metrics_count_executed_tasks() {
        const TASKS: usize = 200;
        let pool = ThreadPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let receivers: Vec<_> = (0..TASKS)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
            })
            .collect();
        for rx in receivers {
            rx.recv().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), TASKS);

        // a worker bumps its executed counter just after the task's result
        // lands, so give the laggard increments a moment
        let mut snap = pool.metrics();
        while snap.tasks_executed < TASKS as u64 {
            std::thread::yield_now();
            snap = pool.metrics();
        }
        assert_eq!(snap.tasks_executed, TASKS as u64);
        assert!(snap.steal_successes >= snap.tasks_executed);
        assert!(snap.steal_attempts >= snap.steal_successes);
    }

    #[test]
    #[should_panic(expected = "workers must be > 0")]
    fn zero_workers_is_rejected() {
        let _ = ThreadPool::new(0);
    }
}
