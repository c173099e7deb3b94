//! Work-stealing task executor built from two tightly coupled pieces:
//!
//! - [`Deque`]: a lock-free Chase-Lev double-ended queue — LIFO `push`/`pop`
//!   for the owning thread, FIFO `steal` for everyone else, with a growable
//!   backing buffer whose retired generations stay alive for in-flight
//!   thieves.
//! - [`ThreadPool`]: N workers, one deque and one parking semaphore each.
//!   Submissions route round-robin, workers drain their own queue first and
//!   steal from random victims after a spin threshold, and a global pending
//!   counter gates reparking.
//!
//! ```
//! use pilfer::ThreadPool;
//!
//! let pool = ThreadPool::default();
//! let squares: Vec<_> = (0..64u64).map(|i| pool.submit(move || i * i)).collect();
//! for (i, rx) in squares.into_iter().enumerate() {
//!     let i = i as u64;
//!     assert_eq!(rx.recv(), Ok(i * i));
//! }
//! ```
//!
//! The deque is usable on its own for schedulers with different policies:
//!
//! ```
//! use pilfer::deque::{Deque, Inline};
//!
//! let mut dq = Deque::<u64, Inline>::new(1024);
//! let thief = dq.stealer();
//! dq.push(1);
//! dq.push(2);
//! assert_eq!(thief.steal(), Some(1)); // oldest first for thieves
//! assert_eq!(dq.pop(), Some(2));      // newest first for the owner
//! ```
//!
//! # Module map
//!
//! - [`deque`]: the Chase-Lev deque and its element-representation
//!   machinery ([`Inline`](deque::Inline) for `Copy` payloads,
//!   [`Boxed`](deque::Boxed) for everything else).
//! - [`pool`]: the thread pool, its configuration and worker loop.
//! - [`sem`]: the counting semaphore workers park on.
//! - [`mutex`]: a semaphore-backed mutex used on the pool's submit side.
//! - [`rng`]: xoroshiro128** with jump-ahead for disjoint per-worker
//!   victim-selection streams.
//! - [`metrics`]: per-worker counters and their merged snapshot.
//!
//! # Guarantees
//!
//! Every submitted task is invoked at most once and its receiver resolves
//! exactly once: with the return value, with the captured panic, or with a
//! cancellation error if the pool is torn down first. Workers never take a
//! lock while draining.

mod buffer;
pub mod deque;
pub mod metrics;
pub mod mutex;
pub mod pool;
pub mod rng;
pub mod sem;
pub mod task;

pub use deque::{Deque, Stealer};
pub use metrics::MetricsSnapshot;
pub use pool::{PoolConfig, ThreadPool};
pub use task::{Receiver, TaskError};
