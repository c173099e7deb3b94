//! Tasks and their one-shot result channels.
//!
//! A [`Task`] is a movable nullary callable: the submitted function, already
//! bound to its arguments, fused to the sending half of a one-shot channel.
//! Invoking the task resolves the channel exactly once — with the function's
//! return value, with [`TaskError::Panicked`] if the function panicked, or
//! with [`TaskError::Cancelled`] if the task is dropped without ever
//! running (the sender's `Drop` covers the pool tearing down with the task
//! still queued).

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};

/// Error delivered through a task's [`Receiver`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskError {
    /// The task's function panicked; the payload message is captured here.
    /// The worker that ran the task is unaffected.
    Panicked(String),
    /// The task was discarded before it could run — the pool was dropped
    /// with the task still sitting in a queue.
    Cancelled,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Panicked(msg) => write!(f, "task panicked: {msg}"),
            TaskError::Cancelled => write!(f, "task cancelled before execution"),
        }
    }
}

impl Error for TaskError {}

enum SlotState<T> {
    /// No result yet; receivers wait on the condvar.
    Pending,
    /// Result delivered, not yet claimed.
    Done(Result<T, TaskError>),
    /// Result moved out by `recv`.
    Taken,
}

struct Channel<T> {
    slot: Mutex<SlotState<T>>,
    ready: Condvar,
}

/// Creates a connected one-shot sender/receiver pair.
pub(crate) fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let chan = Arc::new(Channel {
        slot: Mutex::new(SlotState::Pending),
        ready: Condvar::new(),
    });
    (
        Sender {
            chan: Arc::clone(&chan),
            sent: false,
        },
        Receiver { chan },
    )
}

/// Sending half. Crate-internal: only tasks resolve channels.
pub(crate) struct Sender<T> {
    chan: Arc<Channel<T>>,
    sent: bool,
}

impl<T> Sender<T> {
    /// Delivers the result and wakes the receiver. First delivery wins;
    /// the `Drop` fallback after an explicit send is a no-op.
    pub(crate) fn send(mut self, result: Result<T, TaskError>) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: Result<T, TaskError>) {
        self.sent = true;
        let mut slot = self.chan.slot.lock().expect("result channel poisoned");
        if matches!(*slot, SlotState::Pending) {
            *slot = SlotState::Done(result);
        }
        drop(slot);
        self.chan.ready.notify_all();
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        if !self.sent {
            self.deliver(Err(TaskError::Cancelled));
        }
    }
}

/// Receiving half of a task's result channel, returned by
/// [`ThreadPool::submit`](crate::pool::ThreadPool::submit).
///
/// Single-consumer: [`recv`](Self::recv) consumes the handle.
pub struct Receiver<T> {
    chan: Arc<Channel<T>>,
}

impl<T> Receiver<T> {
    /// Blocks until the task resolves and returns its result.
    pub fn recv(self) -> Result<T, TaskError> {
        let mut slot = self.chan.slot.lock().expect("result channel poisoned");
        loop {
            if matches!(*slot, SlotState::Done(_)) {
                match std::mem::replace(&mut *slot, SlotState::Taken) {
                    SlotState::Done(result) => return result,
                    _ => unreachable!(),
                }
            }
            slot = self.chan.ready.wait(slot).expect("result channel poisoned");
        }
    }

    /// Whether a result is already waiting; `recv` would not block.
    pub fn is_ready(&self) -> bool {
        let slot = self.chan.slot.lock().expect("result channel poisoned");
        matches!(*slot, SlotState::Done(_))
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// A submitted unit of work: the user function bound to its result channel.
///
/// Running consumes the task (`FnOnce` makes at-most-once invocation a type
/// fact); dropping it unrun resolves the receiver with `Cancelled` through
/// the captured sender.
pub(crate) struct Task {
    job: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    pub(crate) fn new<F, T>(f: F, tx: Sender<T>) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        Self {
            job: Box::new(move || {
                match panic::catch_unwind(AssertUnwindSafe(f)) {
                    Ok(value) => tx.send(Ok(value)),
                    Err(payload) => tx.send(Err(TaskError::Panicked(panic_message(&*payload)))),
                }
            }),
        }
    }

    /// Runs the task. Panics from the user function are caught inside the
    /// job and delivered through the channel; this call does not unwind.
    #[inline]
    pub(crate) fn run(self) {
        (self.job)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task")
    }
}

/// Best-effort extraction of a panic payload message.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_owned()
    }
}
