//! Lock-free Chase-Lev work-stealing deque.
//!
//! # Design
//!
//! Dynamic-circular-array variant of Chase & Lev, "Dynamic Circular
//! Work-Stealing Deque" (SPAA 2005), with the memory-ordering refinement of
//! Lê, Pop, Cohen and Nardelli, "Correct and Efficient Work-Stealing for
//! Weak Memory Models" (PPoPP 2013).
//!
//! The owner pushes and pops at `bottom` (LIFO); any number of thieves take
//! from `top` (FIFO). Both counters are monotonic signed 64-bit logical
//! indices; the backing [`CircularBuffer`] masks them into a power-of-two
//! ring and is swapped for a doubled copy when full. Grown-out buffers are
//! *retired*, not freed: a thief may still read through a pointer it loaded
//! before the swap, so old buffers stay alive until the deque itself drops.
//!
//! # Handles
//!
//! [`Deque`] is the owner handle: `push`/`pop` take `&mut self`, which makes
//! the single-producer contract a compile-time fact instead of a calling
//! convention. [`Stealer`] is the shared handle (`Clone + Send + Sync`);
//! `steal` is safe from any thread, including the owner's.
//!
//! # Element representation
//!
//! Cells hold a fixed-width word chosen by the [`Repr`] parameter:
//! [`Inline`] stores `Copy` payloads directly (no allocation anywhere on the
//! hot path), [`Boxed`] stores an owning pointer to a heap copy (works for
//! any `Send` payload and keeps cells word-sized). `Boxed` is the default
//! because the inline form needs a `T: Copy` bound the type system must be
//! told about explicitly.
//!
//! # Ordering rationale
//!
//! The seq_cst fences in `pop` and `steal`, together with the seq_cst
//! success ordering of the CAS on `top`, totally order the commit events of
//! competing pop/steal pairs; that is what rules out both sides walking away
//! with the last element. Everything else is relaxed or acquire/release:
//! `bottom` has a single writer, and every `top` advance is a CAS.
//!
//! # Safety
//!
//! Cell reads in `steal` may race with the owner's writes and observe torn
//! words; a torn word is only ever materialized into a `T` after the CAS on
//! `top` proves the index was committed, at which point the read is known to
//! have happened on a quiescent cell. See the per-operation SAFETY notes.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicI64, AtomicPtr, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::buffer::CircularBuffer;

/// Default backing capacity for [`Deque::default`].
pub const DEFAULT_CAPACITY: i64 = 1024;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Inline {}
    impl Sealed for super::Boxed {}
}

/// Selects how a deque materializes its elements inside buffer cells.
///
/// Implemented by [`Inline`] and [`Boxed`]; the trait is sealed because the
/// deque's safety argument is written against exactly these two layouts.
pub trait Repr<T>: sealed::Sealed + 'static {
    /// Fixed-width cell word.
    #[doc(hidden)]
    type Word: Copy;

    /// Turns a value into a cell word. The only operation allowed to
    /// allocate.
    #[doc(hidden)]
    fn encode(value: T) -> Self::Word;

    /// Rematerializes a committed word into a value.
    ///
    /// # Safety
    /// `word` must come from `encode` and be committed to exactly one caller
    /// (the deque's CAS on `top` provides this).
    #[doc(hidden)]
    unsafe fn decode(word: Self::Word) -> T;

    /// Releases a word that was pushed but never taken.
    ///
    /// # Safety
    /// Same provenance requirement as `decode`; called only while tearing
    /// down a deque no other thread can reach.
    #[doc(hidden)]
    unsafe fn drop_word(word: Self::Word);
}

/// Cells hold the value itself. Requires `T: Copy`; push, pop and steal
/// never allocate.
pub enum Inline {}

/// Cells hold an owning pointer to a heap copy of the value. Works for any
/// `Send` payload; `push` allocates, a committed take frees.
pub enum Boxed {}

impl<T: Copy + Send + 'static> Repr<T> for Inline {
    type Word = T;

    #[inline]
    fn encode(value: T) -> T {
        value
    }

    #[inline]
    unsafe fn decode(word: T) -> T {
        word
    }

    #[inline]
    unsafe fn drop_word(_word: T) {
        // Copy implies no destructor
    }
}

impl<T: Send + 'static> Repr<T> for Boxed {
    type Word = *mut T;

    #[inline]
    fn encode(value: T) -> *mut T {
        Box::into_raw(Box::new(value))
    }

    #[inline]
    unsafe fn decode(word: *mut T) -> T {
        *Box::from_raw(word)
    }

    #[inline]
    unsafe fn drop_word(word: *mut T) {
        drop(Box::from_raw(word));
    }
}

/// State shared between the owner handle and all stealers.
///
/// # Invariants (stable state, between operations)
/// - `top <= bottom` and `bottom - top <= capacity`.
/// - Cells at logical indices `[top, bottom)` of the current buffer are
///   initialized words.
/// - `retired` is written only by the owner (under `&mut Deque`) and read
///   only by `drop`, which runs when no handle is left.
struct Inner<T, R: Repr<T>> {
    top: CachePadded<AtomicI64>,
    bottom: CachePadded<AtomicI64>,
    buffer: AtomicPtr<CircularBuffer<R::Word>>,
    retired: UnsafeCell<Vec<NonNull<CircularBuffer<R::Word>>>>,
    _marker: PhantomData<T>,
}

// SAFETY: the deque protocol confines cell writes and `retired` mutation to
// the single owner (`&mut` methods), and every cross-thread element handoff
// is committed by the CAS on `top`. Elements are `T: Send`.
unsafe impl<T: Send, R: Repr<T>> Send for Inner<T, R> {}
unsafe impl<T: Send, R: Repr<T>> Sync for Inner<T, R> {}

impl<T, R: Repr<T>> Inner<T, R> {
    fn size(&self) -> usize {
        let b = self.bottom.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Relaxed);
        if b > t {
            (b - t) as usize
        } else {
            0
        }
    }

    fn capacity(&self) -> i64 {
        // SAFETY: the current buffer outlives every handle.
        unsafe { (*self.buffer.load(Ordering::Relaxed)).capacity() }
    }

    fn steal(&self) -> Option<T> {
        let t = self.top.load(Ordering::Acquire);
        fence(Ordering::SeqCst);
        let b = self.bottom.load(Ordering::Acquire);

        if t >= b {
            // observed empty
            return None;
        }

        // C++ would use consume here; acquire is the Rust equivalent.
        let buf = self.buffer.load(Ordering::Acquire);

        // SAFETY: `buf` is the current buffer or a retired one, both alive
        // until the deque drops. The word may be torn or stale; it is not
        // trusted until the CAS below commits index `t`.
        let word = unsafe { (*buf).get(t) };

        if self
            .top
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            // SAFETY: the CAS committed index `t` to this thief. Commitment
            // implies `t` was inside the live window when the word was read,
            // and the owner never rewrites a cell inside the live window, so
            // the read was not torn after all.
            Some(unsafe { R::decode(word.assume_init()) })
        } else {
            // lost the race; the word (possibly garbage) is forgotten
            None
        }
    }
}

impl<T, R: Repr<T>> Drop for Inner<T, R> {
    fn drop(&mut self) {
        let t = *self.top.get_mut();
        let b = *self.bottom.get_mut();
        let buf = *self.buffer.get_mut();

        // SAFETY: `&mut self` means no other handle exists; `[t, b)` are the
        // un-taken elements and both buffer pointers came from Box::into_raw.
        unsafe {
            for i in t..b {
                R::drop_word((*buf).get(i).assume_init());
            }
            drop(Box::from_raw(buf));
            for old in self.retired.get_mut().drain(..) {
                drop(Box::from_raw(old.as_ptr()));
            }
        }
    }
}

/// Owner handle of a work-stealing deque.
///
/// `push` and `pop` operate on the bottom end and are restricted to the
/// owner through `&mut self`; hand out [`Stealer`]s to other threads.
pub struct Deque<T, R: Repr<T> = Boxed> {
    inner: Arc<Inner<T, R>>,
}

/// Shared stealing handle. Cloning is cheap; all clones take from the same
/// deque.
pub struct Stealer<T, R: Repr<T> = Boxed> {
    inner: Arc<Inner<T, R>>,
}

impl<T, R: Repr<T>> Deque<T, R> {
    /// Creates a deque with the given backing capacity.
    ///
    /// The deque grows past `capacity` on demand; the value only sizes the
    /// first buffer.
    ///
    /// # Panics
    ///
    /// Panics unless `capacity` is a positive power of two.
    pub fn new(capacity: i64) -> Self {
        assert!(
            capacity > 0 && capacity & (capacity - 1) == 0,
            "deque capacity must be a positive power of two, got {capacity}"
        );

        let buffer = Box::into_raw(Box::new(CircularBuffer::new(capacity)));

        Self {
            inner: Arc::new(Inner {
                top: CachePadded::new(AtomicI64::new(0)),
                bottom: CachePadded::new(AtomicI64::new(0)),
                buffer: AtomicPtr::new(buffer),
                retired: UnsafeCell::new(Vec::with_capacity(32)),
                _marker: PhantomData,
            }),
        }
    }

    /// Creates a stealing handle for this deque.
    pub fn stealer(&self) -> Stealer<T, R> {
        Stealer {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of elements currently in the deque. Advisory: concurrent
    /// operations can make it stale before it returns.
    #[inline]
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// `size() == 0`, with the same advisory caveat.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Capacity of the current backing buffer.
    #[inline]
    pub fn capacity(&self) -> i64 {
        self.inner.capacity()
    }

    /// Pushes `value` onto the bottom of the deque, growing the backing
    /// buffer if it is full.
    pub fn push(&mut self, value: T) {
        let inner = &*self.inner;

        let b = inner.bottom.load(Ordering::Relaxed);
        let t = inner.top.load(Ordering::Acquire);
        let mut buf = inner.buffer.load(Ordering::Relaxed);

        // SAFETY: `&mut self` makes this thread the only writer of cells,
        // `buffer`, and `retired`. `[t, b)` is initialized per the struct
        // invariant, which is what `grow` requires.
        unsafe {
            if b - t > (*buf).capacity() - 1 {
                let grown = Box::into_raw(Box::new((*buf).grow(t, b)));
                inner.buffer.store(grown, Ordering::Relaxed);
                // stealers may still read through the old pointer; keep it
                (*inner.retired.get()).push(NonNull::new_unchecked(buf));
                buf = grown;
            }
            (*buf).set(b, R::encode(value));
        }

        // publish the cell before publishing the new bottom
        fence(Ordering::Release);
        inner.bottom.store(b + 1, Ordering::Relaxed);
    }

    /// Pops the most recently pushed element that has not been taken.
    pub fn pop(&mut self) -> Option<T> {
        let inner = &*self.inner;

        let b = inner.bottom.load(Ordering::Relaxed) - 1;
        let buf = inner.buffer.load(Ordering::Relaxed);
        // tentatively claim the last slot
        inner.bottom.store(b, Ordering::Relaxed);

        fence(Ordering::SeqCst);

        let t = inner.top.load(Ordering::Relaxed);

        if t > b {
            // empty; undo the claim
            inner.bottom.store(b + 1, Ordering::Relaxed);
            return None;
        }

        // SAFETY: this owner wrote cell `b` and no stealer past `t <= b` can
        // have overwritten it; the word is a valid, un-torn element.
        let word = unsafe { (*buf).get(b).assume_init() };

        if t == b {
            // single element left: race the stealers for it
            let won = inner
                .top
                .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok();
            inner.bottom.store(b + 1, Ordering::Relaxed);
            if won {
                // SAFETY: the CAS committed index `b` to the owner.
                Some(unsafe { R::decode(word) })
            } else {
                // a stealer committed it first and will free it
                None
            }
        } else {
            // SAFETY: `t < b`, so no stealer can commit index `b`.
            Some(unsafe { R::decode(word) })
        }
    }

    /// Steals from the top end. Identical to [`Stealer::steal`]; the CAS on
    /// `top` serializes it with every other thief.
    #[inline]
    pub fn steal(&self) -> Option<T> {
        self.inner.steal()
    }
}

impl<T, R: Repr<T>> Default for Deque<T, R> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T, R: Repr<T>> fmt::Debug for Deque<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deque")
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl<T, R: Repr<T>> Stealer<T, R> {
    /// Takes the oldest un-taken element, or `None` on "empty or lost race".
    /// Callers that want to distinguish the two cases simply call again.
    #[inline]
    pub fn steal(&self) -> Option<T> {
        self.inner.steal()
    }

    /// Advisory element count; see [`Deque::size`].
    #[inline]
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// `size() == 0`, advisory.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Capacity of the current backing buffer.
    #[inline]
    pub fn capacity(&self) -> i64 {
        self.inner.capacity()
    }
}

impl<T, R: Repr<T>> Clone for Stealer<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, R: Repr<T>> fmt::Debug for Stealer<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stealer")
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .finish()
    }
}
