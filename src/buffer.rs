//! Power-of-two circular array backing the deque.
//!
//! # Invariants
//! - `capacity` is a positive power of two and never changes for the life of
//!   a buffer; growth allocates a new buffer.
//! - Logical indices are unbounded `i64`; the cell for index `i` is
//!   `i & mask`.
//! - A cell is initialized iff its logical index lies in the deque's live
//!   window `[top, bottom)` at the time the buffer was (or still is) current.
//!
//! # Threading
//! Cells are accessed with volatile per-cell copies. The deque's fences
//! around `push`, `pop`, and `steal` establish happens-before for the cell
//! contents; a stealer's read may race with an owner's write and observe a
//! torn word, which the caller must discard unless its CAS on `top` commits
//! the index.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;

pub(crate) struct CircularBuffer<W> {
    capacity: i64,
    mask: i64,
    cells: Box<[UnsafeCell<MaybeUninit<W>>]>,
}

// SAFETY: cells are plain storage; the deque's single-owner write discipline
// and commit CAS make cross-thread use sound. `W` is always a `Copy` word
// (the value itself or a raw pointer owned by the deque).
unsafe impl<W: Copy + Send> Send for CircularBuffer<W> {}
unsafe impl<W: Copy + Send> Sync for CircularBuffer<W> {}

impl<W: Copy> CircularBuffer<W> {
    /// Allocates a buffer of `capacity` uninitialized cells.
    ///
    /// `capacity` must be a positive power of two; the public precondition
    /// check lives in `Deque::new`.
    pub(crate) fn new(capacity: i64) -> Self {
        debug_assert!(capacity > 0 && capacity & (capacity - 1) == 0);

        let cells = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();

        Self {
            capacity,
            mask: capacity - 1,
            cells,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> i64 {
        self.capacity
    }

    /// Volatile read of the cell for logical index `index`.
    ///
    /// # Safety
    ///
    /// The buffer must outlive the read (the deque retires grown-out buffers
    /// instead of freeing them for exactly this reason). The returned word is
    /// only known to be initialized if `index` was inside the live window;
    /// callers racing with the owner must validate via the `top` CAS before
    /// `assume_init`.
    #[inline]
    pub(crate) unsafe fn get(&self, index: i64) -> MaybeUninit<W> {
        let slot = (index & self.mask) as usize;
        ptr::read_volatile(self.cells.get_unchecked(slot).get())
    }

    /// Volatile write of the cell for logical index `index`.
    ///
    /// # Safety
    ///
    /// Owner-only: at most one thread may write cells, and only at indices
    /// outside every concurrent stealer's committed range.
    #[inline]
    pub(crate) unsafe fn set(&self, index: i64, value: W) {
        let slot = (index & self.mask) as usize;
        ptr::write_volatile(self.cells.get_unchecked(slot).get(), MaybeUninit::new(value));
    }

    /// Allocates a doubled buffer and copies logical indices `[from, to)`.
    ///
    /// The source is not modified; the owner keeps it on the retired list so
    /// in-flight stealers can still read through stale pointers.
    ///
    /// # Safety
    ///
    /// Owner-only, and every index in `[from, to)` must be initialized in
    /// `self`.
    pub(crate) unsafe fn grow(&self, from: i64, to: i64) -> CircularBuffer<W> {
        assert!(
            self.capacity <= i64::MAX / 2,
            "circular buffer capacity overflow"
        );

        let grown = Self::new(self.capacity << 1);
        for i in from..to {
            grown.set(i, self.get(i).assume_init());
        }
        grown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_indexing_wraps() {
        let buf = CircularBuffer::<u64>::new(4);
        unsafe {
            buf.set(0, 10);
            buf.set(5, 50); // same cell as index 1
            assert_eq!(buf.get(0).assume_init(), 10);
            assert_eq!(buf.get(1).assume_init(), 50);
            assert_eq!(buf.get(4).assume_init(), 10);
        }
    }

    #[test]
    fn negative_logical_indices_mask_correctly() {
        // pop transiently drives `bottom` negative on an empty deque; the
        // mask must still produce an in-bounds cell.
        let buf = CircularBuffer::<u64>::new(8);
        unsafe {
            buf.set(-1, 7);
            assert_eq!(buf.get(-1).assume_init(), 7);
            assert_eq!(buf.get(7).assume_init(), 7);
        }
    }

    #[test]
    fn grow_doubles_and_copies_window() {
        let buf = CircularBuffer::<u64>::new(4);
        unsafe {
            for i in 0..4 {
                buf.set(i, i as u64 * 100);
            }
            let grown = buf.grow(0, 4);
            assert_eq!(grown.capacity(), 8);
            for i in 0..4 {
                assert_eq!(grown.get(i).assume_init(), i as u64 * 100);
            }
            // source untouched
            for i in 0..4 {
                assert_eq!(buf.get(i).assume_init(), i as u64 * 100);
            }
        }
    }

    #[test]
    fn grow_preserves_logical_positions_across_wrap() {
        let buf = CircularBuffer::<u64>::new(4);
        unsafe {
            // live window [6, 10) wraps the 4-cell ring
            for i in 6..10 {
                buf.set(i, i as u64);
            }
            let grown = buf.grow(6, 10);
            for i in 6..10 {
                assert_eq!(grown.get(i).assume_init(), i as u64);
            }
        }
    }
}
