//! Property-based tests: the deque against a sequential reference model.
//!
//! Run with: `cargo test --test property`

use std::collections::VecDeque;

use proptest::prelude::*;

use pilfer::deque::{Boxed, Deque, Inline};

/// Operations a single owner can perform.
#[derive(Debug, Clone)]
enum Op {
    Push(u64),
    Pop,
    Steal,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u64>().prop_map(Op::Push),
        2 => Just(Op::Pop),
        2 => Just(Op::Steal),
    ]
}

proptest! {
    /// Without contention the deque is exactly a double-ended queue:
    /// `pop` takes the back, `steal` takes the front, sizes always agree,
    /// and every pushed element comes out exactly once.
    #[test]
    fn inline_deque_matches_reference_model(
        ops in proptest::collection::vec(op_strategy(), 0..500),
    ) {
        let mut dq = Deque::<u64, Inline>::new(8);
        let mut model: VecDeque<u64> = VecDeque::new();

        for op in &ops {
            match op {
                Op::Push(v) => {
                    dq.push(*v);
                    model.push_back(*v);
                }
                Op::Pop => prop_assert_eq!(dq.pop(), model.pop_back()),
                Op::Steal => prop_assert_eq!(dq.steal(), model.pop_front()),
            }
            prop_assert_eq!(dq.size(), model.len());
            prop_assert_eq!(dq.is_empty(), model.is_empty());
        }
    }

    /// Same model through the boxed representation, which allocates per
    /// element and must free exactly what it allocates.
    #[test]
    fn boxed_deque_matches_reference_model(
        ops in proptest::collection::vec(op_strategy(), 0..300),
    ) {
        let mut dq: Deque<u64, Boxed> = Deque::new(8);
        let mut model: VecDeque<u64> = VecDeque::new();

        for op in &ops {
            match op {
                Op::Push(v) => {
                    dq.push(*v);
                    model.push_back(*v);
                }
                Op::Pop => prop_assert_eq!(dq.pop(), model.pop_back()),
                Op::Steal => prop_assert_eq!(dq.steal(), model.pop_front()),
            }
            prop_assert_eq!(dq.size(), model.len());
        }
        // leftovers dropped here; a leak or double free would trip the
        // allocator under miri/asan
    }

    /// Growth is transparent: small initial capacities with push-heavy
    /// sequences produce the same observable behavior.
    #[test]
    fn growth_is_invisible_to_the_model(
        values in proptest::collection::vec(any::<u64>(), 1..200),
    ) {
        let mut dq = Deque::<u64, Inline>::new(2);
        let mut model: VecDeque<u64> = VecDeque::new();

        for v in &values {
            dq.push(*v);
            model.push_back(*v);
        }
        prop_assert!(dq.capacity() >= values.len() as i64);

        // drain alternating ends
        loop {
            match (dq.steal(), model.pop_front()) {
                (None, None) => break,
                (got, want) => prop_assert_eq!(got, want),
            }
            prop_assert_eq!(dq.pop(), model.pop_back());
        }
        prop_assert!(dq.is_empty());
    }
}
