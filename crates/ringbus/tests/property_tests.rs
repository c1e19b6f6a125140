//! Property-based tests for the ring buffer sequence invariants.
//!
//! - Bounded count: `claimed - released <= capacity` after any interleaving of
//!   pushes and drains
//! - FIFO: items come out in the order they were published
//! - Progress: a drain always releases everything it observed

use proptest::prelude::*;
use ringbus::{Config, ProducerType, PublishPolicy, RingBuffer, RingError, WaitStrategyKind};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Push(u32),
    Drain,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u32>().prop_map(Op::Push),
        1 => Just(Op::Drain),
    ]
}

fn producer_type() -> impl Strategy<Value = ProducerType> {
    prop_oneof![Just(ProducerType::Single), Just(ProducerType::Multi)]
}

proptest! {
    /// Any sequence of pushes and drains behaves like a bounded FIFO queue.
    #[test]
    fn prop_ring_is_bounded_fifo(
        capacity_log2 in 0u32..5,
        producer_type in producer_type(),
        ops in prop::collection::vec(op(), 0..200),
    ) {
        let capacity = 1usize << capacity_log2;
        let config = Config::default()
            .with_capacity(capacity)
            .with_producer_type(producer_type)
            .with_wait_strategy(WaitStrategyKind::Yield)
            .with_publish_policy(PublishPolicy::RejectWhenFull);
        let ring = Arc::new(RingBuffer::<u32>::new(config).unwrap());
        let mut consumer = ring.consumer().unwrap();

        let mut model = std::collections::VecDeque::new();
        let mut next = 0i64;

        for op in ops {
            match op {
                Op::Push(value) => match ring.push(value) {
                    Ok(_) => {
                        prop_assert!(model.len() < capacity);
                        model.push_back(value);
                    }
                    Err(RingError::Rejected) => prop_assert_eq!(model.len(), capacity),
                    Err(e) => prop_assert!(false, "unexpected error {e}"),
                },
                Op::Drain => {
                    if model.is_empty() {
                        prop_assert!(ring.is_empty());
                        continue;
                    }
                    let available = consumer.wait_for(next).unwrap();
                    let drained: Vec<u32> = consumer
                        .drain_up_to(next, available)
                        .filter_map(|(_, item)| item)
                        .collect();
                    consumer.release(available);
                    next = available + 1;

                    let expected: Vec<u32> = model.drain(..).collect();
                    prop_assert_eq!(drained, expected);
                }
            }
            prop_assert!(ring.len() <= capacity);
            prop_assert_eq!(ring.len(), model.len());
        }
    }

    /// Sequences handed out by claims are consecutive from zero.
    #[test]
    fn prop_sequences_are_consecutive(count in 1usize..64) {
        let ring = RingBuffer::<usize>::new(Config::default().with_capacity(64)).unwrap();
        for expected in 0..count {
            prop_assert_eq!(ring.push(expected).unwrap(), expected as i64);
        }
        prop_assert_eq!(ring.cursor(), count as i64 - 1);
    }
}
