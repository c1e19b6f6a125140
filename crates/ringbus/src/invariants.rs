//! Debug assertion macros for ring buffer sequence invariants.
//!
//! Only active in debug builds (`debug_assert!`), so release builds pay nothing.

// =============================================================================
// Bounded count: claimed - consumed <= capacity
// =============================================================================

/// Assert that a claimed sequence never laps the consumer.
///
/// **Invariant**: `claimed - gating <= capacity`
///
/// Used in: `try_claim()` after a successful claim
macro_rules! debug_assert_within_capacity {
    ($claimed:expr, $gating:expr, $capacity:expr) => {
        debug_assert!(
            $claimed - $gating <= $capacity as i64,
            "bounded count violated: claimed {} laps consumer at {} (capacity {})",
            $claimed,
            $gating,
            $capacity
        )
    };
}

// =============================================================================
// Monotonic progress: cursor and gating only move forward
// =============================================================================

/// Assert that a sequence only increases.
///
/// Used in: `publish_sequence()` for the cursor, `release()` for gating
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "monotonic progress violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// In-order publication
// =============================================================================

/// Assert that a sequence is published directly after the current cursor.
///
/// **Invariant**: sequences become visible strictly in order
///
/// Used in: `publish_sequence()` before the Release store
macro_rules! debug_assert_next_in_order {
    ($sequence:expr, $cursor:expr) => {
        debug_assert!(
            $sequence == $cursor + 1,
            "in-order publication violated: publishing {} while cursor is {}",
            $sequence,
            $cursor
        )
    };
}

// =============================================================================
// Consumer never passes the producer
// =============================================================================

/// Assert that the consumer only releases sequences that were published.
///
/// **Invariant**: `gating <= cursor`
///
/// Used in: `RingConsumer::release()`
macro_rules! debug_assert_consumer_behind_cursor {
    ($released:expr, $cursor:expr) => {
        debug_assert!(
            $released <= $cursor,
            "consumer released {} beyond published cursor {}",
            $released,
            $cursor
        )
    };
}

// =============================================================================
// Single-producer contract
// =============================================================================

/// Assert that at most one claim is outstanding in single-producer mode.
///
/// **Invariant**: a claim is published (or dropped) before the next is taken.
/// Single-producer publication does not wait for lower sequences, so a second
/// outstanding claim, from this thread or another, could expose an unwritten
/// slot.
///
/// Used in: `try_claim()` when `ProducerType::Single`
macro_rules! debug_assert_single_producer {
    ($was_busy:expr) => {
        debug_assert!(
            !$was_busy,
            "single-producer contract violated: claim taken while another is outstanding"
        )
    };
}

pub(crate) use debug_assert_consumer_behind_cursor;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_next_in_order;
pub(crate) use debug_assert_single_producer;
pub(crate) use debug_assert_within_capacity;
