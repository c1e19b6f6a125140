use crate::invariants::{
    debug_assert_consumer_behind_cursor, debug_assert_monotonic, debug_assert_next_in_order,
    debug_assert_single_producer, debug_assert_within_capacity,
};
use crate::wait::{WaitError, WaitStrategy};
use crate::{
    Backoff, Claim, Config, Metrics, MetricsSnapshot, ProducerType, PublishPolicy, RingError,
};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// Position of an item in the stream. Starts at 0; `-1` means "nothing yet".
pub type Sequence = i64;

/// Value of the cursor and the gating sequence before anything is published.
pub const INITIAL_CURSOR_VALUE: Sequence = -1;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// Three counters coordinate producers and the single consumer:
//
// - `claimed`: highest sequence handed to a producer
// - `cursor`:  highest sequence published (all lower ones are published too)
// - `gating`:  highest sequence the consumer has finished with
//
// Sequences are unbounded i64 values; a slot index is `sequence & mask`.
//
// **Producer (claim):**
// 1. Single: load `claimed` Relaxed (only writer), compare against the
//    producer-private `cached_gating`, refresh from `gating` with Acquire only
//    when the cache says the ring is full.
// 2. Multi: CAS on `claimed`; `gating` is always loaded with Acquire so each
//    producer individually synchronizes with the consumer's release.
//
// **Producer (publish):**
// 3. Write the slot (exclusive: nobody else holds this sequence).
// 4. Multi: wait until `cursor == sequence - 1` so visibility stays in order.
// 5. Store `cursor` with Release; the slot write happens-before any consumer
//    that Acquire-loads a cursor >= sequence.
//
// **Consumer:**
// 6. Acquire-load `cursor` (via the wait strategy).
// 7. Take items out of slots in `[next, cursor]`.
// 8. Store `gating` with Release so producers may reuse those slots.
//
// **Halt:**
// 9. `halt()` stores `halted` SeqCst. A producer stores `claimed` SeqCst and
//    then re-reads `halted` SeqCst; if it sees the halt it publishes an empty
//    slot and fails with `NotRunning`.
// 10. The consumer reads `halted` then `claimed` (both SeqCst) and keeps
//     draining until `cursor` reaches that claim. A claim it does not see
//     must have observed the halt, so no accepted item is left behind.
//
// =============================================================================

/// Fixed-capacity circular buffer of reusable slots.
///
/// Producers claim a sequence, fill its slot and publish it; the single
/// [`RingConsumer`] drains published sequences strictly in order.
#[repr(C)]
pub struct RingBuffer<T> {
    // === PRODUCER HOT ===
    /// Highest claimed sequence
    claimed: CachePadded<AtomicI64>,
    /// Single-producer cache of `gating` (avoids cross-core reads)
    cached_gating: CachePadded<UnsafeCell<Sequence>>,

    // === PUBLISHED ===
    /// Highest published sequence
    cursor: CachePadded<AtomicI64>,

    // === CONSUMER HOT ===
    /// Highest sequence released by the consumer
    gating: CachePadded<AtomicI64>,

    // === COLD STATE ===
    halted: AtomicBool,
    consumer_taken: AtomicBool,
    /// Debug-only check of the single-producer contract
    producer_busy: AtomicBool,
    wait: WaitStrategy,
    metrics: Arc<Metrics>,
    config: Config,

    // === DATA ===
    slots: Box<[UnsafeCell<Option<T>>]>,
}

// Safety: slots are only touched by the producer that claimed the sequence
// and then by the single consumer, ordered by the cursor/gating protocol.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Creates a ring buffer. Fails with [`RingError::InvalidCapacity`] unless
    /// the capacity is a power of two.
    pub fn new(config: Config) -> Result<Self, RingError> {
        Self::with_metrics(config, Arc::new(Metrics::new()))
    }

    /// Creates a ring buffer that records into shared metrics, so counters
    /// survive a component restart that replaces the ring.
    pub fn with_metrics(config: Config, metrics: Arc<Metrics>) -> Result<Self, RingError> {
        config.validate()?;

        let slots = (0..config.capacity)
            .map(|_| UnsafeCell::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            claimed: CachePadded::new(AtomicI64::new(INITIAL_CURSOR_VALUE)),
            cached_gating: CachePadded::new(UnsafeCell::new(INITIAL_CURSOR_VALUE)),
            cursor: CachePadded::new(AtomicI64::new(INITIAL_CURSOR_VALUE)),
            gating: CachePadded::new(AtomicI64::new(INITIAL_CURSOR_VALUE)),
            halted: AtomicBool::new(false),
            consumer_taken: AtomicBool::new(false),
            producer_busy: AtomicBool::new(false),
            wait: WaitStrategy::new(config.wait_strategy),
            metrics,
            config,
            slots,
        })
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    #[inline]
    fn mask(&self) -> usize {
        self.config.mask()
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Highest published sequence.
    #[inline]
    pub fn cursor(&self) -> Sequence {
        self.cursor.load(Ordering::Acquire)
    }

    /// Number of published items the consumer has not released yet.
    #[inline]
    pub fn len(&self) -> usize {
        let cursor = self.cursor.load(Ordering::Relaxed);
        let gating = self.gating.load(Ordering::Relaxed);
        (cursor - gating).max(0) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots that can still be claimed before the ring is full.
    #[inline]
    pub fn remaining_capacity(&self) -> usize {
        let claimed = self.claimed.load(Ordering::Relaxed);
        let gating = self.gating.load(Ordering::Relaxed);
        self.capacity().saturating_sub((claimed - gating).max(0) as usize)
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Stops the ring: claims fail with `NotRunning`, and the consumer exits
    /// once it has drained everything already published.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        self.wait.signal_all();
        self.wait.signal_capacity();
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    #[inline]
    pub(crate) fn metrics_enabled(&self) -> bool {
        self.config.enable_metrics
    }

    #[inline]
    pub(crate) fn metrics_handle(&self) -> &Metrics {
        &self.metrics
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Claims the next sequence without waiting.
    ///
    /// Fails with [`RingError::InsufficientCapacity`] when the sequence would
    /// lap the consumer, or [`RingError::NotRunning`] once halted.
    pub fn try_claim(&self) -> Result<Claim<'_, T>, RingError> {
        if self.is_halted() {
            return Err(RingError::NotRunning);
        }
        let sequence = match self.config.producer_type {
            ProducerType::Single => self.claim_single()?,
            ProducerType::Multi => self.claim_multi()?,
        };
        let claim = Claim::new(self, sequence);
        if self.halted.load(Ordering::SeqCst) {
            // Halted mid-claim: the sequence goes back as an empty slot.
            drop(claim);
            return Err(RingError::NotRunning);
        }
        Ok(claim)
    }

    /// Claims the next sequence, waiting for capacity according to the wait
    /// strategy. Returns [`RingError::NotRunning`] if the ring is halted
    /// while waiting.
    pub fn claim_blocking(&self) -> Result<Claim<'_, T>, RingError> {
        let mut backoff = Backoff::new();
        loop {
            match self.try_claim() {
                Err(RingError::InsufficientCapacity) => {}
                other => return other,
            }
            self.wait
                .wait_for_capacity(&mut backoff, || self.has_capacity() || self.is_halted());
        }
    }

    /// Claims according to the configured [`PublishPolicy`], writes `item`
    /// and publishes it. Returns the item's sequence.
    pub fn push(&self, item: T) -> Result<Sequence, RingError> {
        let claim = match self.config.publish_policy {
            PublishPolicy::BlockWhenFull => self.claim_blocking()?,
            PublishPolicy::RejectWhenFull => self.try_claim().map_err(|e| match e {
                RingError::InsufficientCapacity => {
                    if self.config.enable_metrics {
                        self.metrics.add_rejected(1);
                    }
                    RingError::Rejected
                }
                other => other,
            })?,
        };
        Ok(claim.write(item))
    }

    fn has_capacity(&self) -> bool {
        let next = self.claimed.load(Ordering::Relaxed) + 1;
        next - (self.capacity() as i64) <= self.gating.load(Ordering::Acquire)
    }

    fn claim_single(&self) -> Result<Sequence, RingError> {
        let next = self.claimed.load(Ordering::Relaxed) + 1;
        let wrap_point = next - self.capacity() as i64;

        // SAFETY: cached_gating is only accessed by the single producer.
        let cached = unsafe { *self.cached_gating.get() };
        if wrap_point > cached {
            let gating = self.gating.load(Ordering::Acquire);
            // SAFETY: as above; the Acquire load synchronizes with release().
            unsafe {
                *self.cached_gating.get() = gating;
            }
            if wrap_point > gating {
                return Err(RingError::InsufficientCapacity);
            }
        }

        if cfg!(debug_assertions) {
            debug_assert_single_producer!(self.producer_busy.swap(true, Ordering::AcqRel));
        }

        self.claimed.store(next, Ordering::SeqCst);
        debug_assert_within_capacity!(
            next,
            self.gating.load(Ordering::Relaxed),
            self.capacity()
        );
        Ok(next)
    }

    fn claim_multi(&self) -> Result<Sequence, RingError> {
        loop {
            let current = self.claimed.load(Ordering::Relaxed);
            let next = current + 1;
            let wrap_point = next - self.capacity() as i64;
            if wrap_point > self.gating.load(Ordering::Acquire) {
                return Err(RingError::InsufficientCapacity);
            }
            if self
                .claimed
                .compare_exchange_weak(current, next, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(next);
            }
        }
    }

    /// Raw pointer to the slot backing `sequence`.
    ///
    /// # Safety
    ///
    /// The caller must hold the claim for `sequence` (producer) or be the
    /// single consumer reading a published, unreleased sequence.
    #[inline]
    pub(crate) unsafe fn slot_ptr(&self, sequence: Sequence) -> *mut Option<T> {
        let idx = (sequence as usize) & self.mask();
        self.slots[idx].get()
    }

    /// Makes `sequence` visible to the consumer. Called by [`Claim`].
    pub(crate) fn publish_sequence(&self, sequence: Sequence) {
        match self.config.producer_type {
            ProducerType::Single => {
                debug_assert_next_in_order!(sequence, self.cursor.load(Ordering::Relaxed));
                if cfg!(debug_assertions) {
                    self.producer_busy.store(false, Ordering::Release);
                }
            }
            ProducerType::Multi => {
                // Lower sequences claimed by other producers must land first.
                let mut backoff = Backoff::new();
                while self.cursor.load(Ordering::Acquire) != sequence - 1 {
                    backoff.snooze();
                }
            }
        }

        debug_assert_monotonic!("cursor", self.cursor.load(Ordering::Relaxed), sequence);
        self.cursor.store(sequence, Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_published(1);
        }
        self.wait.signal_all();
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Takes the single consumer handle. Fails with
    /// [`RingError::AlreadyConsumed`] on the second call.
    pub fn consumer(self: &Arc<Self>) -> Result<RingConsumer<T>, RingError> {
        if self.consumer_taken.swap(true, Ordering::AcqRel) {
            return Err(RingError::AlreadyConsumed);
        }
        Ok(RingConsumer {
            ring: Arc::clone(self),
        })
    }
}

// ---------------------------------------------------------------------
// CONSUMER HANDLE
// ---------------------------------------------------------------------

/// The one read handle of a [`RingBuffer`].
///
/// Not `Clone`: the consumer side of the protocol assumes a single reader.
pub struct RingConsumer<T> {
    ring: Arc<RingBuffer<T>>,
}

impl<T> RingConsumer<T> {
    #[inline]
    pub fn ring(&self) -> &RingBuffer<T> {
        &self.ring
    }

    /// Next sequence this consumer has not released.
    #[inline]
    pub fn next_sequence(&self) -> Sequence {
        self.ring.gating.load(Ordering::Relaxed) + 1
    }

    /// Blocks per the wait strategy until `required` is published; returns
    /// the highest available sequence (`>= required`).
    ///
    /// After a halt this still waits for sequences claimed before the halt,
    /// and fails with [`WaitError::Halted`] only once they are all handed out.
    pub fn wait_for(&self, required: Sequence) -> Result<Sequence, WaitError> {
        self.ring
            .wait
            .wait_for(required, &self.ring.cursor, &self.ring.claimed, &self.ring.halted)
    }

    /// Moves the items of `next..=available` out of their slots, in order.
    ///
    /// An entry is `None` when its producer dropped the claim without
    /// writing. `available` must not exceed the published cursor.
    pub fn drain_up_to(&mut self, next: Sequence, available: Sequence) -> Drain<'_, T> {
        debug_assert_consumer_behind_cursor!(available, self.ring.cursor.load(Ordering::Acquire));
        Drain {
            ring: &self.ring,
            next,
            available,
        }
    }

    /// Hands slots up to and including `sequence` back to producers.
    pub fn release(&self, sequence: Sequence) {
        debug_assert_monotonic!("gating", self.ring.gating.load(Ordering::Relaxed), sequence);
        debug_assert_consumer_behind_cursor!(sequence, self.ring.cursor.load(Ordering::Relaxed));
        self.ring.gating.store(sequence, Ordering::Release);
        self.ring.wait.signal_capacity();
    }
}

/// Iterator returned by [`RingConsumer::drain_up_to`].
pub struct Drain<'a, T> {
    ring: &'a RingBuffer<T>,
    next: Sequence,
    available: Sequence,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = (Sequence, Option<T>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.available {
            return None;
        }
        let sequence = self.next;
        // SAFETY: `sequence` is published (<= cursor, Acquire-loaded by
        // wait_for) and not yet released, so no producer touches this slot
        // and the Drain's &mut borrow of the consumer excludes other readers.
        let item = unsafe { (*self.ring.slot_ptr(sequence)).take() };
        self.next += 1;
        Some((sequence, item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.available - self.next + 1).max(0) as usize;
        (n, Some(n))
    }
}
