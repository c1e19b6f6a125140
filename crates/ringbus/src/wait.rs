use crate::{Backoff, Sequence, WaitStrategyKind};
use parking_lot::{Condvar, Mutex};
use std::hint;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Bounded park used by the blocking strategy as a safety net against a
/// missed notification.
pub const BLOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Why a consumer stopped waiting without a new sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The ring was halted and everything published has been handed out.
    #[error("ring buffer halted")]
    Halted,
}

/// Consumer-side wait policy, selected once from [`WaitStrategyKind`].
///
/// Spin and Yield never block, so `signal_all` is a no-op for them; Block
/// parks on a condition variable that publishers notify.
pub(crate) enum WaitStrategy {
    Spin,
    Yield,
    Block(BlockingWait),
}

pub(crate) struct BlockingWait {
    lock: Mutex<()>,
    /// Consumers wait here for new sequences.
    published: Condvar,
    /// Producers wait here for the consumer to free slots.
    released: Condvar,
}

impl WaitStrategy {
    pub(crate) fn new(kind: WaitStrategyKind) -> Self {
        match kind {
            WaitStrategyKind::Spin => Self::Spin,
            WaitStrategyKind::Yield => Self::Yield,
            WaitStrategyKind::Block => Self::Block(BlockingWait {
                lock: Mutex::new(()),
                published: Condvar::new(),
                released: Condvar::new(),
            }),
        }
    }

    /// Waits until `cursor >= required` and returns the highest published
    /// sequence, which may be well past `required`.
    ///
    /// Once `halted` is set this keeps waiting for every sequence claimed so
    /// far (`claimed`), then fails with [`WaitError::Halted`] when the cursor
    /// has nothing left at or beyond `required`.
    pub(crate) fn wait_for(
        &self,
        required: Sequence,
        cursor: &AtomicI64,
        claimed: &AtomicI64,
        halted: &AtomicBool,
    ) -> Result<Sequence, WaitError> {
        let mut backoff = Backoff::new();
        loop {
            let available = cursor.load(Ordering::Acquire);
            if available >= required {
                return Ok(available);
            }
            if halted.load(Ordering::SeqCst) {
                let in_flight = claimed.load(Ordering::SeqCst);
                // Re-read: a publish may have landed since the first load.
                let available = cursor.load(Ordering::Acquire);
                if available >= required {
                    return Ok(available);
                }
                if in_flight < required {
                    return Err(WaitError::Halted);
                }
                // A producer claimed before the halt and has yet to publish.
            }

            match self {
                Self::Spin => hint::spin_loop(),
                Self::Yield => backoff.snooze(),
                Self::Block(blocking) => {
                    let mut guard = blocking.lock.lock();
                    let pending = cursor.load(Ordering::Acquire) < required;
                    let draining = claimed.load(Ordering::SeqCst) >= required;
                    if pending && (draining || !halted.load(Ordering::SeqCst)) {
                        blocking
                            .published
                            .wait_for(&mut guard, BLOCK_POLL_INTERVAL);
                    }
                }
            }
        }
    }

    /// Producer-side single wait step while the ring is full.
    ///
    /// `ready` is re-checked under the lock for the blocking strategy so a
    /// release between the caller's check and the park is not lost.
    pub(crate) fn wait_for_capacity<F>(&self, backoff: &mut Backoff, ready: F)
    where
        F: Fn() -> bool,
    {
        match self {
            Self::Spin => hint::spin_loop(),
            Self::Yield => backoff.snooze(),
            Self::Block(blocking) => {
                let mut guard = blocking.lock.lock();
                if !ready() {
                    blocking.released.wait_for(&mut guard, BLOCK_POLL_INTERVAL);
                }
            }
        }
    }

    /// Wakes consumers parked in [`wait_for`](Self::wait_for).
    #[inline]
    pub(crate) fn signal_all(&self) {
        if let Self::Block(blocking) = self {
            let _guard = blocking.lock.lock();
            blocking.published.notify_all();
        }
    }

    /// Wakes producers parked in [`wait_for_capacity`](Self::wait_for_capacity).
    #[inline]
    pub(crate) fn signal_capacity(&self) {
        if let Self::Block(blocking) = self {
            let _guard = blocking.lock.lock();
            blocking.released.notify_all();
        }
    }
}
