use std::hint;
use std::thread;

/// Progressive backoff used by the yielding wait strategy and by producers
/// waiting for a lower sequence to be published.
///
/// The first few retries spin with PAUSE hints, doubling each step; after
/// that every retry yields to the OS scheduler. Unlike a give-up backoff it
/// never completes: callers loop until their condition holds.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6; // 2^6 = 64 spins max before yielding

    #[inline]
    pub fn new() -> Self {
        Self { step: 0 }
    }

    #[inline]
    fn spin(&mut self) {
        let spins = 1 << self.step.min(Self::SPIN_LIMIT);
        for _ in 0..spins {
            hint::spin_loop();
        }
        if self.step <= Self::SPIN_LIMIT {
            self.step += 1;
        }
    }

    /// Spin while cheap, then yield on every call.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            self.spin();
        } else {
            thread::yield_now();
        }
    }

}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let mut b = Backoff::new();
        assert_eq!(b.step, 0);

        b.snooze();
        assert_eq!(b.step, 1);

        while b.step <= Backoff::SPIN_LIMIT {
            b.snooze();
        }
        // Once spinning is exhausted, snoozes yield without advancing.
        let step = b.step;
        b.snooze();
        assert_eq!(step, Backoff::SPIN_LIMIT + 1);
        assert_eq!(b.step, step);
    }
}
