use crate::{RingBuffer, Sequence};

/// Exclusive right to fill one slot of a [`RingBuffer`].
///
/// Obtained from [`RingBuffer::try_claim`] or [`RingBuffer::claim_blocking`].
/// The slot becomes visible to the consumer when the claim is published,
/// either explicitly via [`write`](Self::write) / [`publish`](Self::publish)
/// or implicitly on drop.
///
/// Dropping an unpublished claim publishes an empty slot so that later
/// sequences are not held back; the consumer sees `None` for it.
///
/// # Example
///
/// ```
/// use ringbus::{Config, RingBuffer};
///
/// let ring = RingBuffer::<u64>::new(Config::default()).unwrap();
/// let mut claim = ring.try_claim().unwrap();
/// *claim.slot_mut() = Some(42);
/// let seq = claim.publish();
/// assert_eq!(seq, 0);
/// ```
pub struct Claim<'a, T> {
    ring: &'a RingBuffer<T>,
    sequence: Sequence,
    published: bool,
}

impl<'a, T> Claim<'a, T> {
    pub(crate) fn new(ring: &'a RingBuffer<T>, sequence: Sequence) -> Self {
        Self {
            ring,
            sequence,
            published: false,
        }
    }

    /// The claimed sequence.
    #[inline]
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    /// Mutable access to the claimed slot.
    ///
    /// The slot is always empty when claimed: the consumer takes each item out
    /// before releasing its sequence.
    #[inline]
    pub fn slot_mut(&mut self) -> &mut Option<T> {
        // SAFETY: the sequence is claimed and not yet published, so this
        // producer is the only thread with access to the slot.
        unsafe { &mut *self.ring.slot_ptr(self.sequence) }
    }

    /// Stores `item` in the slot and publishes it.
    pub fn write(mut self, item: T) -> Sequence {
        *self.slot_mut() = Some(item);
        self.publish()
    }

    /// Publishes the slot as it is.
    pub fn publish(mut self) -> Sequence {
        self.published = true;
        self.ring.publish_sequence(self.sequence);
        self.sequence
    }
}

impl<T> Drop for Claim<'_, T> {
    fn drop(&mut self) {
        if !self.published {
            *self.slot_mut() = None;
            self.ring.publish_sequence(self.sequence);
        }
    }
}
