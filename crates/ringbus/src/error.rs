//! Error types for ring buffer, lifecycle and handler operations.

use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by user handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced on the producer path and by lifecycle operations.
#[derive(Debug, Error)]
pub enum RingError {
    /// Capacity was not a non-zero power of two.
    #[error("ring buffer capacity must be a power of two (got {capacity})")]
    InvalidCapacity {
        /// The rejected capacity.
        capacity: usize,
    },

    /// The next sequence would overtake the consumer by more than the capacity.
    #[error("ring buffer has insufficient capacity")]
    InsufficientCapacity,

    /// The item was refused because the buffer is full and the publish policy
    /// is [`PublishPolicy::RejectWhenFull`](crate::PublishPolicy::RejectWhenFull).
    #[error("ring buffer is at capacity, item rejected")]
    Rejected,

    /// The component is not in the `Running` state.
    #[error("component is not running")]
    NotRunning,

    /// The worker thread did not finish draining within the stop timeout.
    #[error("worker did not drain within {timeout:?}")]
    ShutdownTimeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The ring's single consumer handle was already taken.
    #[error("ring buffer consumer already taken")]
    AlreadyConsumed,

    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl RingError {
    /// Returns `true` if retrying the same operation later may succeed.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientCapacity | Self::Rejected | Self::ShutdownTimeout { .. }
        )
    }

    /// Returns `true` if the error reflects configuration or usage rather than load.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InvalidCapacity { .. } | Self::NotRunning | Self::AlreadyConsumed
        )
    }
}

/// Failure raised while a consumer-side handler processed one item.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Failed(#[source] BoxError),

    /// The handler panicked; the payload message is kept when it was a string.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Wraps any error type as a handler failure.
    pub fn failed<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Failed(error.into())
    }

    /// Builds a [`HandlerError::Panicked`] from a `catch_unwind` payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }
}
