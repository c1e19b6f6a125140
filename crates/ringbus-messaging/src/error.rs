use ringbus::{BoxError, HandlerError, RingError};
use thiserror::Error;

/// Errors raised by channels, dispatchers and batching handlers.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The underlying ring or its lifecycle refused the operation.
    #[error(transparent)]
    Ring(#[from] RingError),

    /// A message was dispatched with no handler subscribed.
    #[error("dispatcher has no subscribers")]
    NoSubscribers,

    /// `subscribe` would exceed the configured maximum.
    #[error("maximum subscribers exceeded ({max})")]
    TooManySubscribers { max: usize },

    /// Every handler tried for the message failed.
    #[error("delivery failed after {attempts} attempt(s)")]
    DeliveryFailed {
        attempts: usize,
        #[source]
        source: BoxError,
    },

    /// A batch was flushed with neither an output channel nor a `reply_to` header.
    #[error("no output channel or reply_to header available")]
    NoDestination,

    /// A channel name did not resolve through the registry.
    #[error("no channel named '{name}'")]
    UnknownChannel { name: String },

    /// A consumer-side handler failed outside dispatch.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl MessagingError {
    /// Returns `true` if retrying the same send later may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Ring(e) => e.is_recoverable(),
            Self::DeliveryFailed { .. } | Self::NoSubscribers => true,
            _ => false,
        }
    }
}
