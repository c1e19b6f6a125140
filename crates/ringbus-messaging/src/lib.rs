//! Messaging on top of `ringbus`.
//!
//! - [`Message`] / [`MessageHeaders`]: payloads with immutable headers
//! - [`RingBufferChannel`]: asynchronous point-to-point channel with
//!   round-robin, failover-capable dispatch
//! - [`BatchingMessageHandler`]: groups consecutive messages into one
//!   aggregate, merging their headers
//! - [`ChannelRegistry`] and [`ErrorHandler`]s for routing results and
//!   failures by channel name

mod batching;
mod channel;
mod dispatcher;
mod error;
mod error_handler;
mod handler;
mod merge;
mod message;
mod registry;

pub use batching::{
    BatchAccumulator, BatchConfig, BatchingMessageHandler, ListOfPayloadsBatcher, MessageBatcher,
};
pub use channel::{ChannelConfig, RingBufferChannel};
pub use dispatcher::{HandlerRef, LoadBalancing, UnicastingDispatcher};
pub use error::MessagingError;
pub use error_handler::{ErrorHandler, LoggingErrorHandler, MessagePublishingErrorHandler};
pub use handler::{MessageChannel, MessageHandler};
pub use merge::{HeaderMergeStrategy, MergedHeaders};
pub use message::{
    ErrorMessage, ErrorPayload, HeaderValue, IdGenerator, IncrementingIdGenerator, Message,
    MessageBuilder, MessageHeaders, RandomIdGenerator, CORRELATION_ID, ERROR_CHANNEL, ID,
    IDENTITY_HEADERS, REPLY_TO, SEQUENCE_NUMBER, SEQUENCE_SIZE, TIMESTAMP,
};
pub use registry::{ChannelRef, ChannelRegistry};
