//! Batching: collect consecutive messages from a ring and forward them as one
//! aggregate message.
//!
//! A batch is flushed when it reaches `batch_size` or when the consumer
//! reaches the end of what is currently published, whichever comes first. A
//! slow producer therefore sees small batches with low latency; a fast one
//! sees full batches.
//!
//! [`BatchAccumulator`] is the pure grouping logic with no threads involved.
//! [`BatchingMessageHandler`] runs it on a ring consumer thread.

use crate::error_handler::{ErrorHandler, LoggingErrorHandler};
use crate::merge::HeaderMergeStrategy;
use crate::registry::{ChannelRef, ChannelRegistry};
use crate::{Message, MessageBuilder, MessageChannel, MessageHandler, MessagingError};
use ringbus::{
    BoxError, Config, EventHandler, HandlerError, LifecycleState, LoggingExceptionHandler,
    MetricsSnapshot, RingEngine, Sequence,
};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`BatchingMessageHandler`].
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Ring buffer buffering incoming messages
    pub ring: Config,
    /// Maximum messages per batch (default: 64)
    pub batch_size: usize,
    /// Header merge strategy for the default batcher (default: ConflictDiscarding)
    pub merge_strategy: HeaderMergeStrategy,
}

impl BatchConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 64;

    pub const fn new(ring: Config, batch_size: usize) -> Self {
        Self {
            ring,
            batch_size,
            merge_strategy: HeaderMergeStrategy::ConflictDiscarding,
        }
    }

    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub const fn with_merge_strategy(mut self, strategy: HeaderMergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::new(Config::default(), Self::DEFAULT_BATCH_SIZE)
    }
}

// ---------------------------------------------------------------------------
// Batchers
// ---------------------------------------------------------------------------

/// Turns a batch of messages into one aggregate message.
pub trait MessageBatcher<P>: Send + Sync {
    type Output;

    fn batch_messages(&self, messages: Vec<Message<P>>) -> Message<Self::Output>;
}

/// Default batcher: the payloads in order, with merged headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOfPayloadsBatcher {
    merger: HeaderMergeStrategy,
}

impl ListOfPayloadsBatcher {
    pub fn new(merger: HeaderMergeStrategy) -> Self {
        Self { merger }
    }
}

impl<P> MessageBatcher<P> for ListOfPayloadsBatcher {
    type Output = Vec<P>;

    fn batch_messages(&self, messages: Vec<Message<P>>) -> Message<Vec<P>> {
        let merged = self.merger.merge(messages.iter().map(Message::headers));
        let payloads = messages.into_iter().map(Message::into_payload).collect();
        MessageBuilder::with_payload(payloads)
            .copy_headers(merged.iter().map(|(k, v)| (k.as_str(), v)))
            .build()
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// The open batch.
#[derive(Debug)]
pub struct BatchAccumulator<P> {
    messages: Vec<Message<P>>,
    batch_size: usize,
}

impl<P> BatchAccumulator<P> {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            messages: Vec::with_capacity(batch_size),
            batch_size,
        }
    }

    /// Adds `message`; returns the batch if this completes it.
    pub fn on_item(&mut self, message: Message<P>, end_of_batch: bool) -> Option<Vec<Message<P>>> {
        self.messages.push(message);
        if end_of_batch || self.messages.len() >= self.batch_size {
            self.take()
        } else {
            None
        }
    }

    /// Returns whatever is buffered, if anything.
    pub fn take(&mut self) -> Option<Vec<Message<P>>> {
        if self.messages.is_empty() {
            return None;
        }
        let batch = std::mem::replace(&mut self.messages, Vec::with_capacity(self.batch_size));
        Some(batch)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

struct FlushTarget<P, B: MessageBatcher<P>> {
    batcher: Arc<B>,
    output: Option<ChannelRef<B::Output>>,
    registry: Option<Arc<ChannelRegistry<B::Output>>>,
    errors: Arc<dyn ErrorHandler>,
    _batch: PhantomData<fn(Vec<Message<P>>)>,
}

impl<P, B: MessageBatcher<P>> FlushTarget<P, B> {
    fn flush(&self, batch: Vec<Message<P>>) {
        let size = batch.len();
        let aggregate = self.batcher.batch_messages(batch);
        trace!(size, message_id = %aggregate.headers().id(), "flushing batch");

        let headers = aggregate.headers().clone();
        let result = self
            .destination(&aggregate)
            .and_then(|channel| channel.send(aggregate));
        if let Err(error) = result {
            self.errors.handle_error(error, Some(&headers));
        }
    }

    /// Explicit output channel first, then the `reply_to` header.
    fn destination(
        &self,
        aggregate: &Message<B::Output>,
    ) -> Result<ChannelRef<B::Output>, MessagingError> {
        if let Some(output) = &self.output {
            return Ok(Arc::clone(output));
        }
        match (aggregate.headers().reply_to(), &self.registry) {
            (Some(name), Some(registry)) => registry.resolve(name),
            (Some(name), None) => Err(MessagingError::UnknownChannel {
                name: name.to_string(),
            }),
            (None, _) => Err(MessagingError::NoDestination),
        }
    }
}

struct BatchEventHandler<P, B: MessageBatcher<P>> {
    accumulator: BatchAccumulator<P>,
    target: FlushTarget<P, B>,
}

impl<P, B> EventHandler<Message<P>> for BatchEventHandler<P, B>
where
    P: Send,
    B: MessageBatcher<P>,
    B::Output: 'static,
{
    fn on_event(
        &mut self,
        message: Message<P>,
        _sequence: Sequence,
        end_of_batch: bool,
    ) -> Result<(), HandlerError> {
        if let Some(batch) = self.accumulator.on_item(message, end_of_batch) {
            self.target.flush(batch);
        }
        Ok(())
    }

    fn on_end_of_batch(&mut self, _sequence: Sequence) -> Result<(), HandlerError> {
        if let Some(batch) = self.accumulator.take() {
            self.target.flush(batch);
        }
        Ok(())
    }

    fn on_shutdown(&mut self) {
        if let Some(batch) = self.accumulator.take() {
            self.target.flush(batch);
        }
    }
}

/// Buffers messages on a ring and forwards them in batches.
///
/// Each flushed batch goes to the output channel if one is set, otherwise to
/// the channel named by the aggregate's `reply_to` header, resolved through
/// the channel registry. A batch with no destination is reported to the
/// error handler and dropped.
pub struct BatchingMessageHandler<P, B = ListOfPayloadsBatcher>
where
    B: MessageBatcher<P>,
{
    engine: RingEngine<Message<P>>,
    batcher: Arc<B>,
    output: Option<ChannelRef<B::Output>>,
    registry: Option<Arc<ChannelRegistry<B::Output>>>,
    errors: Arc<dyn ErrorHandler>,
    batch_size: usize,
}

impl<P: Send + 'static> BatchingMessageHandler<P, ListOfPayloadsBatcher> {
    /// Uses a [`ListOfPayloadsBatcher`] with the configured merge strategy.
    pub fn new(name: impl Into<String>, config: BatchConfig) -> Result<Self, MessagingError> {
        Self::with_batcher(name, config, ListOfPayloadsBatcher::new(config.merge_strategy))
    }
}

impl<P, B> BatchingMessageHandler<P, B>
where
    P: Send + 'static,
    B: MessageBatcher<P> + 'static,
    B::Output: 'static,
{
    pub fn with_batcher(
        name: impl Into<String>,
        config: BatchConfig,
        batcher: B,
    ) -> Result<Self, MessagingError> {
        Ok(Self {
            engine: RingEngine::new(name, config.ring)?,
            batcher: Arc::new(batcher),
            output: None,
            registry: None,
            errors: Arc::new(LoggingErrorHandler),
            batch_size: config.batch_size,
        })
    }

    /// Sends every batch to `channel`.
    pub fn with_output_channel(mut self, channel: ChannelRef<B::Output>) -> Self {
        self.output = Some(channel);
        self
    }

    /// Resolves `reply_to` headers when no output channel is set.
    pub fn with_channel_registry(mut self, registry: Arc<ChannelRegistry<B::Output>>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_error_handler(mut self, errors: Arc<dyn ErrorHandler>) -> Self {
        self.errors = errors;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.engine.name()
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Queues `message` for batching.
    pub fn handle(&self, message: Message<P>) -> Result<(), MessagingError> {
        self.engine.publish(message)?;
        Ok(())
    }

    pub fn start(&self) -> Result<(), MessagingError> {
        let handler = BatchEventHandler {
            accumulator: BatchAccumulator::new(self.batch_size),
            target: FlushTarget {
                batcher: Arc::clone(&self.batcher),
                output: self.output.clone(),
                registry: self.registry.clone(),
                errors: Arc::clone(&self.errors),
                _batch: PhantomData,
            },
        };
        self.engine
            .start(handler, LoggingExceptionHandler::new(self.engine.name()))?;
        Ok(())
    }

    pub fn stop(&self) -> Result<(), MessagingError> {
        self.engine.stop()?;
        Ok(())
    }

    pub fn stop_timeout(&self, timeout: Duration) -> Result<(), MessagingError> {
        self.engine.stop_timeout(timeout)?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn state(&self) -> LifecycleState {
        self.engine.state()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.engine.metrics()
    }
}

impl<P, B> MessageChannel<P> for BatchingMessageHandler<P, B>
where
    P: Send + 'static,
    B: MessageBatcher<P> + 'static,
    B::Output: 'static,
{
    fn send(&self, message: Message<P>) -> Result<(), MessagingError> {
        self.handle(message)
    }
}

/// Lets a batching handler subscribe to a channel.
impl<P, B> MessageHandler<P> for BatchingMessageHandler<P, B>
where
    P: Clone + Send + Sync + 'static,
    B: MessageBatcher<P> + 'static,
    B::Output: 'static,
{
    fn handle_message(&self, message: &Message<P>) -> Result<(), BoxError> {
        self.handle(message.clone()).map_err(Into::into)
    }
}
