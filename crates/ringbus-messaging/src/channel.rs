use crate::dispatcher::{HandlerRef, LoadBalancing, UnicastingDispatcher};
use crate::error_handler::{ErrorHandler, LoggingErrorHandler};
use crate::{Message, MessageChannel, MessagingError};
use ringbus::{
    Config, EventHandler, HandlerError, LifecycleState, LoggingExceptionHandler, MetricsSnapshot,
    RingEngine, Sequence,
};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`RingBufferChannel`].
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// Ring buffer, wait strategy and publish policy
    pub ring: Config,
    /// Try the next subscriber when one fails (default: true)
    pub failover: bool,
    /// Upper bound on subscribers (default: unbounded)
    pub max_subscribers: usize,
    /// How the first subscriber for each message is picked (default: round-robin)
    pub load_balancing: LoadBalancing,
}

impl ChannelConfig {
    pub const fn new(ring: Config) -> Self {
        Self {
            ring,
            failover: true,
            max_subscribers: usize::MAX,
            load_balancing: LoadBalancing::RoundRobin,
        }
    }

    pub const fn with_failover(mut self, failover: bool) -> Self {
        self.failover = failover;
        self
    }

    pub const fn with_max_subscribers(mut self, max: usize) -> Self {
        self.max_subscribers = max;
        self
    }

    pub const fn with_load_balancing(mut self, load_balancing: LoadBalancing) -> Self {
        self.load_balancing = load_balancing;
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Point-to-point channel backed by a ring buffer.
///
/// `send` returns as soon as the message is queued. One worker thread drains
/// the ring in order and dispatches each message to one subscriber,
/// round-robin unless [`LoadBalancing::None`] is configured. Delivery
/// failures go to the channel's [`ErrorHandler`].
///
/// ```
/// use ringbus::BoxError;
/// use ringbus_messaging::{ChannelConfig, Message, RingBufferChannel};
/// use std::sync::{mpsc, Arc, Mutex};
///
/// let channel = RingBufferChannel::new("orders", ChannelConfig::default()).unwrap();
/// let (tx, rx) = mpsc::channel();
/// let tx = Mutex::new(tx);
/// channel
///     .subscribe(Arc::new(move |m: &Message<&'static str>| -> Result<(), BoxError> {
///         tx.lock().unwrap().send(*m.payload())?;
///         Ok(())
///     }))
///     .unwrap();
///
/// channel.start().unwrap();
/// channel.send(Message::new("first")).unwrap();
/// assert_eq!(rx.recv().unwrap(), "first");
/// channel.stop().unwrap();
/// ```
pub struct RingBufferChannel<P> {
    engine: RingEngine<Message<P>>,
    dispatcher: Arc<UnicastingDispatcher<P>>,
    errors: Arc<dyn ErrorHandler>,
}

impl<P: Send + 'static> RingBufferChannel<P> {
    pub fn new(name: impl Into<String>, config: ChannelConfig) -> Result<Self, MessagingError> {
        Ok(Self {
            engine: RingEngine::new(name, config.ring)?,
            dispatcher: Arc::new(UnicastingDispatcher::new(
                config.failover,
                config.max_subscribers,
                config.load_balancing,
            )),
            errors: Arc::new(LoggingErrorHandler),
        })
    }

    /// Replaces the error handler. Takes effect on the next `start`.
    pub fn with_error_handler(mut self, errors: Arc<dyn ErrorHandler>) -> Self {
        self.errors = errors;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.engine.name()
    }

    pub fn subscribe(&self, handler: HandlerRef<P>) -> Result<bool, MessagingError> {
        self.dispatcher.subscribe(handler)
    }

    pub fn unsubscribe(&self, handler: &HandlerRef<P>) -> bool {
        self.dispatcher.unsubscribe(handler)
    }

    pub fn subscriber_count(&self) -> usize {
        self.dispatcher.subscriber_count()
    }

    /// Queues `message` according to the publish policy.
    pub fn send(&self, message: Message<P>) -> Result<(), MessagingError> {
        self.engine.publish(message)?;
        Ok(())
    }

    pub fn start(&self) -> Result<(), MessagingError> {
        let handler = DispatchingHandler {
            dispatcher: Arc::clone(&self.dispatcher),
            errors: Arc::clone(&self.errors),
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

impl<P: Send + 'static> MessageChannel<P> for RingBufferChannel<P> {
    fn send(&self, message: Message<P>) -> Result<(), MessagingError> {
        RingBufferChannel::send(self, message)
    }
}

struct DispatchingHandler<P> {
    dispatcher: Arc<UnicastingDispatcher<P>>,
    errors: Arc<dyn ErrorHandler>,
}

impl<P: Send> EventHandler<Message<P>> for DispatchingHandler<P> {
    fn on_event(
        &mut self,
        message: Message<P>,
        _sequence: Sequence,
        _end_of_batch: bool,
    ) -> Result<(), HandlerError> {
        if let Err(error) = self.dispatcher.dispatch(&message) {
            self.errors.handle_error(error, Some(message.headers()));
        }
        Ok(())
    }
}
