//! The consumer loop: one thread draining a [`RingBuffer`](crate::RingBuffer)
//! in sequence order and handing each item to an [`EventHandler`].
//!
//! Handler failures never stop the loop. Errors and panics are routed to an
//! [`ExceptionHandler`] and the loop moves on to the next sequence.

use crate::wait::WaitError;
use crate::{HandlerError, RingConsumer, Sequence};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Consumer-side callback invoked for every published item.
pub trait EventHandler<T>: Send {
    /// Processes one item.
    ///
    /// `end_of_batch` is true for the last sequence currently available, so
    /// handlers that buffer can flush without waiting for more input.
    fn on_event(&mut self, item: T, sequence: Sequence, end_of_batch: bool)
        -> Result<(), HandlerError>;

    /// Called when the last available sequence held no item (its producer
    /// dropped the claim). Buffering handlers should flush here too.
    fn on_end_of_batch(&mut self, _sequence: Sequence) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called on the worker thread before the first item.
    fn on_start(&mut self) {}

    /// Called on the worker thread after the last item has been drained.
    fn on_shutdown(&mut self) {}
}

/// Receives failures raised by an [`EventHandler`].
pub trait ExceptionHandler: Send {
    fn handle_event_failure(&mut self, error: HandlerError, sequence: Sequence);
}

impl<F> ExceptionHandler for F
where
    F: FnMut(HandlerError, Sequence) + Send,
{
    fn handle_event_failure(&mut self, error: HandlerError, sequence: Sequence) {
        self(error, sequence);
    }
}

/// Default [`ExceptionHandler`]: logs the failure and continues.
#[derive(Debug, Clone)]
pub struct LoggingExceptionHandler {
    name: String,
}

impl LoggingExceptionHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ExceptionHandler for LoggingExceptionHandler {
    fn handle_event_failure(&mut self, error: HandlerError, sequence: Sequence) {
        warn!(worker = %self.name, sequence, error = %error, "handler failed, continuing");
    }
}

/// Drives a [`RingConsumer`] until its ring is halted and drained.
pub struct ConsumerLoop<T, H, X> {
    name: String,
    consumer: RingConsumer<T>,
    handler: H,
    exceptions: X,
}

impl<T, H, X> ConsumerLoop<T, H, X>
where
    H: EventHandler<T>,
    X: ExceptionHandler,
{
    pub fn new(
        name: impl Into<String>,
        consumer: RingConsumer<T>,
        handler: H,
        exceptions: X,
    ) -> Self {
        Self {
            name: name.into(),
            consumer,
            handler,
            exceptions,
        }
    }

    /// Runs on the calling thread until the ring is halted and every
    /// published sequence has been handled. Returns the handler.
    pub fn run(self) -> H {
        let Self {
            name,
            mut consumer,
            mut handler,
            mut exceptions,
        } = self;

        debug!(worker = %name, "consumer loop started");
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.on_start())) {
            let error = HandlerError::from_panic(payload.as_ref());
            warn!(worker = %name, error = %error, "on_start panicked");
        }

        let mut next = consumer.next_sequence();
        let mut handled: u64 = 0;

        loop {
            let available = match consumer.wait_for(next) {
                Ok(available) => available,
                Err(WaitError::Halted) => break,
            };

            let mut consumed = 0u64;
            let mut failures = 0u64;

            for (sequence, item) in consumer.drain_up_to(next, available) {
                let end_of_batch = sequence == available;
                let outcome = match item {
                    Some(item) => {
                        consumed += 1;
                        guarded(|| handler.on_event(item, sequence, end_of_batch))
                    }
                    None if end_of_batch => guarded(|| handler.on_end_of_batch(sequence)),
                    None => Ok(()),
                };
                if let Err(error) = outcome {
                    failures += 1;
                    exceptions.handle_event_failure(error, sequence);
                }
            }

            // One gating update for the whole batch.
            consumer.release(available);

            let ring = consumer.ring();
            if ring.metrics_enabled() {
                let metrics = ring.metrics_handle();
                metrics.add_consumed(consumed);
                metrics.add_handler_failures(failures);
                metrics.add_batches(1);
            }

            handled += consumed;
            next = available + 1;
        }

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.on_shutdown())) {
            let error = HandlerError::from_panic(payload.as_ref());
            warn!(worker = %name, error = %error, "on_shutdown panicked");
        }
        debug!(worker = %name, handled, "consumer loop drained and stopped");

        handler
    }
}

fn guarded<F>(f: F) -> Result<(), HandlerError>
where
    F: FnOnce() -> Result<(), HandlerError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::from_panic(payload.as_ref())),
    }
}
