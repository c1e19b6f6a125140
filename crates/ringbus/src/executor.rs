use crate::engine::{LifecycleState, RingEngine};
use crate::processor::{EventHandler, LoggingExceptionHandler};
use crate::{Config, HandlerError, MetricsSnapshot, RingError, Sequence};
use std::time::Duration;

/// A unit of work run on the executor's worker thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Executes tasks on a single worker thread, in the order they were enqueued.
///
/// Tasks are queued on a ring buffer. Under
/// [`PublishPolicy::RejectWhenFull`](crate::PublishPolicy::RejectWhenFull) a
/// full queue fails `execute` with [`RingError::Rejected`]; under
/// `BlockWhenFull` the caller waits for a free slot. A panicking task is
/// logged and the worker moves on to the next one.
///
/// # Example
///
/// ```
/// use ringbus::{Config, RingBufferTaskExecutor};
/// use std::sync::mpsc;
///
/// let executor = RingBufferTaskExecutor::new(Config::default()).unwrap();
/// executor.start().unwrap();
///
/// let (tx, rx) = mpsc::channel();
/// executor.execute(move || tx.send(21 * 2).unwrap()).unwrap();
/// assert_eq!(rx.recv().unwrap(), 42);
///
/// executor.stop().unwrap();
/// ```
pub struct RingBufferTaskExecutor {
    engine: RingEngine<Task>,
}

impl RingBufferTaskExecutor {
    /// Default worker thread name.
    pub const DEFAULT_NAME: &'static str = "ringbus-executor";

    pub fn new(config: Config) -> Result<Self, RingError> {
        Self::with_name(Self::DEFAULT_NAME, config)
    }

    pub fn with_name(name: impl Into<String>, config: Config) -> Result<Self, RingError> {
        Ok(Self {
            engine: RingEngine::new(name, config)?,
        })
    }

    pub fn start(&self) -> Result<(), RingError> {
        self.engine
            .start(TaskHandler, LoggingExceptionHandler::new(self.engine.name()))
    }

    /// Enqueues `task`. Returns once it is queued, not once it has run.
    pub fn execute<F>(&self, task: F) -> Result<(), RingError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.engine.publish(Box::new(task)).map(|_| ())
    }

    pub fn stop(&self) -> Result<(), RingError> {
        self.engine.stop()
    }

    pub fn stop_timeout(&self, timeout: Duration) -> Result<(), RingError> {
        self.engine.stop_timeout(timeout)
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

struct TaskHandler;

impl EventHandler<Task> for TaskHandler {
    fn on_event(
        &mut self,
        task: Task,
        _sequence: Sequence,
        _end_of_batch: bool,
    ) -> Result<(), HandlerError> {
        task();
        Ok(())
    }
}
