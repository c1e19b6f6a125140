//! Lifecycle for a ring buffer plus its dedicated worker thread.
//!
//! ```text
//!   Stopped ──start()──▶ Starting ──▶ Running ──stop()──▶ Stopping ──▶ Stopped
//!      ▲                                                     │
//!      └──────────────── worker joined within timeout ───────┘
//! ```
//!
//! `start` and `stop` are serialized by one monitor lock. Producers only read
//! the state and the current ring, so publishing never contends with it.

use crate::processor::{ConsumerLoop, EventHandler, ExceptionHandler};
use crate::{Config, Metrics, MetricsSnapshot, RingBuffer, RingError, Sequence};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lifecycle state of a ring-backed component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Set once the consumer loop returns, including by unwinding.
#[derive(Default)]
struct Latch {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    fn count_down(&self) {
        *self.done.lock() = true;
        self.cond.notify_all();
    }

    /// Returns false if `timeout` elapsed first.
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.done.lock();
        while !*done {
            if self.cond.wait_until(&mut done, deadline).timed_out() {
                return *done;
            }
        }
        true
    }
}

struct LatchGuard(Arc<Latch>);

impl Drop for LatchGuard {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

struct Worker {
    handle: JoinHandle<()>,
    finished: Arc<Latch>,
}

/// A restartable ring buffer driven by one named worker thread.
///
/// Every `start` allocates a fresh ring and spawns a new consumer loop; `stop`
/// halts the ring, lets the loop drain what was already published, and joins
/// the worker within a bounded timeout. Dropping a running engine joins the
/// worker unbounded. Metrics accumulate across restarts.
pub struct RingEngine<T> {
    name: String,
    config: Config,
    state: AtomicU8,
    metrics: Arc<Metrics>,
    ring: RwLock<Option<Arc<RingBuffer<T>>>>,
    monitor: Mutex<Option<Worker>>,
}

impl<T: Send + 'static> RingEngine<T> {
    /// Creates a stopped engine. The worker thread will be named `name`.
    pub fn new(name: impl Into<String>, config: Config) -> Result<Self, RingError> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            state: AtomicU8::new(LifecycleState::Stopped as u8),
            metrics: Arc::new(Metrics::new()),
            ring: RwLock::new(None),
            monitor: Mutex::new(None),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Slots still free in the live ring, or `None` while not running.
    pub fn remaining_capacity(&self) -> Option<usize> {
        self.ring.read().as_ref().map(|ring| ring.remaining_capacity())
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Starts the worker with `handler`. A no-op while already running, in
    /// which case `handler` is dropped unused.
    ///
    /// If a previous `stop` timed out, the old worker is joined first and its
    /// timeout error is returned if it is still busy.
    pub fn start<H, X>(&self, handler: H, exceptions: X) -> Result<(), RingError>
    where
        H: EventHandler<T> + 'static,
        X: ExceptionHandler + 'static,
    {
        let mut monitor = self.monitor.lock();
        match self.state() {
            LifecycleState::Running | LifecycleState::Starting => return Ok(()),
            LifecycleState::Stopping => {
                self.finish_stop(&mut monitor, self.config.shutdown_timeout)?;
            }
            LifecycleState::Stopped => {}
        }

        self.set_state(LifecycleState::Starting);
        match self.spawn(handler, exceptions) {
            Ok((ring, worker)) => {
                *self.ring.write() = Some(ring);
                *monitor = Some(worker);
                self.set_state(LifecycleState::Running);
                info!(component = %self.name, capacity = self.config.capacity, "started");
                Ok(())
            }
            Err(e) => {
                self.set_state(LifecycleState::Stopped);
                Err(e)
            }
        }
    }

    fn spawn<H, X>(
        &self,
        handler: H,
        exceptions: X,
    ) -> Result<(Arc<RingBuffer<T>>, Worker), RingError>
    where
        H: EventHandler<T> + 'static,
        X: ExceptionHandler + 'static,
    {
        let ring = Arc::new(RingBuffer::with_metrics(self.config, Arc::clone(&self.metrics))?);
        let consumer = ring.consumer()?;
        let finished = Arc::new(Latch::default());
        let latch = LatchGuard(Arc::clone(&finished));
        let name = self.name.clone();

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let _latch = latch;
                ConsumerLoop::new(name, consumer, handler, exceptions).run();
            })
            .map_err(RingError::Spawn)?;

        Ok((ring, Worker { handle, finished }))
    }

    /// Publishes `item` to the live ring according to the publish policy.
    pub fn publish(&self, item: T) -> Result<Sequence, RingError> {
        if !self.is_running() {
            return Err(RingError::NotRunning);
        }
        let ring = self
            .ring
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(RingError::NotRunning)?;
        ring.push(item)
    }

    /// Stops with the configured shutdown timeout.
    pub fn stop(&self) -> Result<(), RingError> {
        self.stop_timeout(self.config.shutdown_timeout)
    }

    /// Halts the ring, waits up to `timeout` for the worker to drain already
    /// published items, then joins it. A no-op while stopped.
    ///
    /// On timeout the component stays `Stopping` and
    /// [`RingError::ShutdownTimeout`] is returned; calling `stop` again keeps
    /// waiting for the same worker.
    pub fn stop_timeout(&self, timeout: Duration) -> Result<(), RingError> {
        let mut monitor = self.monitor.lock();
        match self.state() {
            LifecycleState::Stopped => return Ok(()),
            LifecycleState::Running | LifecycleState::Starting => {
                self.set_state(LifecycleState::Stopping);
                debug!(component = %self.name, "stopping");
            }
            LifecycleState::Stopping => {}
        }

        if let Some(ring) = self.ring.read().as_ref() {
            ring.halt();
        }
        self.finish_stop(&mut monitor, timeout)
    }

    fn finish_stop(
        &self,
        monitor: &mut Option<Worker>,
        timeout: Duration,
    ) -> Result<(), RingError> {
        if let Some(worker) = monitor.as_ref() {
            if !worker.finished.wait(timeout) {
                warn!(component = %self.name, ?timeout, "worker did not drain before timeout");
                return Err(RingError::ShutdownTimeout { timeout });
            }
        }
        if let Some(worker) = monitor.take() {
            if worker.handle.join().is_err() {
                warn!(component = %self.name, "worker thread panicked");
            }
        }

        *self.ring.write() = None;
        self.set_state(LifecycleState::Stopped);
        info!(component = %self.name, "stopped");
        Ok(())
    }
}

/// Halts the ring and joins the worker without a timeout, so no worker thread
/// outlives its engine. A handler that never returns blocks the drop; call
/// [`RingEngine::stop_timeout`] first when shutdown must be bounded.
impl<T> Drop for RingEngine<T> {
    fn drop(&mut self) {
        if let Some(ring) = self.ring.get_mut().take() {
            ring.halt();
        }
        if let Some(worker) = self.monitor.get_mut().take() {
            let _ = worker.handle.join();
        }
    }
}
