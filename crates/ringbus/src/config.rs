use crate::RingError;
use std::time::Duration;

/// How many threads may claim and publish sequences concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProducerType {
    /// Exactly one producer thread. Claiming skips the CAS on the write path.
    ///
    /// At most one claim may be outstanding: publish or drop it before
    /// taking the next, and never claim from two threads. Violations are
    /// caught by a debug assertion only.
    Single,
    /// Any number of producer threads.
    #[default]
    Multi,
}

/// How the consumer thread waits for new sequences to be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategyKind {
    /// Busy-spin re-checking the cursor. Lowest latency, burns a core.
    Spin,
    /// Spin briefly, then yield to the scheduler on each retry.
    Yield,
    /// Park on a condition variable until a publisher signals.
    #[default]
    Block,
}

/// What a producer does when the ring buffer has no free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishPolicy {
    /// Wait until the consumer frees a slot (or the ring is halted).
    BlockWhenFull,
    /// Fail immediately with [`RingError::Rejected`].
    #[default]
    RejectWhenFull,
}

/// Configuration for a ring buffer and the component driving it.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Number of slots; must be a power of two (default: 1024)
    pub capacity: usize,
    /// Producer arity (default: Multi)
    pub producer_type: ProducerType,
    /// Consumer wait strategy (default: Block)
    pub wait_strategy: WaitStrategyKind,
    /// Producer behavior when full (default: RejectWhenFull)
    pub publish_policy: PublishPolicy,
    /// Upper bound on the graceful drain performed by `stop()` (default: 30s)
    pub shutdown_timeout: Duration,
    /// Enable metrics collection (slight overhead)
    pub enable_metrics: bool,
}

impl Config {
    /// Default number of slots.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Default bound on the drain performed when stopping.
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a new configuration with custom settings.
    pub const fn new(
        capacity: usize,
        producer_type: ProducerType,
        wait_strategy: WaitStrategyKind,
        publish_policy: PublishPolicy,
    ) -> Self {
        Self {
            capacity,
            producer_type,
            wait_strategy,
            publish_policy,
            shutdown_timeout: Self::DEFAULT_SHUTDOWN_TIMEOUT,
            enable_metrics: false,
        }
    }

    /// Checks the invariants that cannot be expressed in the type.
    pub fn validate(&self) -> Result<(), RingError> {
        if self.capacity == 0 || !self.capacity.is_power_of_two() {
            return Err(RingError::InvalidCapacity {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Returns the mask for index wrapping.
    #[inline]
    pub const fn mask(&self) -> usize {
        self.capacity.wrapping_sub(1)
    }

    /// Sets the capacity.
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the producer type.
    pub const fn with_producer_type(mut self, producer_type: ProducerType) -> Self {
        self.producer_type = producer_type;
        self
    }

    /// Sets the wait strategy.
    pub const fn with_wait_strategy(mut self, wait_strategy: WaitStrategyKind) -> Self {
        self.wait_strategy = wait_strategy;
        self
    }

    /// Sets the publish policy.
    pub const fn with_publish_policy(mut self, publish_policy: PublishPolicy) -> Self {
        self.publish_policy = publish_policy;
        self
    }

    /// Sets the shutdown timeout.
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enables or disables metrics.
    pub const fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_CAPACITY,
            ProducerType::Multi,
            WaitStrategyKind::Block,
            PublishPolicy::RejectWhenFull,
        )
    }
}

/// Low latency configuration (4K slots, busy-spin consumer, single producer)
pub const LOW_LATENCY_CONFIG: Config = Config::new(
    4096,
    ProducerType::Single,
    WaitStrategyKind::Spin,
    PublishPolicy::BlockWhenFull,
);

/// High throughput configuration (64K slots, yielding consumer, producers block when full)
pub const HIGH_THROUGHPUT_CONFIG: Config = Config::new(
    65536,
    ProducerType::Multi,
    WaitStrategyKind::Yield,
    PublishPolicy::BlockWhenFull,
);
