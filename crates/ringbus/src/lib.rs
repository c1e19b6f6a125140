//! ringbus - Pre-allocated Ring Buffer Work Queues
//!
//! A fixed-capacity ring buffer of reusable slots, addressed by a
//! monotonically increasing sequence counter, with one dedicated consumer
//! thread per buffer. Producers claim a sequence, fill its slot and publish
//! it; the consumer drains published sequences strictly in order.
//!
//! # Key Features
//!
//! - Single-producer mode with no CAS on the write path
//! - Multi-producer mode with in-order publication
//! - Spin / Yield / Block consumer wait strategies
//! - Block-when-full or reject-when-full publish policies
//! - Batch-aware consumption (`end_of_batch`, single gating update per batch)
//! - Restartable lifecycle with bounded, draining shutdown
//!
//! # Example
//!
//! ```
//! use ringbus::{Config, RingBuffer};
//! use std::sync::Arc;
//!
//! let ring = Arc::new(RingBuffer::<u64>::new(Config::default()).unwrap());
//! let mut consumer = ring.consumer().unwrap();
//!
//! ring.push(42).unwrap();
//! ring.push(43).unwrap();
//!
//! let available = consumer.wait_for(0).unwrap();
//! let items: Vec<u64> = consumer
//!     .drain_up_to(0, available)
//!     .filter_map(|(_, item)| item)
//!     .collect();
//! consumer.release(available);
//!
//! assert_eq!(items, vec![42, 43]);
//! ```

mod backoff;
mod claim;
mod config;
mod engine;
mod error;
mod executor;
mod invariants;
mod metrics;
mod processor;
mod ring;
mod wait;

pub use backoff::Backoff;
pub use claim::Claim;
pub use config::{
    Config, ProducerType, PublishPolicy, WaitStrategyKind, HIGH_THROUGHPUT_CONFIG,
    LOW_LATENCY_CONFIG,
};
pub use engine::{LifecycleState, RingEngine};
pub use error::{BoxError, HandlerError, RingError};
pub use executor::{RingBufferTaskExecutor, Task};
pub use metrics::{Metrics, MetricsSnapshot};
pub use processor::{ConsumerLoop, EventHandler, ExceptionHandler, LoggingExceptionHandler};
pub use ring::{Drain, RingBuffer, RingConsumer, Sequence, INITIAL_CURSOR_VALUE};
pub use wait::{WaitError, BLOCK_POLL_INTERVAL};
