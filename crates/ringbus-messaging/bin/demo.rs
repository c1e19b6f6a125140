//! # Order pipeline demo
//!
//! Wires the messaging pieces together:
//!
//! - an `orders` [`RingBufferChannel`] with two round-robin workers
//! - each worker forwards to a [`BatchingMessageHandler`] that groups orders
//!   and replies to the channel named in the `reply_to` header
//! - one worker fails every tenth order it sees; with failover off those
//!   failures are published to an `orders.errors` channel through a
//!   [`MessagePublishingErrorHandler`]
//!
//! ## Running
//!
//! ```bash
//! cargo run -p ringbus-messaging --bin demo --release
//! RUST_LOG=ringbus=debug,ringbus_messaging=trace \
//!     cargo run -p ringbus-messaging --bin demo -- --orders 200
//! ```

use ringbus::{BoxError, Config, PublishPolicy};
use ringbus_messaging::{
    BatchConfig, BatchingMessageHandler, ChannelConfig, ChannelRegistry, ErrorMessage,
    ErrorPayload, HeaderMergeStrategy, Message, MessageBuilder, MessagePublishingErrorHandler,
    MessagingError, RingBufferChannel,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Order {
    id: u64,
    amount_cents: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let orders: u64 = args
        .iter()
        .position(|a| a == "--orders")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(1_000);

    // Error channel: collects failures as messages.
    let failures = Arc::new(AtomicUsize::new(0));
    let error_registry = Arc::new(ChannelRegistry::<ErrorPayload>::new());
    {
        let failures = Arc::clone(&failures);
        error_registry.register(
            "orders.errors",
            Arc::new(move |m: ErrorMessage| -> Result<(), MessagingError> {
                failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    correlation = ?m.headers().correlation_id(),
                    error = %m.payload().description,
                    "order failed"
                );
                Ok(())
            }),
        );
    }

    // Reply channel for batches.
    let batched = Arc::new(AtomicUsize::new(0));
    let batches = Arc::new(AtomicUsize::new(0));
    let replies = Arc::new(ChannelRegistry::<Vec<Order>>::new());
    {
        let batched = Arc::clone(&batched);
        let batches = Arc::clone(&batches);
        replies.register(
            "orders.batched",
            Arc::new(move |m: Message<Vec<Order>>| -> Result<(), MessagingError> {
                batched.fetch_add(m.payload().len(), Ordering::Relaxed);
                batches.fetch_add(1, Ordering::Relaxed);
                let total: u64 = m.payload().iter().map(|o| o.amount_cents).sum();
                info!(size = m.payload().len(), total_cents = total, "batch settled");
                Ok(())
            }),
        );
    }

    let ring = Config::default()
        .with_capacity(256)
        .with_publish_policy(PublishPolicy::BlockWhenFull)
        .with_metrics(true);

    let batcher = Arc::new(
        BatchingMessageHandler::<Order>::new(
            "orders.batcher",
            BatchConfig::new(ring, 32).with_merge_strategy(HeaderMergeStrategy::ConflictDiscarding),
        )?
        .with_channel_registry(replies),
    );

    let channel =
        RingBufferChannel::<Order>::new("orders", ChannelConfig::new(ring).with_failover(false))?
            .with_error_handler(Arc::new(MessagePublishingErrorHandler::new(error_registry)));

    // Two workers share the channel round-robin.
    {
        let batcher = Arc::clone(&batcher);
        channel.subscribe(Arc::new(move |m: &Message<Order>| -> Result<(), BoxError> {
            if m.payload().id % 10 == 0 {
                return Err(format!("order {} failed validation", m.payload().id).into());
            }
            batcher.handle(m.clone())?;
            Ok(())
        }))?;
    }
    channel.subscribe(batcher.clone())?;

    batcher.start()?;
    channel.start()?;

    let started = Instant::now();
    for id in 0..orders {
        let order = MessageBuilder::with_payload(Order {
            id,
            amount_cents: 100 + id % 50,
        })
        .reply_to("orders.batched")
        .error_channel("orders.errors")
        .correlation_id(format!("order-{id}"))
        .build();
        channel.send(order)?;
    }

    channel.stop()?;
    batcher.stop()?;
    let elapsed = started.elapsed();

    let channel_metrics = channel.metrics();
    let batcher_metrics = batcher.metrics();
    info!(
        orders,
        batched = batched.load(Ordering::Relaxed),
        batches = batches.load(Ordering::Relaxed),
        failed = failures.load(Ordering::Relaxed),
        ?elapsed,
        "pipeline drained"
    );
    info!(
        published = channel_metrics.published,
        consumed = channel_metrics.consumed,
        batcher_consumed = batcher_metrics.consumed,
        batcher_batches = batcher_metrics.batches,
        "ring metrics"
    );
    Ok(())
}
