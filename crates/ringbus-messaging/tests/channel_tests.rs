use ringbus::{BoxError, LifecycleState};
use ringbus_messaging::{
    ChannelConfig, ChannelRegistry, ErrorHandler, ErrorMessage, ErrorPayload, HandlerRef,
    LoadBalancing, Message, MessageBuilder, MessageHeaders, MessagePublishingErrorHandler,
    MessagingError, RingBufferChannel,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Error handler that remembers what it was given.
#[derive(Default)]
struct RecordingErrors(Mutex<Vec<(String, Option<MessageHeaders>)>>);

impl ErrorHandler for RecordingErrors {
    fn handle_error(&self, error: MessagingError, failed: Option<&MessageHeaders>) {
        self.0.lock().unwrap().push((error.to_string(), failed.cloned()));
    }
}

fn recording(into: &Arc<Mutex<Vec<u32>>>) -> HandlerRef<u32> {
    let sink = Arc::clone(into);
    Arc::new(move |m: &Message<u32>| -> Result<(), BoxError> {
        sink.lock().unwrap().push(*m.payload());
        Ok(())
    })
}

fn failing(calls: &Arc<AtomicUsize>) -> HandlerRef<u32> {
    let calls = Arc::clone(calls);
    Arc::new(move |_: &Message<u32>| -> Result<(), BoxError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Err("unavailable".into())
    })
}

#[test]
fn test_round_robin_across_subscribers() {
    let channel = RingBufferChannel::new("rr", ChannelConfig::default()).unwrap();
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    channel.subscribe(recording(&first)).unwrap();
    channel.subscribe(recording(&second)).unwrap();

    channel.start().unwrap();
    for i in 0..10 {
        channel.send(Message::new(i)).unwrap();
    }
    channel.stop().unwrap();

    assert_eq!(*first.lock().unwrap(), vec![0, 2, 4, 6, 8]);
    assert_eq!(*second.lock().unwrap(), vec![1, 3, 5, 7, 9]);
}

#[test]
fn test_without_load_balancing_first_subscriber_takes_all() {
    let config = ChannelConfig::default().with_load_balancing(LoadBalancing::None);
    let channel = RingBufferChannel::new("first", config).unwrap();
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    channel.subscribe(recording(&first)).unwrap();
    channel.subscribe(recording(&second)).unwrap();

    channel.start().unwrap();
    for i in 0..10 {
        channel.send(Message::new(i)).unwrap();
    }
    channel.stop().unwrap();

    assert_eq!(*first.lock().unwrap(), (0..10).collect::<Vec<_>>());
    assert!(second.lock().unwrap().is_empty());
}

#[test]
fn test_without_load_balancing_failover_reaches_second_subscriber() {
    let calls = Arc::new(AtomicUsize::new(0));
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let config = ChannelConfig::default().with_load_balancing(LoadBalancing::None);

    let channel = RingBufferChannel::new("first-failover", config).unwrap();
    channel.subscribe(failing(&calls)).unwrap();
    channel.subscribe(recording(&delivered)).unwrap();

    channel.start().unwrap();
    for i in 0..10 {
        channel.send(Message::new(i)).unwrap();
    }
    channel.stop().unwrap();

    assert_eq!(*delivered.lock().unwrap(), (0..10).collect::<Vec<_>>());
    assert_eq!(calls.load(Ordering::SeqCst), 10);
}

#[test]
fn test_failover_to_next_subscriber() {
    let calls = Arc::new(AtomicUsize::new(0));
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(RecordingErrors::default());

    let channel = RingBufferChannel::new("failover", ChannelConfig::default())
        .unwrap()
        .with_error_handler(errors.clone());
    channel.subscribe(failing(&calls)).unwrap();
    channel.subscribe(recording(&delivered)).unwrap();

    channel.start().unwrap();
    for i in 0..10 {
        channel.send(Message::new(i)).unwrap();
    }
    channel.stop().unwrap();

    assert_eq!(*delivered.lock().unwrap(), (0..10).collect::<Vec<_>>());
    // Only the messages whose turn started at the failing handler touched it.
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert!(errors.0.lock().unwrap().is_empty());
}

#[test]
fn test_without_failover_failures_reach_error_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(RecordingErrors::default());

    let config = ChannelConfig::default().with_failover(false);
    let channel = RingBufferChannel::new("no-failover", config)
        .unwrap()
        .with_error_handler(errors.clone());
    channel.subscribe(failing(&calls)).unwrap();
    channel.subscribe(recording(&delivered)).unwrap();

    channel.start().unwrap();
    for i in 0..10 {
        channel.send(Message::new(i)).unwrap();
    }
    channel.stop().unwrap();

    assert_eq!(*delivered.lock().unwrap(), vec![1, 3, 5, 7, 9]);
    let errors = errors.0.lock().unwrap();
    assert_eq!(errors.len(), 5);
    assert!(errors.iter().all(|(e, headers)| e.contains("1 attempt") && headers.is_some()));
}

#[test]
fn test_failing_message_is_isolated() {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    let errors = Arc::new(RecordingErrors::default());

    let channel = RingBufferChannel::new("isolated", ChannelConfig::default())
        .unwrap()
        .with_error_handler(errors.clone());
    channel
        .subscribe(Arc::new(move |m: &Message<u32>| -> Result<(), BoxError> {
            match *m.payload() {
                5 => Err("bad item".into()),
                7 => panic!("handler panicked"),
                v => {
                    sink.lock().unwrap().push(v);
                    Ok(())
                }
            }
        }))
        .unwrap();

    channel.start().unwrap();
    let mut ids = Vec::new();
    for i in 0..10 {
        let message = Message::new(i);
        ids.push(message.headers().id());
        channel.send(message).unwrap();
    }
    channel.stop().unwrap();

    assert_eq!(*delivered.lock().unwrap(), vec![0, 1, 2, 3, 4, 6, 8, 9]);
    let errors = errors.0.lock().unwrap();
    let failed_ids: Vec<_> = errors
        .iter()
        .map(|(_, headers)| headers.as_ref().unwrap().id())
        .collect();
    assert_eq!(failed_ids, vec![ids[5], ids[7]]);
    // Dispatch failures are handled by the channel, not counted as consumer failures.
    assert_eq!(channel.metrics().handler_failures, 0);
}

#[test]
fn test_no_subscribers_reported() {
    let errors = Arc::new(RecordingErrors::default());
    let channel = RingBufferChannel::<u32>::new("empty", ChannelConfig::default())
        .unwrap()
        .with_error_handler(errors.clone());

    channel.start().unwrap();
    channel.send(Message::new(1)).unwrap();
    channel.stop().unwrap();

    let errors = errors.0.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "dispatcher has no subscribers");
}

#[test]
fn test_failures_published_to_error_channel() {
    let registry = Arc::new(ChannelRegistry::<ErrorPayload>::new());
    let published = Arc::new(Mutex::new(Vec::<ErrorMessage>::new()));
    let sink = Arc::clone(&published);
    registry.register(
        "orders.errors",
        Arc::new(move |m: ErrorMessage| -> Result<(), MessagingError> {
            sink.lock().unwrap().push(m);
            Ok(())
        }),
    );

    let channel = RingBufferChannel::new("orders", ChannelConfig::default())
        .unwrap()
        .with_error_handler(Arc::new(MessagePublishingErrorHandler::new(registry)));
    channel
        .subscribe(Arc::new(|_: &Message<u32>| -> Result<(), BoxError> {
            Err("rejected order".into())
        }))
        .unwrap();

    channel.start().unwrap();
    let order = MessageBuilder::with_payload(42)
        .error_channel("orders.errors")
        .correlation_id("order-42")
        .build();
    let order_id = order.headers().id();
    channel.send(order).unwrap();
    channel.stop().unwrap();

    let published = published.lock().unwrap();
    assert_eq!(published.len(), 1);
    let error = &published[0];
    assert!(error.payload().description.contains("rejected order"));
    assert_eq!(error.payload().failed_headers.as_ref().map(MessageHeaders::id), Some(order_id));
    assert_eq!(error.headers().correlation_id().and_then(|v| v.as_str()), Some("order-42"));
}

#[test]
fn test_start_stop_idempotent_and_restartable() {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let channel = RingBufferChannel::new("lifecycle", ChannelConfig::default()).unwrap();
    channel.subscribe(recording(&delivered)).unwrap();

    assert_eq!(channel.state(), LifecycleState::Stopped);
    channel.stop().unwrap();

    channel.start().unwrap();
    channel.start().unwrap();
    assert!(channel.is_running());
    channel.send(Message::new(1)).unwrap();
    channel.stop().unwrap();
    channel.stop().unwrap();
    assert_eq!(channel.state(), LifecycleState::Stopped);
    assert!(channel.send(Message::new(2)).is_err());

    channel.start().unwrap();
    channel.send(Message::new(3)).unwrap();
    channel.stop().unwrap();

    assert_eq!(*delivered.lock().unwrap(), vec![1, 3]);
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    let first_handler = recording(&first);

    let channel = RingBufferChannel::new("unsubscribe", ChannelConfig::default()).unwrap();
    channel.subscribe(Arc::clone(&first_handler)).unwrap();
    channel.subscribe(recording(&second)).unwrap();
    assert!(!channel.subscribe(Arc::clone(&first_handler)).unwrap());

    assert!(channel.unsubscribe(&first_handler));
    assert!(!channel.unsubscribe(&first_handler));
    assert_eq!(channel.subscriber_count(), 1);

    channel.start().unwrap();
    for i in 0..4 {
        channel.send(Message::new(i)).unwrap();
    }
    channel.stop().unwrap();

    assert!(first.lock().unwrap().is_empty());
    assert_eq!(*second.lock().unwrap(), vec![0, 1, 2, 3]);
}
