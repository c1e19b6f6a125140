use crate::{Message, MessageHandler, MessagingError};
use parking_lot::{Mutex, RwLock};
use ringbus::{BoxError, HandlerError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared handle to a subscribed handler.
pub type HandlerRef<P> = Arc<dyn MessageHandler<P>>;

/// Which subscriber a dispatch starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadBalancing {
    /// Rotate the starting subscriber on every message (default)
    #[default]
    RoundRobin,
    /// Always start at the first subscriber; the rest only see failovers
    None,
}

/// Delivers each message to exactly one subscriber, chosen round-robin.
///
/// With failover enabled a failing handler (error or panic) passes the
/// message on to the next one in rotation until one succeeds or all have
/// been tried. Subscriptions are copy-on-write, so dispatch never holds a
/// lock while calling into a handler.
pub struct UnicastingDispatcher<P> {
    handlers: RwLock<Arc<[HandlerRef<P>]>>,
    /// Serializes subscribe/unsubscribe.
    writer: Mutex<()>,
    next: AtomicUsize,
    failover: bool,
    max_subscribers: usize,
    load_balancing: LoadBalancing,
}

impl<P> UnicastingDispatcher<P> {
    pub fn new(failover: bool, max_subscribers: usize, load_balancing: LoadBalancing) -> Self {
        Self {
            handlers: RwLock::new(Arc::from(Vec::new())),
            writer: Mutex::new(()),
            next: AtomicUsize::new(0),
            failover,
            max_subscribers,
            load_balancing,
        }
    }

    #[inline]
    pub fn failover(&self) -> bool {
        self.failover
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Adds `handler`. Returns `Ok(false)` if it was already subscribed.
    pub fn subscribe(&self, handler: HandlerRef<P>) -> Result<bool, MessagingError> {
        let _writer = self.writer.lock();
        let current = Arc::clone(&self.handlers.read());
        if current.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return Ok(false);
        }
        if current.len() >= self.max_subscribers {
            return Err(MessagingError::TooManySubscribers {
                max: self.max_subscribers,
            });
        }
        let mut updated = current.to_vec();
        updated.push(handler);
        *self.handlers.write() = Arc::from(updated);
        Ok(true)
    }

    /// Removes `handler`. Returns whether it was subscribed.
    pub fn unsubscribe(&self, handler: &HandlerRef<P>) -> bool {
        let _writer = self.writer.lock();
        let current = Arc::clone(&self.handlers.read());
        let updated: Vec<_> = current
            .iter()
            .filter(|h| !Arc::ptr_eq(h, handler))
            .cloned()
            .collect();
        if updated.len() == current.len() {
            return false;
        }
        *self.handlers.write() = Arc::from(updated);
        true
    }

    /// Hands `message` to one subscriber.
    pub fn dispatch(&self, message: &Message<P>) -> Result<(), MessagingError> {
        let handlers = Arc::clone(&self.handlers.read());
        if handlers.is_empty() {
            return Err(MessagingError::NoSubscribers);
        }

        let start = match self.load_balancing {
            LoadBalancing::RoundRobin => self.next.fetch_add(1, Ordering::Relaxed) % handlers.len(),
            LoadBalancing::None => 0,
        };
        let mut attempts = 0;
        let mut last_error: Option<BoxError> = None;

        for offset in 0..handlers.len() {
            let handler = &handlers[(start + offset) % handlers.len()];
            attempts += 1;
            match invoke(handler.as_ref(), message) {
                Ok(()) => return Ok(()),
                Err(error) if self.failover && offset + 1 < handlers.len() => {
                    debug!(
                        message_id = %message.headers().id(),
                        attempts,
                        error = %error,
                        "handler failed, failing over"
                    );
                    last_error = Some(error);
                }
                Err(error) => {
                    last_error = Some(error);
                    break;
                }
            }
        }

        Err(MessagingError::DeliveryFailed {
            attempts,
            source: last_error.unwrap_or_else(|| "no handler attempted".into()),
        })
    }
}

fn invoke<P>(handler: &dyn MessageHandler<P>, message: &Message<P>) -> Result<(), BoxError> {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle_message(message))) {
        Ok(result) => result,
        Err(payload) => Err(Box::new(HandlerError::from_panic(payload.as_ref()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting(counter: &Arc<AtomicUsize>) -> HandlerRef<u32> {
        let counter = Arc::clone(counter);
        Arc::new(move |_: &Message<u32>| -> Result<(), BoxError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn failing() -> HandlerRef<u32> {
        Arc::new(|_: &Message<u32>| -> Result<(), BoxError> { Err("down".into()) })
    }

    #[test]
    fn test_round_robin() {
        let dispatcher = UnicastingDispatcher::new(true, usize::MAX, LoadBalancing::RoundRobin);
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        dispatcher.subscribe(counting(&a)).unwrap();
        dispatcher.subscribe(counting(&b)).unwrap();

        for i in 0..10 {
            dispatcher.dispatch(&Message::new(i)).unwrap();
        }
        assert_eq!(a.load(Ordering::SeqCst), 5);
        assert_eq!(b.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_without_load_balancing_first_handler_takes_all() {
        let dispatcher = UnicastingDispatcher::new(true, usize::MAX, LoadBalancing::None);
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        dispatcher.subscribe(counting(&a)).unwrap();
        dispatcher.subscribe(counting(&b)).unwrap();

        for i in 0..10 {
            dispatcher.dispatch(&Message::new(i)).unwrap();
        }
        assert_eq!(a.load(Ordering::SeqCst), 10);
        assert_eq!(b.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failover_to_next_handler() {
        let dispatcher = UnicastingDispatcher::new(true, usize::MAX, LoadBalancing::RoundRobin);
        let ok = Arc::new(AtomicUsize::new(0));
        dispatcher.subscribe(failing()).unwrap();
        dispatcher.subscribe(counting(&ok)).unwrap();

        for i in 0..4 {
            dispatcher.dispatch(&Message::new(i)).unwrap();
        }
        assert_eq!(ok.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_panicking_handler_fails_over() {
        let dispatcher = UnicastingDispatcher::new(true, usize::MAX, LoadBalancing::RoundRobin);
        let ok = Arc::new(AtomicUsize::new(0));
        let panicking: HandlerRef<u32> =
            Arc::new(|_: &Message<u32>| -> Result<(), BoxError> { panic!("handler bug") });
        dispatcher.subscribe(panicking).unwrap();
        dispatcher.subscribe(counting(&ok)).unwrap();

        dispatcher.dispatch(&Message::new(1)).unwrap();
        dispatcher.dispatch(&Message::new(2)).unwrap();
        assert_eq!(ok.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_without_failover_first_failure_reported() {
        let dispatcher = UnicastingDispatcher::new(false, usize::MAX, LoadBalancing::RoundRobin);
        let ok = Arc::new(AtomicUsize::new(0));
        dispatcher.subscribe(failing()).unwrap();
        dispatcher.subscribe(counting(&ok)).unwrap();

        let results: Vec<_> = (0..2).map(|i| dispatcher.dispatch(&Message::new(i))).collect();
        assert!(matches!(results[0], Err(MessagingError::DeliveryFailed { attempts: 1, .. })));
        assert!(results[1].is_ok());
        assert_eq!(ok.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_all_failing() {
        let dispatcher = UnicastingDispatcher::new(true, usize::MAX, LoadBalancing::RoundRobin);
        dispatcher.subscribe(failing()).unwrap();
        dispatcher.subscribe(failing()).unwrap();
        assert!(matches!(
            dispatcher.dispatch(&Message::new(1)),
            Err(MessagingError::DeliveryFailed { attempts: 2, .. })
        ));
    }

    #[test]
    fn test_no_subscribers() {
        let dispatcher =
            UnicastingDispatcher::<u32>::new(true, usize::MAX, LoadBalancing::RoundRobin);
        assert!(matches!(
            dispatcher.dispatch(&Message::new(1)),
            Err(MessagingError::NoSubscribers)
        ));
    }

    #[test]
    fn test_subscription_bookkeeping() {
        let dispatcher = UnicastingDispatcher::new(true, 2, LoadBalancing::RoundRobin);
        let counter = Arc::new(AtomicUsize::new(0));
        let a = counting(&counter);
        let b = counting(&counter);

        assert!(dispatcher.subscribe(Arc::clone(&a)).unwrap());
        assert!(!dispatcher.subscribe(Arc::clone(&a)).unwrap());
        assert!(dispatcher.subscribe(Arc::clone(&b)).unwrap());
        assert!(matches!(
            dispatcher.subscribe(failing()),
            Err(MessagingError::TooManySubscribers { max: 2 })
        ));

        assert!(dispatcher.unsubscribe(&a));
        assert!(!dispatcher.unsubscribe(&a));
        assert_eq!(dispatcher.subscriber_count(), 1);
    }
}
