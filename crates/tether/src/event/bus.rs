use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

struct BusState<E> {
    subscribers: Vec<UnboundedSender<E>>,
    closed: bool,
}

/// Thread-safe publish/subscribe fan-out. Every `publish` hands exactly one
/// clone of the event to each subscriber that is still listening.
pub struct EventBus<E> {
    state: Arc<Mutex<BusState<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                subscribers: Vec::new(),
                closed: false,
            })),
        }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("EventBus")
            .field("subscribers", &state.subscribers.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscriber registered after `close` receives nothing and sees the
    /// stream end immediately.
    pub fn subscribe(&self) -> UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        if !state.closed {
            state.subscribers.push(tx);
        }
        rx
    }

    /// Returns the number of subscribers the event was delivered to.
    pub fn publish(&self, event: E) -> usize {
        let mut state = self.lock();
        state
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        state.subscribers.len()
    }

    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl<E> EventBus<E> {
    fn lock(&self) -> MutexGuard<'_, BusState<E>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_subscriber_gets_one_copy() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(7u32), 2);

        assert_eq!(first.try_recv().ok(), Some(7));
        assert!(first.try_recv().is_err());
        assert_eq!(second.try_recv().ok(), Some(7));
        assert!(second.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscribers_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        assert_eq!(bus.publish(1u8), 1);
        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
        assert_eq!(bus.publish(2u8), 0);
    }

    #[test]
    fn test_close_ends_streams() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(1u8);
        bus.close();

        assert_eq!(rx.try_recv().ok(), Some(1));
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        let mut late = bus.subscribe();
        assert!(bus.is_closed());
        assert_eq!(bus.publish(2u8), 0);
        assert!(matches!(
            late.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
