//! Per-component event bus.
//!
//! Each core owns one [`EventBus`]. Emission holds the bus lock for the whole
//! fan-out, so every subscriber sees a component's events in the same total
//! order. Nothing orders events across two different buses.

use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

/// Callback subscriber. Must not emit on the bus that invokes it.
pub type EventCallback<E> = Box<dyn Fn(&E) + Send + Sync>;

enum Subscriber<E> {
    Channel(Sender<E>),
    Callback(EventCallback<E>),
}

/// Fan-out of events to channel and callback subscribers.
pub struct EventBus<E> {
    subscribers: Mutex<Vec<Subscriber<E>>>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe with a channel. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap()
            .push(Subscriber::Channel(tx));
        rx
    }

    /// Subscribe with a callback invoked synchronously on the emitting thread.
    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .unwrap()
            .push(Subscriber::Callback(Box::new(callback)));
    }

    /// Deliver `event` to every live subscriber, pruning disconnected channels.
    pub fn emit(&self, event: E) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|sub| match sub {
            Subscriber::Channel(tx) => tx.send(event.clone()).is_ok(),
            Subscriber::Callback(f) => {
                f(&event);
                true
            }
        });
    }

    /// Number of live subscribers (as of the last emission).
    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_channel_subscribers_receive_in_order() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        for i in 0..5u32 {
            bus.emit(i);
        }
        assert_eq!(a.try_iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert_eq!(b.try_iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let _keep = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(rx);
        bus.emit("ping".to_string());
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_callback_subscriber() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        bus.on_event(move |n: &usize| {
            h.fetch_add(*n, Ordering::SeqCst);
        });
        bus.emit(2);
        bus.emit(3);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus: EventBus<u8> = EventBus::default();
        bus.emit(1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
