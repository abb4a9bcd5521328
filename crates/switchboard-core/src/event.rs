//! Typed, instance-owned event hubs.
//!
//! Each [`EventHub`] fans an event out to every current listener, in
//! subscription order. Subscribing returns a [`Subscription`] guard that
//! removes the listener when dropped; call [`Subscription::detach`] to keep
//! the listener for the lifetime of the hub instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::error::MiddlewareError;
use crate::update::Update;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct HubInner<E> {
    listeners: RwLock<Vec<(u64, Listener<E>)>>,
    next_id: AtomicU64,
}

/// A multi-listener event hub.
pub struct EventHub<E> {
    inner: Arc<HubInner<E>>,
}

impl<E> Clone for EventHub<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for EventHub<E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(HubInner {
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

impl<E: 'static> EventHub<E> {
    /// Creates a hub with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().push((id, Arc::new(listener)));

        let weak: Weak<HubInner<E>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.listeners.write().retain(|(other, _)| *other != id);
                }
            })),
        }
    }

    /// Calls every listener with `event`.
    ///
    /// Listeners run synchronously on the caller's task, outside of the hub's
    /// lock, so a listener may subscribe or unsubscribe.
    pub fn emit(&self, event: &E) {
        let listeners: Vec<Listener<E>> = self
            .inner
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

impl<E: Clone + Send + 'static> EventHub<E> {
    /// Registers a listener forwarding events into an unbounded channel.
    ///
    /// The listener stays registered until the subscription is dropped; events
    /// emitted after the receiver is dropped are discarded.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event: &E| {
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }
}

/// Guard that removes a listener from its hub when dropped.
#[must_use = "dropping a Subscription unsubscribes the listener immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Removes the listener now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keeps the listener registered for the lifetime of the hub.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Events emitted by a bot that is not attached to a registry.
#[derive(Debug, Clone)]
pub enum BotEvent {
    /// An update made it through the bot's incoming chain.
    Update(Update),
    /// A middleware failed while handling the bot's traffic.
    Error(MiddlewareError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_every_listener_receives_events_in_order() {
        let hub = EventHub::<u32>::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let first = {
            let seen = Arc::clone(&seen);
            hub.subscribe(move |n| seen.lock().push(("first", *n)))
        };
        let second = {
            let seen = Arc::clone(&seen);
            hub.subscribe(move |n| seen.lock().push(("second", *n)))
        };

        hub.emit(&7);
        assert_eq!(*seen.lock(), vec![("first", 7), ("second", 7)]);
        drop(first);
        drop(second);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let hub = EventHub::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let sub = {
            let count = Arc::clone(&count);
            hub.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        hub.emit(&());
        drop(sub);
        hub.emit(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn test_detached_subscription_stays() {
        let hub = EventHub::<()>::new();
        hub.subscribe(|_| {}).detach();
        assert_eq!(hub.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let hub = EventHub::<String>::new();
        let (sub, mut rx) = hub.subscribe_channel();
        hub.emit(&"hello".to_string());
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
        sub.unsubscribe();
        assert_eq!(hub.listener_count(), 0);
    }
}
