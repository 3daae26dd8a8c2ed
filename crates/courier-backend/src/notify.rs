//! Change notification.
//!
//! A [`Notifier`] fans every event out to two kinds of listener: synchronous
//! handlers registered with [`Notifier::subscribe`], which run on the writer's
//! thread after the write has committed, and async consumers holding a
//! [`broadcast::Receiver`] from [`Notifier::receiver`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use courier_core::UserId;
use courier_store::Collection;
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// A committed change to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Collection of the changed record.
    pub collection: Collection,
    /// Key of the changed record.
    pub key: String,
    /// Owning record, for records scoped to another (a message's chat).
    pub parent: Option<String>,
}

impl Change {
    /// A change to a top-level record.
    #[must_use]
    pub fn new(collection: Collection, key: impl Into<String>) -> Self {
        Self {
            collection,
            key: key.into(),
            parent: None,
        }
    }

    /// A change to a record owned by `parent`.
    #[must_use]
    pub fn scoped(collection: Collection, key: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            collection,
            key: key.into(),
            parent: Some(parent.into()),
        }
    }
}

/// A change to the active local account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// An account logged in and became active.
    LoggedIn(UserId),
    /// The active account switched to another registered one.
    Switched(UserId),
    /// The active account was cleared.
    LoggedOut,
    /// An account was forgotten by this device.
    Removed(UserId),
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: AtomicU64,
    handlers: Mutex<BTreeMap<u64, Handler<E>>>,
}

/// Fans events out to subscribed handlers and broadcast receivers.
pub struct Notifier<E> {
    registry: Arc<Registry<E>>,
    sender: broadcast::Sender<E>,
}

impl<E: Clone + Send + 'static> Notifier<E> {
    /// Create a notifier whose broadcast channel holds `buffer` events.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                handlers: Mutex::new(BTreeMap::new()),
            }),
            sender,
        }
    }

    /// Register a handler, called once per event in subscription order.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped or unsubscribed.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.handlers.lock().insert(id, Arc::new(handler));

        let registry: Weak<Registry<E>> = Arc::downgrade(&self.registry);
        Subscription {
            release: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.handlers.lock().remove(&id);
                }
            })),
        }
    }

    /// Deliver an event to every handler and broadcast receiver.
    ///
    /// Handlers run without the registry lock held, so they may subscribe,
    /// unsubscribe or trigger further writes.
    pub fn notify(&self, event: E) {
        let handlers: Vec<Handler<E>> = self.registry.handlers.lock().values().cloned().collect();
        for handler in handlers {
            handler(&event);
        }
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// A receiver for async consumers.
    ///
    /// Slow receivers observe `RecvError::Lagged` instead of blocking writers.
    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.registry.handlers.lock().len()
    }
}

impl<E> Clone for Notifier<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            sender: self.sender.clone(),
        }
    }
}

impl<E> fmt::Debug for Notifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("handlers", &self.registry.handlers.lock().len())
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

/// Handle to a registered handler.
///
/// Dropping it unregisters the handler.
#[must_use = "dropping a subscription unregisters its handler"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Unregister the handler now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_run_in_subscription_order() {
        let notifier = Notifier::<u32>::new(8);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        let _a = notifier.subscribe(move |e| first.lock().push(("a", *e)));
        let second = Arc::clone(&seen);
        let _b = notifier.subscribe(move |e| second.lock().push(("b", *e)));

        notifier.notify(7);
        assert_eq!(*seen.lock(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let notifier = Notifier::<u32>::new(8);
        let count = Arc::new(AtomicU64::new(0));

        let c = Arc::clone(&count);
        let sub = notifier.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        notifier.notify(1);
        drop(sub);
        notifier.notify(2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.handler_count(), 0);
    }

    #[test]
    fn handler_may_subscribe_during_notify() {
        let notifier = Notifier::<u32>::new(8);
        let inner = notifier.clone();
        let nested = Arc::new(Mutex::new(Vec::new()));

        let n = Arc::clone(&nested);
        let _outer = notifier.subscribe(move |_| {
            n.lock().push(inner.subscribe(|_| {}));
        });
        notifier.notify(1);

        assert_eq!(notifier.handler_count(), 2);
    }

    #[tokio::test]
    async fn receivers_get_every_event() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.receiver();

        notifier.notify(Change::new(Collection::Chats, "c1"));
        notifier.notify(Change::scoped(Collection::Messages, "m1", "c1"));

        assert_eq!(rx.recv().await.unwrap().key, "c1");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.parent.as_deref(), Some("c1"));
    }

    #[test]
    fn notify_without_listeners_is_noop() {
        let notifier = Notifier::<AuthEvent>::new(0);
        notifier.notify(AuthEvent::LoggedOut);
    }
}
