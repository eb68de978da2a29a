//! Notification delivery.
//!
//! Two ways to consume server-pushed events:
//!
//! - **Last-value cell** ([`NotificationCell`]): a `watch` slot holding
//!   the newest notification. Readers that fall behind only see the
//!   latest one.
//! - **Subscriptions by name**: callbacks or channels registered for a
//!   message name, invoked from the receive loop.
//!
//! A notification identical to the previous one (same name and value) is
//! dropped before it reaches either.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::driver::shut_down;

/// A decoded server-pushed event.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Short message name, e.g. `NotifyRoomPlayerReady`.
    pub name: String,
    pub value: Value,
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Callback = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Clone)]
enum Handler {
    Callback(Callback),
    Channel(mpsc::UnboundedSender<Notification>),
}

pub(crate) struct NotificationDispatcher {
    latest: watch::Sender<Option<Notification>>,
    handlers: RwLock<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl NotificationDispatcher {
    pub(crate) fn new() -> Self {
        Self {
            latest: watch::channel(None).0,
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn cell(&self, shutdown: watch::Receiver<bool>) -> NotificationCell {
        NotificationCell {
            latest: self.latest.subscribe(),
            shutdown,
        }
    }

    /// Publishes a notification unless it repeats the previous one.
    /// Returns whether it was delivered.
    pub(crate) fn deliver(&self, notification: Notification) -> bool {
        let fresh = self.latest.send_if_modified(|slot| {
            if slot.as_ref() == Some(&notification) {
                false
            } else {
                *slot = Some(notification.clone());
                true
            }
        });
        if !fresh {
            return false;
        }

        // Handlers run without the lock so they may (un)subscribe.
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&notification.name)
            .map(|entries| entries.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        let mut closed_channel = false;
        for handler in handlers {
            match handler {
                Handler::Callback(callback) => callback(&notification),
                Handler::Channel(tx) => {
                    closed_channel |= tx.send(notification.clone()).is_err();
                }
            }
        }
        if closed_channel {
            self.prune(&notification.name);
        }
        true
    }

    fn prune(&self, name: &str) {
        let mut handlers =
            self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entries) = handlers.get_mut(name) {
            entries.retain(|(_, handler)| match handler {
                Handler::Channel(tx) => !tx.is_closed(),
                Handler::Callback(_) => true,
            });
            if entries.is_empty() {
                handlers.remove(name);
            }
        }
    }

    fn register(&self, name: &str, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    pub(crate) fn subscribe(
        &self,
        name: &str,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.register(name, Handler::Callback(Arc::new(callback)))
    }

    pub(crate) fn subscribe_channel(
        &self,
        name: &str,
    ) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(name, Handler::Channel(tx));
        rx
    }

    /// Returns `false` if the id was not registered.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers =
            self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let mut found = false;
        handlers.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(entry_id, _)| *entry_id != id);
            found |= entries.len() != before;
            !entries.is_empty()
        });
        found
    }

    #[cfg(test)]
    fn subscriber_count(&self, name: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(0, Vec::len)
    }
}

/// Reader side of the last-value cell.
///
/// Cheap to clone; each clone tracks which value it has already seen.
#[derive(Debug, Clone)]
pub struct NotificationCell {
    latest: watch::Receiver<Option<Notification>>,
    shutdown: watch::Receiver<bool>,
}

impl NotificationCell {
    /// The most recent notification, if any has arrived.
    pub fn latest(&self) -> Option<Notification> {
        self.latest.borrow().clone()
    }

    /// Waits for a notification this reader has not seen yet.
    ///
    /// Returns `None` once the connection is gone and nothing unseen is
    /// left.
    pub async fn next(&mut self) -> Option<Notification> {
        tokio::select! {
            biased;
            changed = self.latest.changed() => {
                changed.ok()?;
                self.latest.borrow_and_update().clone()
            }
            () = shut_down(&mut self.shutdown) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;

    fn note(name: &str, value: Value) -> Notification {
        Notification {
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn test_duplicate_is_dropped() {
        let dispatcher = NotificationDispatcher::new();
        assert!(dispatcher.deliver(note("A", json!({"x": 1}))));
        assert!(!dispatcher.deliver(note("A", json!({"x": 1}))));
        assert!(dispatcher.deliver(note("A", json!({"x": 2}))));
        assert!(dispatcher.deliver(note("B", json!({"x": 2}))));
    }

    #[test]
    fn test_callbacks_by_name() {
        let dispatcher = NotificationDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = dispatcher.subscribe("A", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.deliver(note("A", json!(1)));
        dispatcher.deliver(note("B", json!(1)));
        dispatcher.deliver(note("A", json!(2)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        dispatcher.deliver(note("A", json!(3)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.subscriber_count("A"), 0);
    }

    #[test]
    fn test_handler_may_subscribe_while_running() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let inner = Arc::clone(&dispatcher);
        dispatcher.subscribe("A", move |_| {
            inner.subscribe("B", |_| {});
        });
        dispatcher.deliver(note("A", json!(1)));
        assert_eq!(dispatcher.subscriber_count("B"), 1);
    }

    #[test]
    fn test_channel_subscription_and_pruning() {
        let dispatcher = NotificationDispatcher::new();
        let mut rx = dispatcher.subscribe_channel("A");
        dispatcher.deliver(note("A", json!(1)));
        assert_eq!(rx.try_recv().unwrap().value, json!(1));

        drop(rx);
        dispatcher.deliver(note("A", json!(2)));
        assert_eq!(dispatcher.subscriber_count("A"), 0);
    }

    #[tokio::test]
    async fn test_cell_sees_latest_value() {
        let dispatcher = NotificationDispatcher::new();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut cell = dispatcher.cell(shutdown_rx);
        assert_eq!(cell.latest(), None);

        dispatcher.deliver(note("A", json!(1)));
        dispatcher.deliver(note("B", json!(2)));
        // Only the newest survives for a slow reader.
        assert_eq!(cell.next().await.unwrap().name, "B");
        assert_eq!(cell.latest().unwrap().value, json!(2));
    }

    #[tokio::test]
    async fn test_cell_ends_on_shutdown() {
        let dispatcher = NotificationDispatcher::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut cell = dispatcher.cell(shutdown_rx);
        shutdown_tx.send_replace(true);
        assert_eq!(cell.next().await, None);
    }
}
