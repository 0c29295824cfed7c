//! Typed pub/sub for values shared between views, keyed by storage key.
//!
//! Every key has its own broadcast channel. A [`Subscription`] is tied to the
//! lifetime of whatever holds it: dropping it unsubscribes. The bus keeps the
//! last written value per key, so late subscribers can read current state.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

const DEFAULT_CAPACITY: usize = 16;

/// A change notification for one key. `value == None` means the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent<V> {
    pub key: String,
    pub value: Option<V>,
}

struct BusInner<V> {
    channels: HashMap<String, broadcast::Sender<StorageEvent<V>>>,
    values: HashMap<String, V>,
}

pub struct StorageBus<V> {
    capacity: usize,
    inner: Mutex<BusInner<V>>,
}

impl<V: Clone + Send + 'static> Default for StorageBus<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + 'static> StorageBus<V> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds how many unread events a slow subscriber may lag behind.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(BusInner {
                channels: HashMap::new(),
                values: HashMap::new(),
            }),
        }
    }

    /// Subscribe to changes of `key`.
    pub fn subscribe(&self, key: &str) -> Subscription<V> {
        let capacity = self.capacity;
        let receiver = self.with_inner(|inner| {
            inner
                .channels
                .entry(key.to_string())
                .or_insert_with(|| broadcast::channel(capacity).0)
                .subscribe()
        });
        Subscription {
            key: key.to_string(),
            receiver,
        }
    }

    /// Store `value` under `key` and notify every live subscriber. Returns how
    /// many subscribers were notified.
    pub fn set(&self, key: &str, value: V) -> usize {
        self.publish(key, Some(value))
    }

    /// Remove `key` and notify subscribers with an empty value.
    pub fn remove(&self, key: &str) -> usize {
        self.publish(key, None)
    }

    /// Last value written under `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        self.with_inner(|inner| inner.values.get(key).cloned())
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.with_inner(|inner| {
            inner
                .channels
                .get(key)
                .map_or(0, broadcast::Sender::receiver_count)
        })
    }

    fn publish(&self, key: &str, value: Option<V>) -> usize {
        self.with_inner(|inner| {
            match &value {
                Some(v) => {
                    inner.values.insert(key.to_string(), v.clone());
                }
                None => {
                    inner.values.remove(key);
                }
            }

            let Some(sender) = inner.channels.get(key) else {
                return 0;
            };
            let event = StorageEvent {
                key: key.to_string(),
                value,
            };
            match sender.send(event) {
                Ok(delivered) => delivered,
                Err(_) => {
                    // every subscriber is gone
                    inner.channels.remove(key);
                    0
                }
            }
        })
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut BusInner<V>) -> R) -> R {
        match self.inner.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

/// Live subscription to one key. Dropping it unsubscribes.
pub struct Subscription<V> {
    key: String,
    receiver: broadcast::Receiver<StorageEvent<V>>,
}

impl<V: Clone> Subscription<V> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next change. Returns `None` once the bus is dropped.
    ///
    /// A subscriber that fell behind skips straight to the newer events.
    pub async fn recv(&mut self) -> Option<StorageEvent<V>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(key = %self.key, skipped, "storage subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next pending change without waiting.
    pub fn try_recv(&mut self) -> Option<StorageEvent<V>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Explicit unsubscribe, equivalent to dropping.
    pub fn unsubscribe(self) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_only_see_their_key() {
        let bus = StorageBus::<String>::new();
        let mut theme = bus.subscribe("theme");
        let mut token = bus.subscribe("token");

        assert_eq!(bus.set("theme", "dark".into()), 1);
        assert_eq!(
            theme.try_recv(),
            Some(StorageEvent {
                key: "theme".into(),
                value: Some("dark".into())
            })
        );
        assert_eq!(token.try_recv(), None);
    }

    #[test]
    fn last_write_wins() {
        let bus = StorageBus::<u32>::new();
        bus.set("k", 1);
        bus.set("k", 2);
        assert_eq!(bus.get("k"), Some(2));
        bus.remove("k");
        assert_eq!(bus.get("k"), None);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = StorageBus::<u32>::new();
        let first = bus.subscribe("k");
        let second = bus.subscribe("k");
        assert_eq!(bus.subscriber_count("k"), 2);

        drop(first);
        assert_eq!(bus.subscriber_count("k"), 1);
        second.unsubscribe();
        assert_eq!(bus.subscriber_count("k"), 0);
        assert_eq!(bus.set("k", 7), 0);
        assert_eq!(bus.get("k"), Some(7));
    }

    #[test]
    fn lagging_subscriber_skips_to_newer_events() {
        let bus = StorageBus::<u32>::with_capacity(2);
        let mut sub = bus.subscribe("k");
        for value in 0..5 {
            bus.set("k", value);
        }
        let seen: Vec<u32> = std::iter::from_fn(|| sub.try_recv())
            .filter_map(|event| event.value)
            .collect();
        assert_eq!(seen, vec![3, 4]);
    }

    #[tokio::test]
    async fn recv_waits_for_publish() {
        let bus = std::sync::Arc::new(StorageBus::<String>::new());
        let mut sub = bus.subscribe("project");
        let writer = std::sync::Arc::clone(&bus);
        tokio::spawn(async move {
            writer.set("project", "main".into());
        });
        let event = sub.recv().await.unwrap();
        assert_eq!(event.value.as_deref(), Some("main"));
    }
}
