use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broker::subscription::{Deregister, Subscription, delivery_worker};
use crate::config::BrokerSettings;

/// Represents the broker that manages topics, subscriptions and message delivery.
///
/// Callers register a handler for a topic with [`Broker::subscribe`] and hand
/// messages to the broker with [`Broker::publish`]; the broker routes each
/// published message to every subscription currently registered under that
/// topic. Delivery happens on a dedicated worker task per subscription, so a
/// slow handler delays only its own publishers, never other subscribers.
///
/// The broker is cheap to clone; clones share the same topic registry. It is
/// safe to subscribe, publish and unsubscribe concurrently from any number of
/// tasks.
pub struct Broker<M> {
    shared: Arc<Shared<M>>,
}

impl<M> Clone for Broker<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// One registered subscriber as seen from the publish path: the sending half
/// of its mailbox plus the signal that marks it terminated.
pub(crate) struct TopicEntry<M> {
    sender: mpsc::Sender<M>,
    token: CancellationToken,
}

impl<M> Clone for TopicEntry<M> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            token: self.token.clone(),
        }
    }
}

/// State shared between all clones of a broker and, weakly, by the
/// subscription handles it gives out.
///
/// `registry` is the only shared mutable structure in the crate; every read
/// and write of it happens under its lock, and the lock is never held across
/// an await point.
pub(crate) struct Shared<M> {
    registry: Mutex<HashMap<String, HashMap<u64, TopicEntry<M>>>>,
    next_id: AtomicU64,
    mailbox_capacity: usize,
    delivery_timeout: Option<Duration>,
}

impl<M> Default for Broker<M>
where
    M: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Broker<M>
where
    M: Clone + Send + 'static,
{
    /// Creates a new broker with default settings: a single-slot mailbox per
    /// subscription and no delivery timeout.
    pub fn new() -> Self {
        Self::with_settings(BrokerSettings::default())
    }

    /// Creates a new broker configured from [`BrokerSettings`].
    ///
    /// The mailbox capacity is clamped to at least one slot. When a delivery
    /// timeout is set, a publish gives up on a subscriber whose mailbox does
    /// not accept the message within the limit instead of waiting forever.
    pub fn with_settings(settings: BrokerSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                mailbox_capacity: settings.mailbox_capacity.max(1),
                delivery_timeout: settings.delivery_timeout_ms.map(Duration::from_millis),
            }),
        }
    }

    /// Subscribes a handler to a topic. Automatically creates the topic if it
    /// doesn't exist.
    ///
    /// The handler is called once per message published to the topic, serially
    /// on a dedicated worker task spawned onto the current Tokio runtime.
    /// Returns a [`Subscription`] handle used to cancel the registration; the
    /// handle may be returned before the worker has been scheduled, so callers
    /// must not assume delivery has started the instant this returns.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> Subscription
    where
        F: FnMut(M) + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, mailbox) = mpsc::channel(self.shared.mailbox_capacity);
        let token = CancellationToken::new();

        {
            let mut registry = self.shared.registry.lock().unwrap();
            registry.entry(topic.to_string()).or_default().insert(
                id,
                TopicEntry {
                    sender,
                    token: token.clone(),
                },
            );
        }

        tokio::spawn(delivery_worker(mailbox, token.clone(), handler));
        tracing::debug!(topic, id, "subscribed");

        let owner = Arc::downgrade(&self.shared) as Weak<dyn Deregister>;
        Subscription::new(topic.to_string(), id, owner, token)
    }

    /// Publishes a message to all subscribers of a topic.
    ///
    /// If the topic has no subscribers this is a no-op. Otherwise the message
    /// is cloned and handed to the mailbox of every subscription registered at
    /// the moment the call starts; subscriptions created or cancelled during
    /// the call may or may not receive it. For each subscriber the handoff
    /// waits until its mailbox accepts the message or the subscription is
    /// observed terminated, whichever comes first. Handoffs to different
    /// subscribers proceed concurrently, so one stalled handler cannot starve
    /// the others.
    ///
    /// Never reports failure: a terminated or vanished subscriber is skipped
    /// silently.
    pub async fn publish(&self, topic: &str, msg: M) {
        let snapshot: Vec<TopicEntry<M>> = {
            let registry = self.shared.registry.lock().unwrap();
            match registry.get(topic) {
                Some(entries) => entries.values().cloned().collect(),
                None => {
                    tracing::trace!(topic, "publish on topic with no subscribers");
                    return;
                }
            }
        };

        let deliveries = snapshot.into_iter().map(|entry| {
            let msg = msg.clone();
            async move {
                let handoff = async {
                    tokio::select! {
                        _ = entry.token.cancelled() => {}
                        res = entry.sender.send(msg) => {
                            // Err means the worker is gone; skip, same as terminated.
                            let _ = res;
                        }
                    }
                };
                match self.shared.delivery_timeout {
                    Some(limit) => {
                        if tokio::time::timeout(limit, handoff).await.is_err() {
                            tracing::debug!(topic, "delivery timed out, message dropped");
                        }
                    }
                    None => handoff.await,
                }
            }
        });
        join_all(deliveries).await;
    }

    /// Returns how many subscriptions are currently registered on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.shared
            .registry
            .lock()
            .unwrap()
            .get(topic)
            .map_or(0, HashMap::len)
    }
}

impl<M> Deregister for Shared<M>
where
    M: Send + 'static,
{
    fn deregister(&self, topic: &str, id: u64) {
        let mut registry = self.registry.lock().unwrap();
        if let Some(entries) = registry.get_mut(topic) {
            entries.remove(&id);
            if entries.is_empty() {
                registry.remove(topic);
            }
        }
    }
}

impl<M> Drop for Shared<M> {
    fn drop(&mut self) {
        // Last broker clone gone: stop every delivery worker.
        if let Ok(registry) = self.registry.get_mut() {
            for entries in registry.values() {
                for entry in entries.values() {
                    entry.token.cancel();
                }
            }
        }
    }
}
