//! Live connections subscribed to endpoint results.
//!
//! Each target keeps its subscribers in subscription order. A connection
//! appears at most once per target; a repeated `sub` is a no-op.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use tracing::debug;

use crate::observability::metrics::Metrics;

pub type SocketId = u64;

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// Handle of one live connection. Messages sent here are written to the
/// socket by the connection's writer task.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SocketId,
    tx: UnboundedSender<String>,
}

impl Subscriber {
    pub fn new(tx: UnboundedSender<String>) -> Self {
        Self {
            id: NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    /// `false` once the connection's writer is gone.
    pub fn send(&self, message: String) -> bool {
        self.tx.send(message).is_ok()
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscriber {}

/// Inbound socket message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Sub { target: String },
    Unsub { target: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    Subscribed,
    AlreadySubscribed,
    UnknownTarget,
    Unsubscribed,
    NotSubscribed,
}

pub struct SubscriptionRegistry {
    targets: HashSet<String>,
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    metrics: Option<Arc<Metrics>>,
}

impl SubscriptionRegistry {
    /// Registry accepting subscriptions to `targets` only.
    pub fn new<I, S>(targets: I, metrics: Option<Arc<Metrics>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            subscribers: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    pub fn is_target(&self, target: &str) -> bool {
        self.targets.contains(target)
    }

    pub async fn subscribe(&self, target: &str, subscriber: &Subscriber) -> SubscriptionChange {
        if !self.is_target(target) {
            debug!(socket = subscriber.id(), endpoint = %target, "subscription to unknown target rejected");
            return SubscriptionChange::UnknownTarget;
        }

        let mut subscribers = self.subscribers.write().await;
        let list = subscribers.entry(target.to_owned()).or_default();
        if list.contains(subscriber) {
            return SubscriptionChange::AlreadySubscribed;
        }
        list.push(subscriber.clone());
        self.gauge(target, list.len());
        debug!(socket = subscriber.id(), endpoint = %target, "subscribed");
        SubscriptionChange::Subscribed
    }

    pub async fn unsubscribe(&self, target: &str, id: SocketId) -> SubscriptionChange {
        let mut subscribers = self.subscribers.write().await;
        let Some(list) = subscribers.get_mut(target) else {
            return SubscriptionChange::NotSubscribed;
        };
        let before = list.len();
        list.retain(|s| s.id() != id);
        if list.len() == before {
            return SubscriptionChange::NotSubscribed;
        }

        let remaining = list.len();
        if remaining == 0 {
            subscribers.remove(target);
        }
        self.gauge(target, remaining);
        debug!(socket = id, endpoint = %target, "unsubscribed");
        SubscriptionChange::Unsubscribed
    }

    /// Drop `id` from every target, returns how many lists it was removed from.
    pub async fn clear_socket(&self, id: SocketId) -> usize {
        let mut subscribers = self.subscribers.write().await;
        let mut removed = 0;
        for (target, list) in subscribers.iter_mut() {
            let before = list.len();
            list.retain(|s| s.id() != id);
            if list.len() != before {
                removed += 1;
                self.gauge(target, list.len());
            }
        }
        subscribers.retain(|_, list| !list.is_empty());
        debug!(socket = id, removed, "socket cleared");
        removed
    }

    /// Apply one raw inbound message. Malformed input is logged and ignored.
    pub async fn handle_message(&self, raw: &str, subscriber: &Subscriber) -> Option<SubscriptionChange> {
        match serde_json::from_str::<ClientMessage>(raw) {
            Ok(ClientMessage::Sub { target }) => Some(self.subscribe(&target, subscriber).await),
            Ok(ClientMessage::Unsub { target }) => Some(self.unsubscribe(&target, subscriber.id()).await),
            Err(err) => {
                debug!(socket = subscriber.id(), error = %err, "malformed socket message");
                None
            }
        }
    }

    /// Subscriber ids of `target` in subscription order.
    pub async fn subscribers(&self, target: &str) -> Vec<SocketId> {
        self.subscribers
            .read()
            .await
            .get(target)
            .map(|list| list.iter().map(Subscriber::id).collect())
            .unwrap_or_default()
    }

    pub async fn counts(&self) -> BTreeMap<String, usize> {
        self.subscribers
            .read()
            .await
            .iter()
            .map(|(target, list)| (target.clone(), list.len()))
            .collect()
    }

    /// Push `message` to every subscriber of `target` in order, returns the
    /// number of live connections that took it.
    pub async fn publish(&self, target: &str, message: &str) -> usize {
        let subscribers = self.subscribers.read().await;
        let Some(list) = subscribers.get(target) else {
            return 0;
        };
        list.iter()
            .filter(|subscriber| subscriber.send(message.to_owned()))
            .count()
    }

    fn gauge(&self, target: &str, count: usize) {
        if let Some(metrics) = &self.metrics {
            metrics
                .subscribers
                .with_label_values(&[target])
                .set(count as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn registry() -> SubscriptionRegistry {
        SubscriptionRegistry::new(["clock", "weather"], None)
    }

    fn socket() -> (Subscriber, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Subscriber::new(tx), rx)
    }

    #[tokio::test]
    async fn subscribe_is_deduplicated() {
        let registry = registry();
        let (a, _rx) = socket();

        assert_eq!(registry.subscribe("clock", &a).await, SubscriptionChange::Subscribed);
        assert_eq!(registry.subscribe("clock", &a).await, SubscriptionChange::AlreadySubscribed);
        assert_eq!(registry.subscribers("clock").await, vec![a.id()]);
    }

    #[tokio::test]
    async fn unknown_targets_are_rejected() {
        let registry = registry();
        let (a, _rx) = socket();
        assert_eq!(registry.subscribe("nope", &a).await, SubscriptionChange::UnknownTarget);
        assert!(registry.counts().await.is_empty());
    }

    #[tokio::test]
    async fn unsubscribing_a_stranger_is_a_noop() {
        let registry = registry();
        let (a, _rx_a) = socket();
        let (b, _rx_b) = socket();
        registry.subscribe("clock", &a).await;

        assert_eq!(registry.unsubscribe("clock", b.id()).await, SubscriptionChange::NotSubscribed);
        assert_eq!(registry.unsubscribe("weather", a.id()).await, SubscriptionChange::NotSubscribed);
        assert_eq!(registry.subscribers("clock").await, vec![a.id()]);
    }

    #[tokio::test]
    async fn clear_socket_removes_every_subscription() {
        let registry = registry();
        let (a, _rx_a) = socket();
        let (b, _rx_b) = socket();
        registry.subscribe("clock", &a).await;
        registry.subscribe("weather", &a).await;
        registry.subscribe("clock", &b).await;

        assert_eq!(registry.clear_socket(a.id()).await, 2);
        assert_eq!(registry.subscribers("clock").await, vec![b.id()]);
        assert_eq!(registry.counts().await.get("weather"), None);
    }

    #[tokio::test]
    async fn publish_goes_out_in_subscription_order() {
        let registry = registry();
        let (a, mut rx_a) = socket();
        let (b, mut rx_b) = socket();
        registry.subscribe("clock", &b).await;
        registry.subscribe("clock", &a).await;

        assert_eq!(registry.subscribers("clock").await, vec![b.id(), a.id()]);
        assert_eq!(registry.publish("clock", "tick").await, 2);
        assert_eq!(rx_a.recv().await.as_deref(), Some("tick"));
        assert_eq!(rx_b.recv().await.as_deref(), Some("tick"));
        assert_eq!(registry.publish("weather", "rain").await, 0);
    }

    #[tokio::test]
    async fn messages_drive_the_registry() {
        let registry = registry();
        let (a, _rx) = socket();

        let change = registry.handle_message(r#"{"type":"sub","target":"clock"}"#, &a).await;
        assert_eq!(change, Some(SubscriptionChange::Subscribed));
        let change = registry.handle_message(r#"{"type":"unsub","target":"clock"}"#, &a).await;
        assert_eq!(change, Some(SubscriptionChange::Unsubscribed));

        // malformed input never reaches the registry
        assert_eq!(registry.handle_message("not json", &a).await, None);
        assert_eq!(registry.handle_message(r#"{"type":"ping"}"#, &a).await, None);
        assert_eq!(registry.handle_message(r#"{"type":"sub"}"#, &a).await, None);
        assert!(registry.counts().await.is_empty());
    }
}
