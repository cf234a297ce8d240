//! In-process topic fan-out between the message gateway and connected push
//! listeners.

use std::{
    collections::HashMap,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};

use futures_util::Stream;
use serde::Serialize;
use shared::models::{ChatKey, MessageEvent};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifies one subscription for precise cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A published payload as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    /// JSON-encoded payload.
    pub payload: Arc<str>,
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriberId,
    sender: UnboundedSender<BusMessage>,
}

#[derive(Debug, Default)]
struct Registry {
    attached: bool,
    closed: bool,
    topics: HashMap<String, Vec<Subscriber>>,
}

/// Process-wide publish/subscribe keyed by topic.
///
/// Built once by the composition root and cloned into the gateway and the
/// push handlers. Publishing never blocks: each subscriber owns an unbounded
/// queue, and subscribers whose receiving side is gone are pruned on the next
/// publish to their topic.
#[derive(Debug, Clone, Default)]
pub struct BroadcastBus {
    inner: Arc<Mutex<Registry>>,
}

impl BroadcastBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the push transport as attached. Returns `true` only for the call
    /// that performed the attachment; later calls are no-ops.
    pub fn attach(&self) -> bool {
        let mut registry = self.registry();
        if registry.attached || registry.closed {
            return false;
        }
        registry.attached = true;
        debug!("broadcast bus attached");
        true
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.registry().attached
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.registry().closed
    }

    /// Registers one subscriber on every topic in `topics`. Messages from all
    /// of them arrive on the returned subscription in publish order per topic.
    /// After shutdown the subscription is already closed.
    pub fn subscribe<I, T>(&self, topics: I) -> Subscription
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let (sender, receiver) = unbounded_channel();
        let id = SubscriberId::new();
        let topics: Vec<String> = topics.into_iter().map(Into::into).collect();

        let mut registry = self.registry();
        if !registry.closed {
            for topic in &topics {
                registry
                    .topics
                    .entry(topic.clone())
                    .or_default()
                    .push(Subscriber {
                        id,
                        sender: sender.clone(),
                    });
            }
            debug!(subscriber = ?id, topics = ?topics, "subscriber added");
        }
        drop(registry);

        Subscription {
            id,
            bus: self.clone(),
            receiver,
        }
    }

    /// Subscribes to both topics of a chat.
    pub fn subscribe_chat(&self, chat: &ChatKey) -> Subscription {
        self.subscribe([chat.creation_topic(), chat.update_topic()])
    }

    /// Removes a subscriber from every topic. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut registry = self.registry();
        registry.topics.retain(|_, subscribers| {
            subscribers.retain(|subscriber| subscriber.id != id);
            !subscribers.is_empty()
        });
    }

    /// Delivers an already encoded payload to the topic's subscribers and
    /// returns how many received it. Publishing to a topic without
    /// subscribers is a silent no-op.
    pub fn publish_raw(&self, topic: &str, payload: Arc<str>) -> usize {
        let mut registry = self.registry();
        let Some(subscribers) = registry.topics.get_mut(topic) else {
            return 0;
        };

        let message = BusMessage {
            topic: topic.to_string(),
            payload,
        };
        subscribers.retain(|subscriber| subscriber.sender.send(message.clone()).is_ok());
        let delivered = subscribers.len();

        if delivered == 0 {
            registry.topics.remove(topic);
        }
        delivered
    }

    /// Encodes `payload` as JSON and publishes it on `topic`.
    pub fn publish<T: Serialize>(&self, topic: &str, payload: &T) -> usize {
        match serde_json::to_string(payload) {
            Ok(json) => self.publish_raw(topic, Arc::from(json)),
            Err(err) => {
                warn!(topic, error = %err, "failed to encode broadcast payload");
                0
            }
        }
    }

    /// Publishes a message event on the matching topic of `chat`.
    pub fn publish_event(&self, chat: &ChatKey, event: &MessageEvent) -> usize {
        let topic = event.topic(chat);
        let delivered = self.publish(&topic, event.message());
        debug!(topic = %topic, action = event.action(), delivered, "message event published");
        delivered
    }

    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.registry().topics.get(topic).map_or(0, Vec::len)
    }

    /// Drops every subscriber, ending their streams, and refuses new ones.
    pub fn shutdown(&self) {
        let mut registry = self.registry();
        registry.closed = true;
        let topics = registry.topics.len();
        registry.topics.clear();
        debug!(topics, "broadcast bus shut down");
    }
}

/// Receiving side of a bus subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    bus: BroadcastBus,
    receiver: UnboundedReceiver<BusMessage>,
}

impl Subscription {
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next message, or `None` once the bus has shut down.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Stream for Subscription {
    type Item = BusMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{MemberRole, MemberView, MessageView, ProfileView, Timestamp};

    fn message() -> MessageView {
        let now = Timestamp::now();
        MessageView {
            id: Uuid::now_v7(),
            content: "hello".into(),
            file_url: None,
            member: MemberView {
                id: Uuid::new_v4(),
                role: MemberRole::Guest,
                profile: ProfileView {
                    id: Uuid::new_v4(),
                    name: "Ada".into(),
                    image_url: None,
                },
            },
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn attach_is_idempotent() {
        let bus = BroadcastBus::new();
        assert!(bus.attach());
        assert!(!bus.attach());
        assert!(bus.clone().is_attached());
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let bus = BroadcastBus::new();
        let mut sub = bus.subscribe(["chat:a:messages"]);

        for i in 0..3 {
            bus.publish("chat:a:messages", &i);
        }

        for expected in ["0", "1", "2"] {
            assert_eq!(&*sub.recv().await.unwrap().payload, expected);
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let bus = BroadcastBus::new();
        assert_eq!(bus.publish("chat:none:messages", &"x"), 0);
    }

    #[tokio::test]
    async fn chat_subscription_receives_both_topics() {
        let bus = BroadcastBus::new();
        let chat = ChatKey::new(Uuid::new_v4());
        let mut sub = bus.subscribe_chat(&chat);

        let created = MessageEvent::Created(message());
        let mut deleted = message();
        deleted.deleted = true;
        let deleted = MessageEvent::changed(deleted);

        assert_eq!(bus.publish_event(&chat, &created), 1);
        assert_eq!(bus.publish_event(&chat, &deleted), 1);

        let first = sub.recv().await.unwrap();
        assert_eq!(first.topic, chat.creation_topic());
        let second = sub.recv().await.unwrap();
        assert_eq!(second.topic, chat.update_topic());
        let decoded: MessageView = serde_json::from_str(&second.payload).unwrap();
        assert!(decoded.deleted);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = BroadcastBus::new();
        let sub = bus.subscribe(["t"]);
        let other = bus.subscribe(["t"]);
        assert_eq!(bus.subscriber_count("t"), 2);

        let id = sub.id();
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count("t"), 1);

        bus.unsubscribe(id);
        assert_eq!(bus.subscriber_count("t"), 1);

        drop(other);
        assert_eq!(bus.subscriber_count("t"), 0);
    }

    #[tokio::test]
    async fn shutdown_closes_subscriptions() {
        let bus = BroadcastBus::new();
        let mut sub = bus.subscribe(["t"]);

        bus.shutdown();
        assert!(sub.recv().await.is_none());
        assert!(!bus.attach());

        let mut late = bus.subscribe(["t"]);
        assert!(late.recv().await.is_none());
        assert_eq!(bus.subscriber_count("t"), 0);
    }
}
