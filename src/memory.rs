//! In-process broker implementing every transport contract.
//!
//! [`InMemoryBroker`] is the reference transport for tests and the demo
//! binary. Queues and temporary destinations are mailboxes that buffer
//! messages until received; named topics fan each message out to every live
//! subscription. Temporary destinations must be created through
//! [`DestinationAllocator`] and reject any use after deletion.
//!
//! Messages travel as [`WireMessage`], mapped to and from [`Message`] by
//! [`WireConverter`].

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::{sync::mpsc, time::Instant};
use tracing::debug;

use crate::{
    destination::{Destination, DestinationKind},
    message::{CORRELATION_ID, MESSAGE_ID, Message, REPLY_TO, ReplyTo},
    queue::PendingQueue,
    selector::{Selector, SelectorSource},
    timeout::Timeout,
    transport::{
        ConvertError,
        DestinationAllocator,
        DestinationResolver,
        Subscriber,
        Subscription,
        Transport,
        TransportError,
    },
};

/// Transport-native form of a message inside [`InMemoryBroker`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WireMessage {
    pub message_id: String,
    pub correlation_id: Option<String>,
    pub reply_to: Option<Destination>,
    pub properties: BTreeMap<String, String>,
    pub body: Bytes,
}

impl SelectorSource for WireMessage {
    fn selector_value(&self, key: &str) -> Option<&str> {
        match key {
            MESSAGE_ID => Some(&self.message_id),
            CORRELATION_ID => self.correlation_id.as_deref(),
            REPLY_TO => self
                .reply_to
                .as_ref()
                .map(Destination::name)
                .or_else(|| self.properties.get(REPLY_TO).map(String::as_str)),
            other => self.properties.get(other).map(String::as_str),
        }
    }
}

/// Maps [`Message`] to and from [`WireMessage`].
///
/// A reply-to given by name travels as the `reply_to` property and comes back
/// as [`ReplyTo::Name`].
#[derive(Clone, Copy, Debug, Default)]
pub struct WireConverter;

impl crate::transport::MessageConverter<WireMessage> for WireConverter {
    fn to_raw(&self, message: &Message) -> Result<WireMessage, ConvertError> {
        let mut properties = message.headers().clone();
        let correlation_id = properties.remove(CORRELATION_ID);
        let reply_to = match message.get_reply_to() {
            Some(ReplyTo::Destination(destination)) => Some(destination.clone()),
            Some(ReplyTo::Name(name)) => {
                properties.insert(REPLY_TO.to_owned(), name.clone());
                None
            }
            None => None,
        };
        Ok(WireMessage {
            message_id: message.id().to_owned(),
            correlation_id,
            reply_to,
            properties,
            body: message.payload().clone(),
        })
    }

    fn from_raw(&self, raw: WireMessage) -> Result<Message, ConvertError> {
        let WireMessage {
            message_id,
            correlation_id,
            reply_to,
            mut properties,
            body,
        } = raw;
        if message_id.is_empty() {
            return Err(ConvertError("wire message has no message id".to_owned()));
        }
        let named_reply_to = properties.remove(REPLY_TO);
        let mut message = Message::with_id(message_id, body);
        for (name, value) in properties {
            message.set_header(name, value);
        }
        if let Some(id) = correlation_id {
            message.set_correlation_id(id);
        }
        message.set_reply_to(
            reply_to
                .map(ReplyTo::Destination)
                .or(named_reply_to.map(ReplyTo::Name)),
        );
        Ok(message)
    }
}

type Mailbox = Arc<PendingQueue<WireMessage>>;

#[derive(Default)]
struct BrokerState {
    mailboxes: DashMap<Destination, Mailbox>,
    subscriptions: DashMap<String, Vec<mpsc::UnboundedSender<WireMessage>>>,
    next_temporary: AtomicU64,
}

/// Cloneable handle to one in-process broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Messages waiting on `destination`.
    #[must_use]
    pub fn depth(&self, destination: &Destination) -> usize {
        self.state
            .mailboxes
            .get(destination)
            .map_or(0, |mailbox| mailbox.len())
    }

    /// Live subscriptions on the topic named `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state.subscriptions.get(topic).map_or(0, |subs| {
            subs.iter().filter(|tx| !tx.is_closed()).count()
        })
    }

    /// Whether a temporary destination is still allocated.
    #[must_use]
    pub fn is_allocated(&self, destination: &Destination) -> bool {
        destination.is_temporary() && self.state.mailboxes.contains_key(destination)
    }

    /// Drop every subscription; pending pulls fail with
    /// [`TransportError::Disconnected`].
    pub fn disconnect_subscribers(&self) { self.state.subscriptions.clear(); }

    fn mailbox(&self, destination: &Destination) -> Result<Mailbox, TransportError> {
        if destination.is_temporary() {
            return self
                .state
                .mailboxes
                .get(destination)
                .map(|mailbox| Arc::clone(&mailbox))
                .ok_or_else(|| TransportError::UnknownDestination(destination.to_string()));
        }
        Ok(Arc::clone(
            &self.state.mailboxes.entry(destination.clone()).or_default(),
        ))
    }

    fn publish(&self, topic: &Destination, message: WireMessage) {
        let Some(mut senders) = self.state.subscriptions.get_mut(topic.name()) else {
            debug!(%topic, "no subscriptions; message dropped");
            return;
        };
        senders.retain(|tx| tx.send(message.clone()).is_ok());
        debug!(%topic, subscribers = senders.len(), "published message");
    }
}

#[async_trait]
impl Transport for InMemoryBroker {
    type Raw = WireMessage;

    async fn send(&self, destination: &Destination, message: WireMessage) -> Result<(), TransportError> {
        if destination.kind() == DestinationKind::Topic && !destination.is_temporary() {
            self.publish(destination, message);
            return Ok(());
        }
        self.mailbox(destination)?.push(message);
        Ok(())
    }

    async fn receive(
        &self,
        destination: &Destination,
        selector: Option<&Selector>,
        timeout: Timeout,
    ) -> Result<Option<WireMessage>, TransportError> {
        if destination.kind() == DestinationKind::Topic && !destination.is_temporary() {
            return Err(TransportError::Broker(format!(
                "receiving from {destination} requires a subscription"
            )));
        }
        let mailbox = self.mailbox(destination)?;
        Ok(mailbox
            .take_within(selector, timeout.deadline_from(Instant::now()))
            .await)
    }
}

#[async_trait]
impl DestinationResolver for InMemoryBroker {
    async fn resolve(&self, name: &str, kind: DestinationKind) -> Result<Destination, TransportError> {
        if name.trim().is_empty() {
            return Err(TransportError::UnknownDestination(name.to_owned()));
        }
        Ok(match kind {
            DestinationKind::Queue => Destination::queue(name),
            DestinationKind::Topic => Destination::topic(name),
        })
    }
}

#[async_trait]
impl DestinationAllocator for InMemoryBroker {
    async fn create_temporary(&self, kind: DestinationKind) -> Result<Destination, TransportError> {
        let n = self.state.next_temporary.fetch_add(1, Ordering::Relaxed);
        let prefix = match kind {
            DestinationKind::Queue => "tmp-queue",
            DestinationKind::Topic => "tmp-topic",
        };
        let destination = Destination::temporary(format!("{prefix}-{n}"), kind);
        self.state
            .mailboxes
            .insert(destination.clone(), Mailbox::default());
        debug!(%destination, "created temporary destination");
        Ok(destination)
    }

    async fn delete_temporary(&self, destination: &Destination) -> Result<(), TransportError> {
        if !destination.is_temporary() {
            return Err(TransportError::Broker(format!(
                "{destination} is not a temporary destination"
            )));
        }
        self.state
            .mailboxes
            .remove(destination)
            .map(|_| ())
            .ok_or_else(|| TransportError::UnknownDestination(destination.to_string()))
    }
}

/// Subscription handed out by [`InMemoryBroker`]; pulls block until the next
/// published message.
pub struct MemorySubscription {
    topic: String,
    inbox: mpsc::UnboundedReceiver<WireMessage>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    type Raw = WireMessage;

    async fn pull(&mut self) -> Result<Option<WireMessage>, TransportError> {
        self.inbox
            .recv()
            .await
            .map(Some)
            .ok_or(TransportError::Disconnected)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        debug!(topic = %self.topic, "closing subscription");
        self.inbox.close();
        Ok(())
    }
}

#[async_trait]
impl Subscriber for InMemoryBroker {
    type Subscription = MemorySubscription;

    async fn subscribe(
        &self,
        topic: &Destination,
        durable_name: Option<&str>,
    ) -> Result<MemorySubscription, TransportError> {
        if topic.kind() != DestinationKind::Topic {
            return Err(TransportError::Broker(format!("{topic} is not a topic")));
        }
        let (tx, inbox) = mpsc::unbounded_channel();
        self.state
            .subscriptions
            .entry(topic.name().to_owned())
            .or_default()
            .push(tx);
        debug!(%topic, ?durable_name, "subscribed");
        Ok(MemorySubscription {
            topic: topic.name().to_owned(),
            inbox,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::MessageConverter;

    #[test]
    fn converter_keeps_reply_metadata() {
        let reply_to = Destination::temporary("tmp-queue-0", DestinationKind::Queue);
        let mut message = Message::with_id("m-1", "hello")
            .header("operation", "greet")
            .reply_to(ReplyTo::Destination(reply_to.clone()));
        message.set_correlation_id("req-7");

        let raw = WireConverter.to_raw(&message).expect("convertible");
        assert_eq!(raw.correlation_id.as_deref(), Some("req-7"));
        assert_eq!(raw.reply_to.as_ref(), Some(&reply_to));
        assert!(!raw.properties.contains_key(CORRELATION_ID));

        assert_eq!(WireConverter.from_raw(raw).expect("convertible"), message);
    }

    #[test]
    fn named_reply_to_travels_as_property() {
        let message = Message::with_id("m-2", "").reply_to(ReplyTo::Name("replies".into()));
        let raw = WireConverter.to_raw(&message).expect("convertible");
        assert_eq!(raw.properties.get(REPLY_TO).map(String::as_str), Some("replies"));
        let back = WireConverter.from_raw(raw).expect("convertible");
        assert_eq!(back.get_reply_to(), Some(&ReplyTo::Name("replies".into())));
    }

    #[test]
    fn wire_message_without_id_is_rejected() {
        assert!(WireConverter.from_raw(WireMessage::default()).is_err());
    }

    #[tokio::test]
    async fn queue_receive_honours_selector() {
        let broker = InMemoryBroker::new();
        let queue = Destination::queue("replies");
        for (id, corr) in [("r1", "a"), ("r2", "b")] {
            let raw = WireMessage {
                message_id: id.into(),
                correlation_id: Some(corr.into()),
                ..WireMessage::default()
            };
            broker.send(&queue, raw).await.expect("send");
        }
        let selector = Selector::eq(CORRELATION_ID, "b");
        let got = broker
            .receive(&queue, Some(&selector), Timeout::Immediate)
            .await
            .expect("receive");
        assert_eq!(got.map(|m| m.message_id).as_deref(), Some("r2"));
        assert_eq!(broker.depth(&queue), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_receive_returns_none_after_timeout() {
        let broker = InMemoryBroker::new();
        let got = broker
            .receive(
                &Destination::queue("q"),
                None,
                Timeout::After(Duration::from_millis(30)),
            )
            .await
            .expect("receive");
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn deleted_temporary_rejects_use() {
        let broker = InMemoryBroker::new();
        let temp = broker
            .create_temporary(DestinationKind::Queue)
            .await
            .expect("allocated");
        assert!(broker.is_allocated(&temp));
        broker.delete_temporary(&temp).await.expect("deleted");
        assert!(!broker.is_allocated(&temp));
        assert!(matches!(
            broker.send(&temp, WireMessage::default()).await,
            Err(TransportError::UnknownDestination(_))
        ));
        assert!(broker.delete_temporary(&temp).await.is_err());
    }

    #[tokio::test]
    async fn topics_fan_out_to_every_subscription() {
        let broker = InMemoryBroker::new();
        let topic = Destination::topic("prices");
        let mut first = broker.subscribe(&topic, None).await.expect("subscribed");
        let mut second = broker.subscribe(&topic, Some("durable")).await.expect("subscribed");
        let raw = WireMessage {
            message_id: "p1".into(),
            ..WireMessage::default()
        };
        broker.send(&topic, raw.clone()).await.expect("published");
        assert_eq!(first.pull().await.expect("pull"), Some(raw.clone()));
        assert_eq!(second.pull().await.expect("pull"), Some(raw));
        assert_eq!(broker.subscriber_count("prices"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_pull_keeps_next_item() {
        let broker = InMemoryBroker::new();
        let topic = Destination::topic("ticks");
        let mut subscription = broker.subscribe(&topic, None).await.expect("subscribed");

        let cancelled =
            tokio::time::timeout(std::time::Duration::from_millis(10), subscription.pull()).await;
        assert!(cancelled.is_err());

        let raw = WireMessage {
            message_id: "t1".into(),
            ..WireMessage::default()
        };
        broker.send(&topic, raw.clone()).await.expect("published");
        assert_eq!(subscription.pull().await.expect("pull"), Some(raw));
    }
}
