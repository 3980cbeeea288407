//! Scripted topic feed for exercising [`TopicBridge`](replyframe::TopicBridge).

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use replyframe::{
    destination::Destination,
    memory::WireMessage,
    transport::{Subscriber, Subscription, TransportError},
};

/// One step of a scripted feed, consumed by successive pulls.
#[derive(Clone, Debug)]
pub enum FeedStep {
    /// Deliver a message.
    Item(WireMessage),
    /// Block inside the pull for the given time before moving on.
    Gap(Duration),
    /// Report "nothing available" without blocking.
    Empty,
    /// Fail the pull.
    Fail(String),
    /// Panic inside the pull.
    Panic(&'static str),
}

impl FeedStep {
    /// An item with the given message id and body.
    pub fn item(id: &str, body: &'static str) -> Self {
        Self::Item(WireMessage {
            message_id: id.to_owned(),
            body: body.into(),
            ..WireMessage::default()
        })
    }
}

/// A [`Subscriber`] whose subscription replays a script, then blocks forever.
#[derive(Default)]
pub struct ScriptedSubscriber {
    script: Mutex<VecDeque<FeedStep>>,
    subscribe_error: Option<String>,
    subscribe_delay: Duration,
    close_delay: Duration,
    subscriptions: AtomicUsize,
    pulls: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedSubscriber {
    pub fn new(steps: impl IntoIterator<Item = FeedStep>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Make every subscribe attempt fail with `reason`.
    #[must_use]
    pub fn failing_subscribe(mut self, reason: impl Into<String>) -> Self {
        self.subscribe_error = Some(reason.into());
        self
    }

    /// Delay confirming the subscription.
    #[must_use]
    pub fn subscribe_delay(mut self, delay: Duration) -> Self {
        self.subscribe_delay = delay;
        self
    }

    /// Delay releasing the subscription on close.
    #[must_use]
    pub fn close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    /// Number of subscriptions established.
    pub fn subscriptions(&self) -> usize { self.subscriptions.load(Ordering::SeqCst) }

    /// Number of pulls started across all subscriptions.
    pub fn pulls(&self) -> usize { self.pulls.load(Ordering::SeqCst) }

    /// Number of subscriptions closed.
    pub fn closes(&self) -> usize { self.closes.load(Ordering::SeqCst) }
}

/// Subscription handed out by [`ScriptedSubscriber`].
pub struct ScriptedSubscription {
    steps: VecDeque<FeedStep>,
    close_delay: Duration,
    pulls: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Subscription for ScriptedSubscription {
    type Raw = WireMessage;

    async fn pull(&mut self) -> Result<Option<WireMessage>, TransportError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        loop {
            match self.steps.pop_front() {
                Some(FeedStep::Item(item)) => return Ok(Some(item)),
                Some(FeedStep::Gap(gap)) => tokio::time::sleep(gap).await,
                Some(FeedStep::Empty) => return Ok(None),
                Some(FeedStep::Fail(reason)) => return Err(TransportError::Broker(reason)),
                Some(FeedStep::Panic(msg)) => panic!("{msg}"),
                None => std::future::pending::<()>().await,
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        tokio::time::sleep(self.close_delay).await;
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Subscriber for ScriptedSubscriber {
    type Subscription = ScriptedSubscription;

    async fn subscribe(
        &self,
        _topic: &Destination,
        _durable_name: Option<&str>,
    ) -> Result<ScriptedSubscription, TransportError> {
        if !self.subscribe_delay.is_zero() {
            tokio::time::sleep(self.subscribe_delay).await;
        }
        if let Some(reason) = &self.subscribe_error {
            return Err(TransportError::Broker(reason.clone()));
        }
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let steps = std::mem::take(&mut *self.script.lock().unwrap_or_else(PoisonError::into_inner));
        Ok(ScriptedSubscription {
            steps,
            close_delay: self.close_delay,
            pulls: Arc::clone(&self.pulls),
            closes: Arc::clone(&self.closes),
        })
    }
}
