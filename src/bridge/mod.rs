//! Push-to-poll bridge over a topic subscription.
//!
//! A [`TopicBridge`] runs one background loop that pulls from a
//! [`Subscriber`]'s subscription, converts every item and appends it to an
//! internal FIFO. Callers drain that FIFO with [`TopicBridge::receive`] using
//! ordinary selector and timeout semantics, independent of when the
//! subscription delivered.
//!
//! The bridge moves through [`SubscriptionState`] in one direction only:
//! `NotStarted -> Starting -> Running -> StopRequested -> Stopped`. The state
//! lives in a [`watch`] channel so `start` can wait for the subscription
//! outcome, while `stop` waits on the [`TaskTracker`] running the loop. A
//! loop that aborts after start is not restarted; its failure is logged, the
//! bridge moves to `Stopped`, and receivers that find the FIFO empty get
//! [`ExchangeError::SubscriptionLost`].

mod config;

use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

pub use config::{BridgeConfig, BridgeConfigBuilder, DEFAULT_BRIDGE_POLLING_INTERVAL, DEFAULT_STOP_GRACE};
use futures::FutureExt;
use tokio::{
    sync::watch,
    time::{self, Instant},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::{
    error::{ExchangeError, Result},
    message::Message,
    metrics,
    queue::PendingQueue,
    selector::Selector,
    timeout::Timeout,
    transport::{MessageConverter, Subscriber, Subscription, SubscriptionRaw},
};

/// Lifecycle of a [`TopicBridge`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    NotStarted,
    /// The loop is establishing the subscription.
    Starting,
    /// The subscription is confirmed live.
    Running,
    /// Stop was requested; the loop has not exited yet.
    StopRequested,
    /// The loop has exited. Terminal.
    Stopped,
}

#[derive(Clone, Debug)]
enum LoopFailure {
    Start(String),
    Lost(String),
}

struct Shared<S, C> {
    config: BridgeConfig,
    subscriber: Arc<S>,
    converter: C,
    queue: PendingQueue<Message>,
    state: watch::Sender<SubscriptionState>,
    failure: Mutex<Option<LoopFailure>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Background subscription feeding a pollable FIFO.
pub struct TopicBridge<S, C> {
    shared: Arc<Shared<S, C>>,
}

impl<S, C> TopicBridge<S, C>
where
    S: Subscriber,
    C: MessageConverter<SubscriptionRaw<S>>,
{
    #[must_use]
    pub fn new(config: BridgeConfig, subscriber: Arc<S>, converter: C) -> Self {
        let (state, _) = watch::channel(SubscriptionState::NotStarted);
        Self {
            shared: Arc::new(Shared {
                config,
                subscriber,
                converter,
                queue: PendingQueue::default(),
                state,
                failure: Mutex::new(None),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig { &self.shared.config }

    #[must_use]
    pub fn state(&self) -> SubscriptionState { *self.shared.state.borrow() }

    /// Items queued and not yet received.
    #[must_use]
    pub fn pending(&self) -> usize { self.shared.queue.len() }

    /// Launch the subscription loop and wait until the subscription is live.
    ///
    /// Calling `start` while the bridge is starting or running spawns nothing
    /// and resolves once the first start has.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::SubscriptionStart`] if the subscription could
    /// not be established, [`ExchangeError::SubscriptionLost`] if the loop has
    /// already died, or [`ExchangeError::BridgeStopped`] once stopped.
    pub async fn start(&self) -> Result<()> {
        let launched = self.shared.state.send_if_modified(|state| {
            if *state == SubscriptionState::NotStarted {
                *state = SubscriptionState::Starting;
                true
            } else {
                false
            }
        });
        if launched {
            debug!(topic = %self.shared.config.topic(), "starting subscription loop");
            self.shared.tracker.spawn(run(Arc::clone(&self.shared)));
            self.shared.tracker.close();
        }

        let mut states = self.shared.state.subscribe();
        let state = match states.wait_for(|s| *s != SubscriptionState::Starting).await {
            Ok(state) => *state,
            Err(_) => SubscriptionState::Stopped,
        };
        match state {
            SubscriptionState::Running => Ok(()),
            _ => Err(self.shared.terminal_error()),
        }
    }

    /// Ask the loop to exit and wait up to the configured grace period.
    ///
    /// A no-op on a bridge that was never started or has already stopped.
    /// Items queued before the stop remain receivable.
    pub async fn stop(&self) {
        let topic = self.shared.config.topic();
        let active = self.shared.state.send_if_modified(|state| match state {
            SubscriptionState::Starting | SubscriptionState::Running => {
                *state = SubscriptionState::StopRequested;
                true
            }
            _ => false,
        });
        if !active && self.state() != SubscriptionState::StopRequested {
            return;
        }
        self.shared.shutdown.cancel();

        let grace = self.shared.config.stop_grace();
        let stopped = time::timeout(grace, self.shared.tracker.wait()).await.is_ok();
        if stopped {
            info!(%topic, "subscription stopped");
        } else {
            warn!(
                %topic,
                grace_ms = grace.as_millis(),
                "subscription loop did not stop within grace period"
            );
        }
    }

    /// Take the oldest queued message matching `selector`, waiting up to
    /// `timeout` for one to arrive.
    ///
    /// Valid in every state. After the loop has stopped the remaining items
    /// are drained and an empty queue fails immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::ReceiveTimeout`] when nothing matching
    /// arrives in time, or the loop's failure if it aborted.
    pub async fn receive(&self, selector: Option<&Selector>, timeout: Timeout) -> Result<Message> {
        let queue = &self.shared.queue;
        let deadline = timeout.deadline_from(Instant::now());
        loop {
            let changed = queue.changed();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if let Some(message) = queue.take(selector) {
                debug!(message_id = message.id(), "received bridged message");
                return Ok(message);
            }
            if self.state() == SubscriptionState::Stopped {
                return Err(self
                    .shared
                    .loop_failure()
                    .unwrap_or_else(|| self.receive_timeout(timeout)));
            }
            match deadline {
                Some(deadline) => {
                    if time::timeout_at(deadline, changed).await.is_err() {
                        return queue.take(selector).ok_or_else(|| self.receive_timeout(timeout));
                    }
                }
                None => changed.await,
            }
        }
    }

    fn receive_timeout(&self, timeout: Timeout) -> ExchangeError {
        ExchangeError::ReceiveTimeout {
            timeout,
            destination: self.shared.config.topic().name().to_owned(),
        }
    }
}

impl<S, C> Drop for TopicBridge<S, C> {
    fn drop(&mut self) { self.shared.shutdown.cancel(); }
}

impl<S, C> Shared<S, C> {
    fn failure(&self) -> MutexGuard<'_, Option<LoopFailure>> {
        self.failure.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn topic_name(&self) -> String { self.config.topic().name().to_owned() }

    fn loop_failure(&self) -> Option<ExchangeError> {
        let failure = self.failure().clone()?;
        Some(match failure {
            LoopFailure::Start(reason) => ExchangeError::SubscriptionStart {
                topic: self.topic_name(),
                reason,
            },
            LoopFailure::Lost(reason) => ExchangeError::SubscriptionLost {
                topic: self.topic_name(),
                reason,
            },
        })
    }

    fn terminal_error(&self) -> ExchangeError {
        self.loop_failure()
            .unwrap_or_else(|| ExchangeError::BridgeStopped {
                topic: self.topic_name(),
            })
    }
}

impl<S, C> Shared<S, C>
where
    S: Subscriber,
    C: MessageConverter<SubscriptionRaw<S>>,
{
    async fn pump(&self) -> std::result::Result<(), String> {
        let topic = self.config.topic();
        let mut subscription = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Ok(()),
            subscribed = self.subscriber.subscribe(topic, self.config.durable_name()) => {
                subscribed.map_err(|e| e.to_string())?
            }
        };
        self.state.send_if_modified(|state| {
            if *state == SubscriptionState::Starting {
                *state = SubscriptionState::Running;
                true
            } else {
                false
            }
        });
        info!(%topic, durable_name = ?self.config.durable_name(), "subscription started");

        let outcome = loop {
            let pulled = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break Ok(()),
                pulled = subscription.pull() => pulled,
            };
            match pulled {
                Ok(Some(raw)) => self.deliver(raw),
                Ok(None) => {
                    tokio::select! {
                        biased;
                        () = self.shutdown.cancelled() => break Ok(()),
                        () = time::sleep(self.config.polling_interval()) => {}
                    }
                }
                Err(e) => break Err(e.to_string()),
            }
        };
        if let Err(e) = subscription.close().await {
            warn!(%topic, error = %e, "failed to close subscription");
        }
        outcome
    }

    fn deliver(&self, raw: SubscriptionRaw<S>) {
        let topic = self.config.topic();
        match self.converter.from_raw(raw) {
            Ok(message) => {
                debug!(%topic, message_id = message.id(), "queued subscription item");
                metrics::inc_bridged(topic.name());
                self.queue.push(message);
            }
            Err(e) => warn!(%topic, error = %e, "dropping subscription item that could not be converted"),
        }
    }
}

async fn run<S, C>(shared: Arc<Shared<S, C>>)
where
    S: Subscriber,
    C: MessageConverter<SubscriptionRaw<S>>,
{
    let reason = match AssertUnwindSafe(shared.pump()).catch_unwind().await {
        Ok(Ok(())) => None,
        Ok(Err(reason)) => Some(reason),
        Err(panic) => {
            let panic_msg = panic
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("<non-string panic>");
            Some(format!("subscription loop panicked: {panic_msg}"))
        }
    };

    let topic = shared.config.topic();
    if let Some(reason) = reason {
        let during_start = *shared.state.borrow() == SubscriptionState::Starting;
        error!(%topic, %reason, during_start, "subscription loop aborted");
        *shared.failure() = Some(if during_start {
            LoopFailure::Start(reason)
        } else {
            LoopFailure::Lost(reason)
        });
    }
    shared.state.send_replace(SubscriptionState::Stopped);
    shared.queue.wake_all();
    debug!(%topic, "subscription loop exited");
}
