//! Key/value store with bounded blocking lookup.
//!
//! `CorrelationStore` backs both reply-destination tracking and reply-message
//! storage. Values are inserted without blocking and removed by the first
//! waiter that finds them. Waiting either parks on a [`Notify`] that every
//! insert wakes, or re-checks the map on a fixed polling interval.
//!
//! Several waiters on the same key all wake on insert but only the first to
//! remove the entry receives the value; the rest keep waiting until their own
//! deadline.

use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::{
    sync::Notify,
    time::{self, Instant},
};
use tracing::debug;

use super::{CorrelationKey, Scope};
use crate::{error::ExchangeError, timeout::Timeout};

/// Default interval between lookups for [`WaitStrategy::Poll`].
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(500);

/// How [`CorrelationStore::find`] waits for a value to arrive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Park until an insert wakes the waiter.
    #[default]
    Notify,
    /// Re-check the store every interval.
    Poll(Duration),
}

/// No value arrived for a key within the requested timeout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no value stored under correlation key '{key}' after waiting {}ms", .waited.as_millis())]
pub struct CorrelationTimeout {
    pub key: CorrelationKey,
    pub waited: Duration,
}

/// Concurrent correlation store.
pub struct CorrelationStore<V> {
    entries: DashMap<CorrelationKey, V>,
    arrivals: Notify,
    strategy: WaitStrategy,
    item: &'static str,
}

impl<V> Default for CorrelationStore<V> {
    fn default() -> Self { Self::with_strategy(WaitStrategy::default()) }
}

impl<V> CorrelationStore<V> {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn with_strategy(strategy: WaitStrategy) -> Self {
        Self {
            entries: DashMap::new(),
            arrivals: Notify::new(),
            strategy,
            item: "value",
        }
    }

    /// Name the stored values in retry logs, e.g. `"reply message"`.
    #[must_use]
    pub fn labelled(mut self, item: &'static str) -> Self {
        self.item = item;
        self
    }

    #[must_use]
    pub fn strategy(&self) -> WaitStrategy { self.strategy }

    /// Bind `key` under `name` in the calling exchange's scope.
    pub fn save_correlation_key(&self, name: &str, key: &CorrelationKey, scope: &dyn Scope) {
        debug!(%name, %key, "saving correlation key");
        scope.set_variable(name, key.as_str().to_owned());
    }

    /// Key previously bound under `name` in `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::CorrelationKeyNotFound`] if no key was bound.
    pub fn correlation_key(
        &self,
        name: &str,
        scope: &dyn Scope,
    ) -> Result<CorrelationKey, ExchangeError> {
        scope
            .variable(name)
            .map(CorrelationKey::from)
            .ok_or_else(|| ExchangeError::CorrelationKeyNotFound {
                name: name.to_owned(),
            })
    }

    /// Insert or overwrite the value for `key`, waking waiters.
    pub fn store(&self, key: CorrelationKey, value: V) {
        debug!(%key, item = self.item, "storing correlated value");
        self.entries.insert(key, value);
        self.arrivals.notify_waiters();
    }

    /// Remove and return the value for `key` without waiting.
    pub fn try_find(&self, key: &CorrelationKey) -> Option<V> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    #[must_use]
    pub fn contains(&self, key: &CorrelationKey) -> bool { self.entries.contains_key(key) }

    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Drop every entry, typically at the end of a logical test unit.
    pub fn clear(&self) { self.entries.clear(); }

    /// Remove the value for `key`, waiting up to `timeout` for it to arrive.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationTimeout`] if no value arrived in time.
    ///
    /// # Examples
    ///
    /// ```
    /// use replyframe::{correlation::CorrelationStore, timeout::Timeout};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let store = CorrelationStore::new();
    /// store.store("k".into(), 7u8);
    /// assert_eq!(store.find(&"k".into(), Timeout::Immediate).await, Ok(7));
    /// assert!(store.find(&"k".into(), Timeout::Immediate).await.is_err());
    /// # }
    /// ```
    pub async fn find(&self, key: &CorrelationKey, timeout: Timeout) -> Result<V, CorrelationTimeout> {
        let start = Instant::now();
        let deadline = timeout.deadline_from(start);
        let found = match self.strategy {
            WaitStrategy::Notify => self.find_notified(key, deadline).await,
            WaitStrategy::Poll(interval) => self.find_polling(key, deadline, interval).await,
        };
        found.ok_or_else(|| CorrelationTimeout {
            key: key.clone(),
            waited: start.elapsed(),
        })
    }

    async fn find_notified(&self, key: &CorrelationKey, deadline: Option<Instant>) -> Option<V> {
        loop {
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            // Register before checking so an insert between the check and the
            // await still wakes us.
            notified.as_mut().enable();
            if let Some(value) = self.try_find(key) {
                return Some(value);
            }
            match deadline {
                Some(deadline) => {
                    if time::timeout_at(deadline, notified).await.is_err() {
                        return self.try_find(key);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn find_polling(
        &self,
        key: &CorrelationKey,
        deadline: Option<Instant>,
        interval: Duration,
    ) -> Option<V> {
        loop {
            if let Some(value) = self.try_find(key) {
                return Some(value);
            }
            let now = Instant::now();
            let pause = match deadline {
                Some(deadline) if deadline <= now => return None,
                Some(deadline) => interval.min(deadline - now),
                None => interval,
            };
            debug!(
                %key,
                item = self.item,
                retry_in_ms = pause.as_millis(),
                "correlated value did not arrive yet - retrying"
            );
            time::sleep(pause).await;
        }
    }
}
