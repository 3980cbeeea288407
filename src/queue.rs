//! Selector-aware FIFO with waitable arrivals.
//!
//! Backs the bridge's pending items and the in-memory broker's mailboxes.
//! A selector-qualified take removes the first matching item and leaves the
//! rest in order.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::{
    sync::{Notify, futures::Notified},
    time::{self, Instant},
};

use crate::selector::{Selector, SelectorSource};

pub(crate) struct PendingQueue<T> {
    items: Mutex<VecDeque<T>>,
    changed: Notify,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            changed: Notify::new(),
        }
    }
}

impl<T: SelectorSource> PendingQueue<T> {
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, item: T) {
        self.lock().push_back(item);
        self.changed.notify_waiters();
    }

    pub(crate) fn take(&self, selector: Option<&Selector>) -> Option<T> {
        let mut items = self.lock();
        let index = match selector {
            None => 0,
            Some(selector) => items.iter().position(|item| selector.matches(item))?,
        };
        items.remove(index)
    }

    pub(crate) fn len(&self) -> usize { self.lock().len() }

    /// Future resolved by the next push or [`Self::wake_all`].
    pub(crate) fn changed(&self) -> Notified<'_> { self.changed.notified() }

    pub(crate) fn wake_all(&self) { self.changed.notify_waiters(); }

    /// Take the first item matching `selector`, waiting until `deadline`
    /// (forever when `None`).
    pub(crate) async fn take_within(
        &self,
        selector: Option<&Selector>,
        deadline: Option<Instant>,
    ) -> Option<T> {
        loop {
            let changed = self.changed();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if let Some(item) = self.take(selector) {
                return Some(item);
            }
            match deadline {
                Some(deadline) => {
                    if time::timeout_at(deadline, changed).await.is_err() {
                        return self.take(selector);
                    }
                }
                None => changed.await,
            }
        }
    }
}
