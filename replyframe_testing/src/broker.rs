//! Broker wrapper recording temporary destination lifecycles.

use std::sync::{
    Mutex,
    MutexGuard,
    PoisonError,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use replyframe::{
    destination::{Destination, DestinationKind},
    memory::{InMemoryBroker, WireMessage},
    selector::Selector,
    timeout::Timeout,
    transport::{DestinationAllocator, DestinationResolver, Transport, TransportError},
};

/// [`InMemoryBroker`] that counts temporary allocations and deletions and
/// can be told to fail them.
#[derive(Default)]
pub struct CountingBroker {
    inner: InMemoryBroker,
    created: AtomicUsize,
    deleted: Mutex<Vec<Destination>>,
    fail_allocation: AtomicBool,
    fail_deletion: AtomicBool,
}

impl CountingBroker {
    pub fn new() -> Self { Self::default() }

    /// The wrapped broker, sharing state with this one.
    pub fn broker(&self) -> &InMemoryBroker { &self.inner }

    /// Fail every temporary allocation from now on.
    pub fn fail_allocations(&self, fail: bool) { self.fail_allocation.store(fail, Ordering::SeqCst); }

    /// Fail every temporary deletion from now on. Failed deletions are
    /// still counted.
    pub fn fail_deletions(&self, fail: bool) { self.fail_deletion.store(fail, Ordering::SeqCst); }

    pub fn created(&self) -> usize { self.created.load(Ordering::SeqCst) }

    pub fn deleted(&self) -> usize { self.deletions().len() }

    /// How many times `destination` was deleted.
    pub fn deletions_of(&self, destination: &Destination) -> usize {
        self.deletions().iter().filter(|d| *d == destination).count()
    }

    fn deletions(&self) -> MutexGuard<'_, Vec<Destination>> {
        self.deleted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for CountingBroker {
    type Raw = WireMessage;

    async fn send(&self, destination: &Destination, message: WireMessage) -> Result<(), TransportError> {
        self.inner.send(destination, message).await
    }

    async fn receive(
        &self,
        destination: &Destination,
        selector: Option<&Selector>,
        timeout: Timeout,
    ) -> Result<Option<WireMessage>, TransportError> {
        self.inner.receive(destination, selector, timeout).await
    }
}

#[async_trait]
impl DestinationResolver for CountingBroker {
    async fn resolve(&self, name: &str, kind: DestinationKind) -> Result<Destination, TransportError> {
        self.inner.resolve(name, kind).await
    }
}

#[async_trait]
impl DestinationAllocator for CountingBroker {
    async fn create_temporary(&self, kind: DestinationKind) -> Result<Destination, TransportError> {
        if self.fail_allocation.load(Ordering::SeqCst) {
            return Err(TransportError::Broker("temporary destinations exhausted".into()));
        }
        let destination = self.inner.create_temporary(kind).await?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(destination)
    }

    async fn delete_temporary(&self, destination: &Destination) -> Result<(), TransportError> {
        self.deletions().push(destination.clone());
        if self.fail_deletion.load(Ordering::SeqCst) {
            return Err(TransportError::Broker(format!("cannot delete {destination}")));
        }
        self.inner.delete_temporary(destination).await
    }
}
