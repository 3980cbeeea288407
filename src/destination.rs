//! Transport destinations and the provenance of reply addresses.
//!
//! A reply address is chosen once at the start of an exchange and recorded as
//! a [`ReplyAddress`] variant, so later steps (which listener to wait on,
//! whether to delete afterwards) never have to inspect the destination again.

use std::{fmt, sync::Arc};

use tracing::{debug, error, warn};

use crate::transport::DestinationAllocator;

/// Queue (point-to-point) or topic (publish/subscribe).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DestinationKind {
    Queue,
    Topic,
}

/// A transport-level destination reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Destination {
    name: String,
    kind: DestinationKind,
    temporary: bool,
}

impl Destination {
    /// A named queue.
    #[must_use]
    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DestinationKind::Queue,
            temporary: false,
        }
    }

    /// A named topic.
    #[must_use]
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DestinationKind::Topic,
            temporary: false,
        }
    }

    /// A transport-allocated destination scoped to one exchange.
    #[must_use]
    pub fn temporary(name: impl Into<String>, kind: DestinationKind) -> Self {
        Self {
            name: name.into(),
            kind,
            temporary: true,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    #[must_use]
    pub fn kind(&self) -> DestinationKind { self.kind }

    #[must_use]
    pub fn is_temporary(&self) -> bool { self.temporary }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DestinationKind::Queue => "queue",
            DestinationKind::Topic => "topic",
        };
        if self.temporary {
            write!(f, "temporary-{kind}://{}", self.name)
        } else {
            write!(f, "{kind}://{}", self.name)
        }
    }
}

/// A reply destination tagged with where it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyAddress {
    /// Already present in the outgoing message's reply-to.
    Embedded(Destination),
    /// Statically configured on the endpoint.
    Fixed(Destination),
    /// Resolved by name at send time.
    Named {
        name: String,
        destination: Destination,
    },
    /// Allocated for exactly this exchange; must be deleted afterwards.
    Temporary(Destination),
}

impl ReplyAddress {
    #[must_use]
    pub fn destination(&self) -> &Destination {
        match self {
            Self::Embedded(d) | Self::Fixed(d) | Self::Temporary(d) => d,
            Self::Named { destination, .. } => destination,
        }
    }

    /// Returns true when the exchange owns a dedicated listener on the
    /// address, rather than sharing it with other exchanges.
    #[must_use]
    pub fn is_dedicated(&self) -> bool {
        matches!(self, Self::Temporary(_)) || self.destination().is_temporary()
    }

    /// Short provenance label for logs and metrics.
    #[must_use]
    pub fn provenance(&self) -> &'static str {
        match self {
            Self::Embedded(_) => "embedded",
            Self::Fixed(_) => "fixed",
            Self::Named { .. } => "named",
            Self::Temporary(_) => "temporary",
        }
    }
}

/// Owns a temporary destination until it is deleted.
///
/// [`TemporaryDestination::delete`] removes it once. If the guard is dropped
/// without being deleted, for example because the exchange future was
/// cancelled, deletion is scheduled on the current Tokio runtime.
pub struct TemporaryDestination<A: DestinationAllocator> {
    allocator: Arc<A>,
    destination: Option<Destination>,
}

impl<A: DestinationAllocator> TemporaryDestination<A> {
    pub(crate) fn new(allocator: Arc<A>, destination: Destination) -> Self {
        crate::metrics::inc_temporary_destinations();
        Self {
            allocator,
            destination: Some(destination),
        }
    }

    /// Delete the destination. Failures are logged and swallowed because the
    /// exchange outcome has already been decided.
    pub async fn delete(mut self) {
        if let Some(destination) = self.destination.take() {
            delete_logged(&*self.allocator, &destination).await;
        }
    }
}

async fn delete_logged<A: DestinationAllocator + ?Sized>(allocator: &A, destination: &Destination) {
    debug!(%destination, "deleting temporary destination");
    crate::metrics::dec_temporary_destinations();
    if let Err(e) = allocator.delete_temporary(destination).await {
        error!(%destination, error = %e, "error while deleting temporary destination");
    }
}

impl<A: DestinationAllocator> Drop for TemporaryDestination<A> {
    fn drop(&mut self) {
        let Some(destination) = self.destination.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let allocator = Arc::clone(&self.allocator);
                handle.spawn(async move { delete_logged(&*allocator, &destination).await });
            }
            Err(_) => {
                warn!(%destination, "temporary destination leaked: no runtime to delete it on");
            }
        }
    }
}
