//! Collaborator contracts consumed by the exchange core.
//!
//! The core never talks to a broker directly. It sends and receives raw
//! transport messages through [`Transport`], manages reply destinations
//! through [`DestinationResolver`] and [`DestinationAllocator`], pulls
//! publish/subscribe feeds through [`Subscriber`], and maps messages with a
//! [`MessageConverter`].

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    destination::{Destination, DestinationKind},
    message::Message,
    selector::Selector,
    timeout::Timeout,
};

/// Failures reported by a transport implementation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection to the broker is gone.
    #[error("transport disconnected")]
    Disconnected,
    /// The destination does not exist (or was deleted).
    #[error("unknown destination '{0}'")]
    UnknownDestination(String),
    /// Any other broker failure.
    #[error("{0}")]
    Broker(String),
    /// A failure with an underlying cause.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Failures while mapping between [`Message`] and a raw transport message.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConvertError(pub String);

/// Queue/topic client used for point-to-point sends and receives.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Transport-native message representation.
    type Raw: Send + 'static;

    /// Send `message` to `destination`.
    async fn send(&self, destination: &Destination, message: Self::Raw)
    -> Result<(), TransportError>;

    /// Receive the next message on `destination` matching `selector`.
    ///
    /// `Ok(None)` means nothing arrived within `timeout`; it is not an error.
    async fn receive(
        &self,
        destination: &Destination,
        selector: Option<&Selector>,
        timeout: Timeout,
    ) -> Result<Option<Self::Raw>, TransportError>;
}

/// Resolves destination names to destinations.
#[async_trait]
pub trait DestinationResolver: Send + Sync + 'static {
    async fn resolve(&self, name: &str, kind: DestinationKind)
    -> Result<Destination, TransportError>;
}

/// Allocates and deletes temporary destinations.
#[async_trait]
pub trait DestinationAllocator: Send + Sync + 'static {
    async fn create_temporary(&self, kind: DestinationKind) -> Result<Destination, TransportError>;

    async fn delete_temporary(&self, destination: &Destination) -> Result<(), TransportError>;
}

/// A live publish/subscribe subscription.
#[async_trait]
pub trait Subscription: Send + 'static {
    type Raw: Send + 'static;

    /// Pull the next item.
    ///
    /// Implementations may block until an item arrives or return `Ok(None)`
    /// when nothing is currently available; callers handle both.
    ///
    /// # Cancel safety
    ///
    /// The returned future may be dropped at any `.await`, for instance when
    /// a bridge is stopped while the pull is blocked. An item must not have
    /// been taken from the broker unless the future resolves with it, so a
    /// dropped pull leaves the next item for the following call.
    async fn pull(&mut self) -> Result<Option<Self::Raw>, TransportError>;

    /// Release the subscription.
    async fn close(&mut self) -> Result<(), TransportError> { Ok(()) }
}

/// Establishes topic subscriptions.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    type Subscription: Subscription;

    /// Subscribe to `topic`, durably under `durable_name` when given.
    ///
    /// Returning `Ok` confirms the subscription is live.
    async fn subscribe(
        &self,
        topic: &Destination,
        durable_name: Option<&str>,
    ) -> Result<Self::Subscription, TransportError>;
}

/// Raw item type produced by a [`Subscriber`].
pub type SubscriptionRaw<S> = <<S as Subscriber>::Subscription as Subscription>::Raw;

/// Maps between [`Message`] and a transport-native representation.
///
/// Implementations must round-trip identifiers, headers, correlation id and
/// reply-to so reply metadata survives the transport.
pub trait MessageConverter<R>: Send + Sync + 'static {
    /// Convert an outbound message.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] if the message cannot be represented.
    fn to_raw(&self, message: &Message) -> Result<R, ConvertError>;

    /// Convert an inbound message.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] if the raw message is not understood.
    fn from_raw(&self, raw: R) -> Result<Message, ConvertError>;
}
