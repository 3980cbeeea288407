//! Canonical error and result types for the crate.
//!
//! `ExchangeError` is the single failure surface of producers, consumers and
//! bridges. Timeouts and "not found" outcomes are domain results, carrying
//! enough context (correlation key, destination, deadline) to tell a missing
//! responder from a slow one or a misconfigured correlator.

use thiserror::Error;

use crate::{
    correlation::{CorrelationKey, store::CorrelationTimeout},
    selector::SelectorError,
    timeout::Timeout,
    transport::{ConvertError, TransportError},
};

/// Errors raised while validating endpoint or bridge configuration.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A negative timeout other than the indefinite sentinel.
    #[error("invalid timeout {0}ms; use -1 to wait indefinitely or a value >= 0")]
    InvalidTimeout(i64),
    /// A polling interval of zero would spin.
    #[error("polling interval must be greater than zero")]
    ZeroPollingInterval,
    /// Endpoint and bridge names identify correlation bindings and must be set.
    #[error("endpoint name must not be empty")]
    EmptyName,
    /// A configured selector did not parse.
    #[error("invalid selector: {0}")]
    Selector(#[from] SelectorError),
}

/// Failures surfaced to callers of an exchange.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// No reply arrived on the expected address or key within the deadline.
    #[error(
        "no reply message received within {deadline} on reply destination '{reply_address}' \
         (correlation key: {correlation_key})"
    )]
    ReplyTimeout {
        /// The deadline that elapsed.
        deadline: Timeout,
        /// Name of the reply destination that was waited on.
        reply_address: String,
        /// Correlation key of the exchange.
        correlation_key: CorrelationKey,
    },
    /// No inbound message arrived within the deadline.
    #[error("no message received within {timeout} on destination '{destination}'")]
    ReceiveTimeout {
        /// The timeout that elapsed.
        timeout: Timeout,
        /// Destination or topic that was polled.
        destination: String,
    },
    /// A reply was sent before any request recorded a reply-to address.
    #[error("failed to find reply destination for message correlation key: '{correlation_key}'")]
    ReplyDestinationNotFound {
        /// Key under which the reply destination was expected.
        correlation_key: CorrelationKey,
    },
    /// No correlation key was ever bound under this name in the scope.
    #[error("failed to get correlation key for '{name}'")]
    CorrelationKeyNotFound {
        /// Scope variable that was looked up.
        name: String,
    },
    /// A value never arrived in a correlation store.
    #[error(transparent)]
    CorrelationTimeout(#[from] CorrelationTimeout),
    /// The transport could not allocate a temporary reply destination.
    #[error("failed to allocate temporary reply destination")]
    DestinationAllocation(#[source] TransportError),
    /// Neither a destination nor a destination name is configured.
    #[error("unable to send message - destination not set")]
    DestinationNotSet,
    /// The correlator's field is absent from the message.
    #[error("message has no '{field}' field to derive a correlation key from")]
    MissingCorrelationField {
        /// Name of the missing field.
        field: String,
    },
    /// A topic subscription could not be established.
    #[error("failed to start subscription on '{topic}': {reason}")]
    SubscriptionStart {
        /// Subscribed topic.
        topic: String,
        /// Reason reported by the subscription loop.
        reason: String,
    },
    /// The subscription loop died after a successful start.
    #[error("subscription on '{topic}' terminated: {reason}")]
    SubscriptionLost {
        /// Subscribed topic.
        topic: String,
        /// Reason reported by the subscription loop.
        reason: String,
    },
    /// A stopped bridge cannot be restarted.
    #[error("subscription on '{topic}' has been stopped")]
    BridgeStopped {
        /// Subscribed topic.
        topic: String,
    },
    /// Invalid configuration or call arguments.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Message conversion to or from the transport representation failed.
    #[error("message conversion failed: {0}")]
    Conversion(#[from] ConvertError),
}

impl ExchangeError {
    /// Returns true for the deadline-driven outcomes.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ReplyTimeout { .. } | Self::ReceiveTimeout { .. } | Self::CorrelationTimeout(_)
        )
    }
}

/// Canonical result alias used by `replyframe` public APIs.
pub type Result<T> = std::result::Result<T, ExchangeError>;
