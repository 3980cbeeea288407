#![doc(html_root_url = "https://docs.rs/replyframe/latest")]
//! Public API for the `replyframe` library.
//!
//! This crate provides the core of synchronous messaging over
//! destination-based transports: correlated request/reply exchanges with
//! fixed, named or temporary reply destinations, and a bridge that turns a
//! push-style topic subscription into a pollable queue.
//!
//! The broker itself is abstracted behind the traits in [`transport`];
//! [`memory::InMemoryBroker`] implements them in process.

pub mod bridge;
pub mod correlation;
pub mod destination;
pub mod endpoint;
pub mod error;
pub mod memory;
pub mod message;
pub mod metrics;
mod queue;
pub mod selector;
pub mod timeout;
pub mod transport;

pub use bridge::{BridgeConfig, SubscriptionState, TopicBridge};
pub use correlation::{
    CorrelationKey,
    CorrelationStore,
    Correlator,
    DefaultCorrelator,
    ExchangeScope,
    ReplyDestinationTracker,
    Scope,
};
pub use destination::{Destination, DestinationKind, ReplyAddress};
pub use endpoint::{SyncConsumer, SyncEndpointConfig, SyncProducer};
pub use error::{ConfigError, ExchangeError, Result};
pub use message::{Message, ReplyTo};
pub use metrics::{BRIDGED_MESSAGES, EXCHANGES_TOTAL, ExchangeOutcome, TEMPORARY_DESTINATIONS};
pub use selector::Selector;
pub use timeout::Timeout;
