//! Synchronous request/reply endpoints.
//!
//! [`SyncProducer`] drives the requesting side of an exchange and
//! [`SyncConsumer`] the responding side. Both are configured with a
//! [`SyncEndpointConfig`] and talk to the broker through the traits in
//! [`crate::transport`].

pub mod config;
pub mod consumer;
pub mod producer;

pub use config::{SyncEndpointConfig, SyncEndpointConfigBuilder};
pub use consumer::SyncConsumer;
pub use producer::{SyncProducer, reply_to_variable};
