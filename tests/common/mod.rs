//! Shared utilities for integration tests.
//!
//! Provides fixtures for a counting in-memory broker and helpers that build
//! producers and consumers on it with the default correlator.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::sync::Arc;

use replyframe::{
    destination::Destination,
    endpoint::{SyncConsumer, SyncEndpointConfig, SyncEndpointConfigBuilder, SyncProducer},
    memory::WireConverter,
};
use replyframe_testing::CountingBroker;
use rstest::fixture;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub type Producer = SyncProducer<CountingBroker, WireConverter>;
pub type Consumer = SyncConsumer<CountingBroker, WireConverter>;

/// Queue requests are exchanged on.
pub const REQUESTS: &str = "requests";

#[expect(
    unused_braces,
    reason = "rustc false positive for single-line rstest fixtures"
)]
#[allow(unfulfilled_lint_expectations)]
#[fixture]
pub fn broker() -> Arc<CountingBroker> { Arc::new(CountingBroker::new()) }

/// Producer configuration sending to [`REQUESTS`].
pub fn client_config(name: &str) -> SyncEndpointConfigBuilder {
    SyncEndpointConfig::builder(name).destination(Destination::queue(REQUESTS))
}

/// Consumer configuration receiving from [`REQUESTS`].
pub fn server_config(name: &str) -> SyncEndpointConfigBuilder {
    SyncEndpointConfig::builder(name).destination(Destination::queue(REQUESTS))
}

pub fn producer(broker: &Arc<CountingBroker>, config: SyncEndpointConfigBuilder) -> TestResult<Producer> {
    Ok(SyncProducer::new(config.build()?, Arc::clone(broker), WireConverter))
}

pub fn consumer(broker: &Arc<CountingBroker>, config: SyncEndpointConfigBuilder) -> TestResult<Consumer> {
    Ok(SyncConsumer::new(config.build()?, Arc::clone(broker), WireConverter))
}
