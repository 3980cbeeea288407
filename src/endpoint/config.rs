//! Configuration shared by synchronous producers and consumers.

use std::{fmt, sync::Arc, time::Duration};

use crate::{
    correlation::{Correlator, DefaultCorrelator, WaitStrategy, store::DEFAULT_POLLING_INTERVAL},
    destination::{Destination, DestinationKind},
    error::ConfigError,
    timeout::Timeout,
};

/// Default wait for replies and reply destinations.
pub const DEFAULT_TIMEOUT_MILLIS: i64 = 5_000;

/// Validated settings of one synchronous endpoint.
#[derive(Clone)]
pub struct SyncEndpointConfig {
    name: String,
    destination: Option<Destination>,
    destination_name: Option<String>,
    reply_destination: Option<Destination>,
    reply_destination_name: Option<String>,
    pub_sub_domain: bool,
    timeout: Timeout,
    wait_strategy: WaitStrategy,
    correlator: Arc<dyn Correlator>,
}

impl SyncEndpointConfig {
    /// Start building a configuration for the endpoint called `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SyncEndpointConfigBuilder {
        SyncEndpointConfigBuilder::new(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    #[must_use]
    pub fn destination(&self) -> Option<&Destination> { self.destination.as_ref() }

    #[must_use]
    pub fn destination_name(&self) -> Option<&str> { self.destination_name.as_deref() }

    #[must_use]
    pub fn reply_destination(&self) -> Option<&Destination> { self.reply_destination.as_ref() }

    #[must_use]
    pub fn reply_destination_name(&self) -> Option<&str> { self.reply_destination_name.as_deref() }

    /// Whether temporary reply destinations are topics rather than queues.
    #[must_use]
    pub fn pub_sub_domain(&self) -> bool { self.pub_sub_domain }

    /// Kind used for named and temporary destinations.
    #[must_use]
    pub fn destination_kind(&self) -> DestinationKind {
        if self.pub_sub_domain {
            DestinationKind::Topic
        } else {
            DestinationKind::Queue
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Timeout { self.timeout }

    #[must_use]
    pub fn wait_strategy(&self) -> WaitStrategy { self.wait_strategy }

    #[must_use]
    pub fn correlator(&self) -> &Arc<dyn Correlator> { &self.correlator }
}

impl fmt::Debug for SyncEndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEndpointConfig")
            .field("name", &self.name)
            .field("destination", &self.destination)
            .field("destination_name", &self.destination_name)
            .field("reply_destination", &self.reply_destination)
            .field("reply_destination_name", &self.reply_destination_name)
            .field("pub_sub_domain", &self.pub_sub_domain)
            .field("timeout", &self.timeout)
            .field("wait_strategy", &self.wait_strategy)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SyncEndpointConfig`].
///
/// Timeouts are given in signed milliseconds: `-1` waits indefinitely, `0`
/// does not wait. The polling interval only applies when the wait strategy is
/// polling, which is the case as soon as an interval is set.
///
/// # Examples
///
/// ```
/// use replyframe::{destination::Destination, endpoint::SyncEndpointConfig};
///
/// let config = SyncEndpointConfig::builder("orders-client")
///     .destination(Destination::queue("orders"))
///     .reply_destination_name("orders.replies")
///     .timeout_millis(2_000)
///     .build()
///     .expect("valid configuration");
/// assert_eq!(config.reply_destination_name(), Some("orders.replies"));
///
/// assert!(
///     SyncEndpointConfig::builder("bad")
///         .timeout_millis(-5)
///         .build()
///         .is_err()
/// );
/// ```
#[derive(Clone)]
pub struct SyncEndpointConfigBuilder {
    name: String,
    destination: Option<Destination>,
    destination_name: Option<String>,
    reply_destination: Option<Destination>,
    reply_destination_name: Option<String>,
    pub_sub_domain: bool,
    timeout_millis: i64,
    polling_interval: Option<Duration>,
    correlator: Arc<dyn Correlator>,
}

impl SyncEndpointConfigBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            destination: None,
            destination_name: None,
            reply_destination: None,
            reply_destination_name: None,
            pub_sub_domain: false,
            timeout_millis: DEFAULT_TIMEOUT_MILLIS,
            polling_interval: None,
            correlator: Arc::new(DefaultCorrelator::default()),
        }
    }

    /// Destination requests are sent to (producer) or received from (consumer).
    #[must_use]
    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Destination name resolved at send or receive time.
    #[must_use]
    pub fn destination_name(mut self, name: impl Into<String>) -> Self {
        self.destination_name = Some(name.into());
        self
    }

    /// Fixed reply destination shared by every exchange.
    #[must_use]
    pub fn reply_destination(mut self, destination: Destination) -> Self {
        self.reply_destination = Some(destination);
        self
    }

    /// Reply destination name resolved at send time.
    #[must_use]
    pub fn reply_destination_name(mut self, name: impl Into<String>) -> Self {
        self.reply_destination_name = Some(name.into());
        self
    }

    /// Use topics instead of queues for named and temporary destinations.
    #[must_use]
    pub fn pub_sub_domain(mut self, enabled: bool) -> Self {
        self.pub_sub_domain = enabled;
        self
    }

    /// Reply wait in signed milliseconds.
    #[must_use]
    pub fn timeout_millis(mut self, millis: i64) -> Self {
        self.timeout_millis = millis;
        self
    }

    /// Poll correlation stores every `interval` instead of parking on
    /// notifications. Defaults to 500 ms when polling is chosen without an
    /// explicit interval via [`Self::polling`].
    #[must_use]
    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = Some(interval);
        self
    }

    /// Poll correlation stores at the default interval.
    #[must_use]
    pub fn polling(self) -> Self { self.polling_interval(DEFAULT_POLLING_INTERVAL) }

    #[must_use]
    pub fn wait_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.polling_interval = match strategy {
            WaitStrategy::Notify => None,
            WaitStrategy::Poll(interval) => Some(interval),
        };
        self
    }

    #[must_use]
    pub fn correlator(mut self, correlator: Arc<dyn Correlator>) -> Self {
        self.correlator = correlator;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an empty name, an invalid timeout or a
    /// zero polling interval.
    pub fn build(self) -> Result<SyncEndpointConfig, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        let timeout = Timeout::from_millis(self.timeout_millis)?;
        let wait_strategy = match self.polling_interval {
            Some(interval) if interval.is_zero() => return Err(ConfigError::ZeroPollingInterval),
            Some(interval) => WaitStrategy::Poll(interval),
            None => WaitStrategy::Notify,
        };
        Ok(SyncEndpointConfig {
            name: self.name,
            destination: self.destination,
            destination_name: self.destination_name,
            reply_destination: self.reply_destination,
            reply_destination_name: self.reply_destination_name,
            pub_sub_domain: self.pub_sub_domain,
            timeout,
            wait_strategy,
            correlator: self.correlator,
        })
    }
}
