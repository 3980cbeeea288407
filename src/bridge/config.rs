//! Settings for [`TopicBridge`](super::TopicBridge).

use std::time::Duration;

use crate::{destination::Destination, error::ConfigError};

/// Pause after a pull that returned nothing.
pub const DEFAULT_BRIDGE_POLLING_INTERVAL: Duration = Duration::from_millis(100);
/// Longest [`TopicBridge::stop`](super::TopicBridge::stop) waits for the loop
/// to exit.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Validated bridge settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    topic: Destination,
    durable_name: Option<String>,
    polling_interval: Duration,
    stop_grace: Duration,
}

impl BridgeConfig {
    /// Start building a configuration for a bridge on `topic`.
    #[must_use]
    pub fn builder(topic: Destination) -> BridgeConfigBuilder { BridgeConfigBuilder::new(topic) }

    #[must_use]
    pub fn topic(&self) -> &Destination { &self.topic }

    #[must_use]
    pub fn durable_name(&self) -> Option<&str> { self.durable_name.as_deref() }

    #[must_use]
    pub fn polling_interval(&self) -> Duration { self.polling_interval }

    #[must_use]
    pub fn stop_grace(&self) -> Duration { self.stop_grace }
}

/// Builder for [`BridgeConfig`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use replyframe::{bridge::BridgeConfig, destination::Destination};
///
/// let config = BridgeConfig::builder(Destination::topic("prices"))
///     .durable_name("pricing-feed")
///     .stop_grace(Duration::from_secs(1))
///     .build()
///     .expect("valid configuration");
/// assert_eq!(config.durable_name(), Some("pricing-feed"));
/// ```
#[derive(Clone, Debug)]
pub struct BridgeConfigBuilder {
    topic: Destination,
    durable_name: Option<String>,
    polling_interval: Duration,
    stop_grace: Duration,
}

impl BridgeConfigBuilder {
    fn new(topic: Destination) -> Self {
        Self {
            topic,
            durable_name: None,
            polling_interval: DEFAULT_BRIDGE_POLLING_INTERVAL,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Subscribe durably under `name`.
    #[must_use]
    pub fn durable_name(mut self, name: impl Into<String>) -> Self {
        self.durable_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    #[must_use]
    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyName`] for an unnamed topic or
    /// [`ConfigError::ZeroPollingInterval`] for a zero interval.
    pub fn build(self) -> Result<BridgeConfig, ConfigError> {
        if self.topic.name().trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.polling_interval.is_zero() {
            return Err(ConfigError::ZeroPollingInterval);
        }
        Ok(BridgeConfig {
            topic: self.topic,
            durable_name: self.durable_name,
            polling_interval: self.polling_interval,
            stop_grace: self.stop_grace,
        })
    }
}
