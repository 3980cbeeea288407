//! Correlation keys and the strategies that derive them.
//!
//! A [`Correlator`] turns an endpoint name into the scope variable under which
//! an exchange records its key, and turns a message into the key itself. The
//! key is persisted in the exchange's [`Scope`] so the request and reply legs
//! of one interaction can recompute it without a side channel.

use std::{fmt, sync::Arc};

use dashmap::DashMap;

use crate::{
    error::ExchangeError,
    message::{MESSAGE_ID, Message},
    selector::{SelectorSource, quote},
};

pub mod store;
pub mod tracker;

pub use store::{CorrelationStore, CorrelationTimeout, WaitStrategy};
pub use tracker::{ReplyDestinationTracker, ReplyRoute};

/// Opaque key identifying one in-flight exchange.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self { Self(key.into()) }

    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for CorrelationKey {
    fn from(value: &str) -> Self { Self(value.to_owned()) }
}

impl From<String> for CorrelationKey {
    fn from(value: String) -> Self { Self(value) }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Pluggable correlation-key derivation.
pub trait Correlator: Send + Sync + 'static {
    /// Scope variable name under which `endpoint` stores its current key.
    fn correlation_key_name(&self, endpoint: &str) -> String;

    /// Derive the key for `message`.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::MissingCorrelationField`] if the message lacks
    /// the field the key is derived from.
    fn correlation_key(&self, message: &Message) -> Result<CorrelationKey, ExchangeError>;
}

/// Prefix of [`DefaultCorrelator`] key names.
pub const DEFAULT_CORRELATOR_NAME: &str = "message_correlator";

/// Derives keys as the selector `<field> = '<value>'` over one message field.
///
/// # Examples
///
/// ```
/// use replyframe::{
///     correlation::{Correlator, DefaultCorrelator},
///     message::Message,
/// };
///
/// let correlator = DefaultCorrelator::default();
/// assert_eq!(
///     correlator.correlation_key_name("orders"),
///     "message_correlator:orders"
/// );
/// let key = correlator
///     .correlation_key(&Message::with_id("42", "hi"))
///     .unwrap();
/// assert_eq!(key.as_str(), "message_id = '42'");
/// ```
#[derive(Clone, Debug)]
pub struct DefaultCorrelator {
    name: String,
    field: String,
}

impl Default for DefaultCorrelator {
    fn default() -> Self {
        Self {
            name: DEFAULT_CORRELATOR_NAME.to_owned(),
            field: MESSAGE_ID.to_owned(),
        }
    }
}

impl DefaultCorrelator {
    /// Correlate on header `field` instead of the message id.
    #[must_use]
    pub fn on_field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }

    /// Override the key-name prefix.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Key for a raw field value, as produced by [`Correlator::correlation_key`].
    #[must_use]
    pub fn key_for_value(&self, value: &str) -> CorrelationKey {
        CorrelationKey(format!("{} = {}", self.field, quote(value)))
    }
}

impl Correlator for DefaultCorrelator {
    fn correlation_key_name(&self, endpoint: &str) -> String { format!("{}:{endpoint}", self.name) }

    fn correlation_key(&self, message: &Message) -> Result<CorrelationKey, ExchangeError> {
        message
            .selector_value(&self.field)
            .map(|value| self.key_for_value(value))
            .ok_or_else(|| ExchangeError::MissingCorrelationField {
                field: self.field.clone(),
            })
    }
}

/// Variable storage of the calling exchange.
pub trait Scope: Send + Sync {
    fn set_variable(&self, name: &str, value: String);

    fn variable(&self, name: &str) -> Option<String>;
}

/// Concurrent in-memory [`Scope`]; clones share the same variables.
#[derive(Clone, Debug, Default)]
pub struct ExchangeScope(Arc<DashMap<String, String>>);

impl ExchangeScope {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Drop every variable, ending the logical unit the scope belongs to.
    pub fn clear(&self) { self.0.clear(); }
}

impl Scope for ExchangeScope {
    fn set_variable(&self, name: &str, value: String) { self.0.insert(name.to_owned(), value); }

    fn variable(&self, name: &str) -> Option<String> {
        self.0.get(name).map(|entry| entry.value().clone())
    }
}
