//! Reply destinations recorded by responders, keyed by correlation key.

use std::sync::Arc;

use super::{CorrelationKey, CorrelationStore, Correlator, Scope, WaitStrategy};
use crate::{destination::Destination, error::ExchangeError, message::Message, timeout::Timeout};

/// Where, and on behalf of which request, a reply must be sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyRoute {
    /// Reply-to extracted from the request.
    pub destination: Destination,
    /// Identifier of the request, echoed as the reply's correlation id.
    pub request_id: String,
}

/// [`CorrelationStore`] of [`ReplyRoute`]s plus the correlator that names them.
///
/// Lookups distinguish two failures: the scope never bound a key
/// ([`ExchangeError::CorrelationKeyNotFound`]) and a key was bound but no
/// reply destination arrived ([`ExchangeError::ReplyDestinationNotFound`]).
pub struct ReplyDestinationTracker {
    routes: CorrelationStore<ReplyRoute>,
    correlator: Arc<dyn Correlator>,
}

impl ReplyDestinationTracker {
    #[must_use]
    pub fn new(correlator: Arc<dyn Correlator>, strategy: WaitStrategy) -> Self {
        Self {
            routes: CorrelationStore::with_strategy(strategy).labelled("reply destination"),
            correlator,
        }
    }

    /// Scope variable name holding the current key of `endpoint`.
    #[must_use]
    pub fn correlation_key_for(&self, endpoint: &str) -> String {
        self.correlator.correlation_key_name(endpoint)
    }

    /// Key derived from `message` by the configured correlator.
    ///
    /// # Errors
    ///
    /// Propagates [`Correlator::correlation_key`] failures.
    pub fn correlation_key(&self, message: &Message) -> Result<CorrelationKey, ExchangeError> {
        self.correlator.correlation_key(message)
    }

    /// Persist `key` under `name` in `scope`.
    pub fn save_correlation_key_binding(&self, name: &str, key: &CorrelationKey, scope: &dyn Scope) {
        self.routes.save_correlation_key(name, key, scope);
    }

    /// Key previously bound under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::CorrelationKeyNotFound`] if none was bound.
    pub fn bound_correlation_key(
        &self,
        name: &str,
        scope: &dyn Scope,
    ) -> Result<CorrelationKey, ExchangeError> {
        self.routes.correlation_key(name, scope)
    }

    pub fn save(&self, key: CorrelationKey, route: ReplyRoute) { self.routes.store(key, route); }

    /// Remove the route for `key`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::ReplyDestinationNotFound`] if none arrives.
    pub async fn find(&self, key: &CorrelationKey, timeout: Timeout) -> Result<ReplyRoute, ExchangeError> {
        self.routes
            .find(key, timeout)
            .await
            .map_err(|e| ExchangeError::ReplyDestinationNotFound {
                correlation_key: e.key,
            })
    }

    /// Underlying store, e.g. for clearing at a scope boundary.
    #[must_use]
    pub fn routes(&self) -> &CorrelationStore<ReplyRoute> { &self.routes }
}
