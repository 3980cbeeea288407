//! Responding side of a synchronous exchange.
//!
//! A [`SyncConsumer`] receives requests, records each request's reply-to
//! under its correlation key, and later routes the responder's reply back to
//! that address.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::config::SyncEndpointConfig;
use crate::{
    correlation::{ReplyDestinationTracker, ReplyRoute, Scope},
    destination::Destination,
    error::{ExchangeError, Result},
    message::{Message, ReplyTo},
    selector::Selector,
    timeout::Timeout,
    transport::{DestinationResolver, MessageConverter, Transport},
};

/// Receives requests and sends correlated replies.
pub struct SyncConsumer<T, C> {
    config: SyncEndpointConfig,
    transport: Arc<T>,
    converter: C,
    tracker: ReplyDestinationTracker,
}

impl<T, C> SyncConsumer<T, C>
where
    T: Transport + DestinationResolver,
    C: MessageConverter<T::Raw>,
{
    #[must_use]
    pub fn new(config: SyncEndpointConfig, transport: Arc<T>, converter: C) -> Self {
        let tracker =
            ReplyDestinationTracker::new(Arc::clone(config.correlator()), config.wait_strategy());
        Self {
            config,
            transport,
            converter,
            tracker,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str { self.config.name() }

    #[must_use]
    pub fn tracker(&self) -> &ReplyDestinationTracker { &self.tracker }

    /// Receive the next request with the configured timeout.
    ///
    /// # Errors
    ///
    /// See [`Self::receive_selected`].
    pub async fn receive(&self, scope: &dyn Scope) -> Result<Message> {
        self.receive_selected(None, self.config.timeout(), scope).await
    }

    /// Receive the next request matching `selector` and register its reply-to.
    ///
    /// A request without a reply-to is still returned; it simply cannot be
    /// answered synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::ReceiveTimeout`] if nothing arrives within
    /// `timeout`, [`ExchangeError::DestinationNotSet`] without a configured
    /// destination, or transport and conversion failures.
    pub async fn receive_selected(
        &self,
        selector: Option<&Selector>,
        timeout: Timeout,
        scope: &dyn Scope,
    ) -> Result<Message> {
        let destination = self.source_destination().await?;
        let raw = self
            .transport
            .receive(&destination, selector, timeout)
            .await?
            .ok_or_else(|| ExchangeError::ReceiveTimeout {
                timeout,
                destination: destination.name().to_owned(),
            })?;
        let message = self.converter.from_raw(raw)?;
        info!(
            endpoint = self.name(),
            %destination,
            message_id = message.id(),
            "received message"
        );

        if let Err(e) = self.save_reply_destination(&message, scope).await {
            warn!(
                endpoint = self.name(),
                message_id = message.id(),
                error = %e,
                "unable to save reply destination"
            );
        }
        Ok(message)
    }

    /// Bind the correlation key of `request` in `scope` and store its reply-to.
    ///
    /// # Errors
    ///
    /// Returns correlator failures or a failure to resolve a reply-to given
    /// by name.
    pub async fn save_reply_destination(&self, request: &Message, scope: &dyn Scope) -> Result<()> {
        let key_name = self.tracker.correlation_key_for(self.name());
        let key = self.tracker.correlation_key(request)?;
        self.tracker.save_correlation_key_binding(&key_name, &key, scope);

        let destination = match request.get_reply_to() {
            Some(ReplyTo::Destination(destination)) => destination.clone(),
            Some(ReplyTo::Name(name)) => {
                self.transport
                    .resolve(name, self.config.destination_kind())
                    .await?
            }
            None => {
                warn!(
                    endpoint = self.name(),
                    message_id = request.id(),
                    "request carries no reply-to; it cannot be answered synchronously"
                );
                return Ok(());
            }
        };
        debug!(%key, reply_destination = %destination, "saving reply destination");
        self.tracker.save(
            key,
            ReplyRoute {
                destination,
                request_id: request.id().to_owned(),
            },
        );
        Ok(())
    }

    /// Send `reply` to the reply-to of the request last received in `scope`.
    ///
    /// The request id is stamped as the reply's correlation id unless the
    /// reply already carries one.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::CorrelationKeyNotFound`] if no request was
    /// received in `scope`, [`ExchangeError::ReplyDestinationNotFound`] if the
    /// request had no reply-to within the configured wait, or transport and
    /// conversion failures.
    pub async fn send(&self, mut reply: Message, scope: &dyn Scope) -> Result<()> {
        let key_name = self.tracker.correlation_key_for(self.name());
        let key = self.tracker.bound_correlation_key(&key_name, scope)?;
        let route = self.tracker.find(&key, self.config.timeout()).await?;

        if reply.correlation_id().is_none() {
            reply.set_correlation_id(route.request_id.as_str());
        }
        let raw = self.converter.to_raw(&reply)?;
        info!(
            endpoint = self.name(),
            destination = %route.destination,
            "sending reply message"
        );
        self.transport.send(&route.destination, raw).await?;
        Ok(())
    }

    async fn source_destination(&self) -> Result<Destination> {
        if let Some(destination) = self.config.destination() {
            return Ok(destination.clone());
        }
        match self.config.destination_name() {
            Some(name) => Ok(self
                .transport
                .resolve(name, self.config.destination_kind())
                .await?),
            None => Err(ExchangeError::DestinationNotSet),
        }
    }
}
