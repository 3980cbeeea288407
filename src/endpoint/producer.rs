//! Requesting side of a synchronous exchange.
//!
//! A [`SyncProducer`] sends a request with a reply-to attached and waits for
//! the reply on that destination. Temporary reply destinations get a
//! dedicated listener and are deleted once the exchange concludes; shared
//! destinations are filtered by the request id echoed in the reply's
//! correlation id, racing against replies deposited in the producer's reply
//! store under the same correlation key.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info};

use super::config::SyncEndpointConfig;
use crate::{
    correlation::{CorrelationKey, CorrelationStore, Scope},
    destination::{Destination, DestinationKind, ReplyAddress, TemporaryDestination},
    error::{ExchangeError, Result},
    message::{CORRELATION_ID, Message, REPLY_TO, ReplyTo},
    metrics::{self, ExchangeOutcome},
    selector::Selector,
    timeout::Timeout,
    transport::{DestinationAllocator, DestinationResolver, MessageConverter, Transport},
};

/// Scope variable recording the reply destination of the exchange bound
/// under `key_name`.
#[must_use]
pub fn reply_to_variable(key_name: &str) -> String { format!("{REPLY_TO}_{key_name}") }

/// Sends requests and waits for their correlated replies.
pub struct SyncProducer<T, C> {
    config: SyncEndpointConfig,
    transport: Arc<T>,
    converter: C,
    replies: CorrelationStore<Message>,
}

impl<T, C> SyncProducer<T, C>
where
    T: Transport + DestinationResolver + DestinationAllocator,
    C: MessageConverter<T::Raw>,
{
    #[must_use]
    pub fn new(config: SyncEndpointConfig, transport: Arc<T>, converter: C) -> Self {
        let replies = CorrelationStore::with_strategy(config.wait_strategy()).labelled("reply message");
        Self {
            config,
            transport,
            converter,
            replies,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str { self.config.name() }

    #[must_use]
    pub fn config(&self) -> &SyncEndpointConfig { &self.config }

    /// Replies stored by [`Self::send`], keyed by correlation key.
    #[must_use]
    pub fn reply_store(&self) -> &CorrelationStore<Message> { &self.replies }

    /// Send `message` and wait up to `deadline` for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::ReplyTimeout`] if no reply arrives in time,
    /// [`ExchangeError::DestinationAllocation`] if a temporary reply
    /// destination cannot be created, or transport and conversion failures.
    pub async fn send_and_receive(
        &self,
        message: Message,
        deadline: Timeout,
        scope: &dyn Scope,
    ) -> Result<Message> {
        self.exchange(message, deadline, scope)
            .await
            .map(|(_, reply)| reply)
    }

    /// Send `message`, wait for the reply with the configured timeout and keep
    /// it in the reply store for a later [`Self::receive`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::send_and_receive`].
    pub async fn send(&self, message: Message, scope: &dyn Scope) -> Result<()> {
        let (key, reply) = self.exchange(message, self.config.timeout(), scope).await?;
        self.replies.store(key, reply);
        Ok(())
    }

    /// Take the reply of the exchange last sent in `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::CorrelationKeyNotFound`] if nothing was sent in
    /// `scope`, or [`ExchangeError::ReplyTimeout`] if no reply is stored.
    pub async fn receive(&self, scope: &dyn Scope) -> Result<Message> {
        self.receive_with_timeout(scope, self.config.timeout()).await
    }

    /// [`Self::receive`] with an explicit timeout.
    ///
    /// # Errors
    ///
    /// Same as [`Self::receive`].
    pub async fn receive_with_timeout(&self, scope: &dyn Scope, timeout: Timeout) -> Result<Message> {
        let key_name = self.config.correlator().correlation_key_name(self.name());
        let key = self.replies.correlation_key(&key_name, scope)?;
        self.replies.find(&key, timeout).await.map_err(|_| {
            let reply_address = scope
                .variable(&reply_to_variable(&key_name))
                .unwrap_or_else(|| self.name().to_owned());
            ExchangeError::ReplyTimeout {
                deadline: timeout,
                reply_address,
                correlation_key: key.clone(),
            }
        })
    }

    async fn exchange(
        &self,
        mut message: Message,
        deadline: Timeout,
        scope: &dyn Scope,
    ) -> Result<(CorrelationKey, Message)> {
        let correlator = self.config.correlator();
        let key_name = correlator.correlation_key_name(self.name());
        let key = correlator.correlation_key(&message)?;
        self.replies.save_correlation_key(&key_name, &key, scope);

        let destination = self.send_destination().await?;
        let (reply_address, temporary) = self.reply_address(&message).await?;
        scope.set_variable(
            &reply_to_variable(&key_name),
            reply_address.destination().name().to_owned(),
        );

        let outcome = self
            .send_and_await(&mut message, &destination, &reply_address, &key, deadline)
            .await;
        if let Some(temporary) = temporary {
            temporary.delete().await;
        }

        metrics::inc_exchanges(match &outcome {
            Ok(_) => ExchangeOutcome::Replied,
            Err(e) if e.is_timeout() => ExchangeOutcome::TimedOut,
            Err(_) => ExchangeOutcome::Failed,
        });
        outcome.map(|reply| (key, reply))
    }

    async fn send_and_await(
        &self,
        message: &mut Message,
        destination: &Destination,
        reply_address: &ReplyAddress,
        key: &CorrelationKey,
        deadline: Timeout,
    ) -> Result<Message> {
        let reply_destination = reply_address.destination();
        message.set_reply_to(Some(ReplyTo::Destination(reply_destination.clone())));
        let raw = self.converter.to_raw(message)?;
        self.transport.send(destination, raw).await?;
        info!(
            endpoint = self.name(),
            %destination,
            "message was sent to destination"
        );
        debug!(
            %reply_destination,
            provenance = reply_address.provenance(),
            %deadline,
            "receiving reply message"
        );

        let started = Instant::now();
        let reply = if reply_address.is_dedicated() {
            self.transport.receive(reply_destination, None, deadline).await?
        } else {
            let selector = Selector::eq(CORRELATION_ID, message.id());
            tokio::select! {
                biased;
                stored = self.replies.find(key, deadline) => {
                    if let Ok(reply) = stored {
                        info!(%reply_destination, "reply message taken from reply store");
                        return Ok(reply);
                    }
                    None
                }
                received = self.transport.receive(reply_destination, Some(&selector), deadline) => received?,
            }
        };

        let Some(raw) = reply else {
            debug!(
                %reply_destination,
                waited_ms = started.elapsed().as_millis(),
                "no reply message before deadline"
            );
            return Err(ExchangeError::ReplyTimeout {
                deadline,
                reply_address: reply_destination.name().to_owned(),
                correlation_key: key.clone(),
            });
        };
        let reply = self.converter.from_raw(raw)?;
        info!(%reply_destination, "received reply message");
        Ok(reply)
    }

    async fn send_destination(&self) -> Result<Destination> {
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

    /// Choose the reply address: the message's own reply-to, then the fixed
    /// reply destination, then the named one, then a fresh temporary one.
    async fn reply_address(
        &self,
        message: &Message,
    ) -> Result<(ReplyAddress, Option<TemporaryDestination<T>>)> {
        let kind = self.config.destination_kind();
        let address = match (
            message.get_reply_to(),
            self.config.reply_destination(),
            self.config.reply_destination_name(),
        ) {
            (Some(ReplyTo::Destination(destination)), _, _) => {
                ReplyAddress::Embedded(destination.clone())
            }
            (Some(ReplyTo::Name(name)), _, _) => self.named_address(name, kind).await?,
            (None, Some(destination), _) => ReplyAddress::Fixed(destination.clone()),
            (None, None, Some(name)) => self.named_address(name, kind).await?,
            (None, None, None) => {
                let destination = self
                    .transport
                    .create_temporary(kind)
                    .await
                    .map_err(ExchangeError::DestinationAllocation)?;
                let guard = TemporaryDestination::new(Arc::clone(&self.transport), destination.clone());
                return Ok((ReplyAddress::Temporary(destination), Some(guard)));
            }
        };
        Ok((address, None))
    }

    async fn named_address(&self, name: &str, kind: DestinationKind) -> Result<ReplyAddress> {
        Ok(ReplyAddress::Named {
            name: name.to_owned(),
            destination: self.transport.resolve(name, kind).await?,
        })
    }
}
