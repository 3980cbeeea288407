//! Core message representation exchanged by producers, consumers and bridges.
//!
//! A [`Message`] carries an identifier, string headers, an opaque payload and
//! an optional reply-to. Transports map it to and from their native form via
//! [`MessageConverter`](crate::transport::MessageConverter).

use std::collections::BTreeMap;

use bytes::Bytes;
use uuid::Uuid;

use crate::{destination::Destination, selector::SelectorSource};

/// Header holding the message identifier.
pub const MESSAGE_ID: &str = "message_id";
/// Header holding the identifier of the request a reply answers.
pub const CORRELATION_ID: &str = "correlation_id";
/// Header used when a reply-to is carried by name.
pub const REPLY_TO: &str = "reply_to";

/// Where the sender of a message expects its reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyTo {
    /// A concrete transport destination.
    Destination(Destination),
    /// A destination name still to be resolved by the transport.
    Name(String),
}

impl ReplyTo {
    /// Human-readable name for logs.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Destination(d) => d.name(),
            Self::Name(n) => n,
        }
    }
}

/// Ordered string headers.
pub type Headers = BTreeMap<String, String>;

/// A message as seen by the exchange core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    id: String,
    headers: Headers,
    payload: Bytes,
    reply_to: Option<ReplyTo>,
}

impl Message {
    /// Create a message with a fresh identifier.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), payload)
    }

    /// Create a message with an explicit identifier.
    #[must_use]
    pub fn with_id(id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            headers: Headers::new(),
            payload: payload.into(),
            reply_to: None,
        }
    }

    /// Add a header, replacing any previous value.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Attach a reply-to.
    #[must_use]
    pub fn reply_to(mut self, reply_to: ReplyTo) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    /// Message identifier.
    #[must_use]
    pub fn id(&self) -> &str { &self.id }

    /// Value of header `name`, if present.
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Set header `name`.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Remove header `name`, returning its value.
    pub fn remove_header(&mut self, name: &str) -> Option<String> { self.headers.remove(name) }

    /// All headers.
    #[must_use]
    pub fn headers(&self) -> &Headers { &self.headers }

    /// Identifier of the request this message answers.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> { self.get_header(CORRELATION_ID) }

    /// Stamp the identifier of the request this message answers.
    pub fn set_correlation_id(&mut self, id: impl Into<String>) {
        self.set_header(CORRELATION_ID, id);
    }

    /// Reply-to carried by the message.
    #[must_use]
    pub fn get_reply_to(&self) -> Option<&ReplyTo> { self.reply_to.as_ref() }

    /// Replace the reply-to.
    pub fn set_reply_to(&mut self, reply_to: Option<ReplyTo>) { self.reply_to = reply_to; }

    /// Raw payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Payload as UTF-8 text, if valid.
    #[must_use]
    pub fn payload_str(&self) -> Option<&str> { std::str::from_utf8(&self.payload).ok() }
}

impl SelectorSource for Message {
    fn selector_value(&self, key: &str) -> Option<&str> {
        match key {
            MESSAGE_ID => Some(self.id()),
            REPLY_TO => self.reply_to.as_ref().map(ReplyTo::name),
            other => self.get_header(other),
        }
    }
}
