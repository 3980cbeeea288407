//! Metric helpers for `replyframe`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the counter tracking concluded request/reply exchanges.
pub const EXCHANGES_TOTAL: &str = "replyframe_exchanges_total";
/// Name of the gauge tracking live temporary reply destinations.
pub const TEMPORARY_DESTINATIONS: &str = "replyframe_temporary_destinations";
/// Name of the counter tracking messages moved from a subscription into a
/// bridge's pending queue.
pub const BRIDGED_MESSAGES: &str = "replyframe_bridged_messages_total";

/// How a synchronous exchange concluded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// A reply was received.
    Replied,
    /// No reply arrived before the deadline.
    TimedOut,
    /// The exchange failed for any other reason.
    Failed,
}

impl ExchangeOutcome {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            ExchangeOutcome::Replied => "replied",
            ExchangeOutcome::TimedOut => "timed_out",
            ExchangeOutcome::Failed => "failed",
        }
    }
}

/// Record a concluded exchange.
pub fn inc_exchanges(outcome: ExchangeOutcome) {
    #[cfg(feature = "metrics")]
    counter!(EXCHANGES_TOTAL, "outcome" => outcome.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// Increment the temporary destinations gauge.
pub fn inc_temporary_destinations() {
    #[cfg(feature = "metrics")]
    gauge!(TEMPORARY_DESTINATIONS).increment(1.0);
}

/// Decrement the temporary destinations gauge.
pub fn dec_temporary_destinations() {
    #[cfg(feature = "metrics")]
    gauge!(TEMPORARY_DESTINATIONS).decrement(1.0);
}

/// Record a message bridged from `topic`.
pub fn inc_bridged(topic: &str) {
    #[cfg(feature = "metrics")]
    counter!(BRIDGED_MESSAGES, "topic" => topic.to_owned()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = topic;
}
