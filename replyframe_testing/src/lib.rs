//! Test utilities for `replyframe`.
//!
//! Provides log capture, assertion macros, a scripted topic feed and a
//! broker wrapper that counts and fails temporary destination operations.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use replyframe::destination::DestinationKind;
//! use replyframe::transport::DestinationAllocator;
//! use replyframe_testing::CountingBroker;
//!
//! # async fn example() {
//! let broker = Arc::new(CountingBroker::new());
//! let temp = broker.create_temporary(DestinationKind::Queue).await.unwrap();
//! broker.delete_temporary(&temp).await.unwrap();
//! assert_eq!(broker.deletions_of(&temp), 1);
//! # }
//! ```

mod broker;
mod feed;
pub mod logging;
mod macros;
pub mod metrics;

pub use broker::CountingBroker;
pub use feed::{FeedStep, ScriptedSubscriber, ScriptedSubscription};
pub use logging::{LoggerHandle, logger};
