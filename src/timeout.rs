//! Deadlines accepted by every blocking operation in the crate.
//!
//! Callers historically express waits as signed milliseconds where `-1`
//! means "wait forever" and `0` means "do not wait at all". [`Timeout`] keeps
//! those meanings explicit so the waiting code never has to reinterpret a raw
//! integer.

use std::{fmt, time::Duration};

use tokio::time::Instant;

use crate::error::ConfigError;

/// Sentinel accepted by [`Timeout::from_millis`] for an unbounded wait.
pub const INDEFINITE_MILLIS: i64 = -1;

/// How long a blocking operation may wait before giving up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Wait until a value arrives, however long that takes.
    Indefinite,
    /// Only succeed if a value is already available.
    Immediate,
    /// Wait at most the given duration.
    After(Duration),
}

impl Timeout {
    /// Parse a signed millisecond count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTimeout`] for negative values other than
    /// [`INDEFINITE_MILLIS`].
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use replyframe::timeout::Timeout;
    ///
    /// assert_eq!(Timeout::from_millis(-1).unwrap(), Timeout::Indefinite);
    /// assert_eq!(Timeout::from_millis(0).unwrap(), Timeout::Immediate);
    /// assert_eq!(
    ///     Timeout::from_millis(250).unwrap(),
    ///     Timeout::After(Duration::from_millis(250))
    /// );
    /// assert!(Timeout::from_millis(-7).is_err());
    /// ```
    pub fn from_millis(millis: i64) -> Result<Self, ConfigError> {
        match millis {
            INDEFINITE_MILLIS => Ok(Self::Indefinite),
            0 => Ok(Self::Immediate),
            m if m < 0 => Err(ConfigError::InvalidTimeout(m)),
            m => Ok(Self::After(Duration::from_millis(m.unsigned_abs()))),
        }
    }

    /// Bounded wait of `duration`; a zero duration is [`Timeout::Immediate`].
    #[must_use]
    pub fn after(duration: Duration) -> Self {
        if duration.is_zero() {
            Self::Immediate
        } else {
            Self::After(duration)
        }
    }

    /// Signed millisecond form, the inverse of [`Timeout::from_millis`].
    #[must_use]
    pub fn as_millis(&self) -> i64 {
        match self {
            Self::Indefinite => INDEFINITE_MILLIS,
            Self::Immediate => 0,
            Self::After(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Absolute deadline for a wait starting at `start`, or `None` when the
    /// wait is unbounded.
    ///
    /// A duration too large to add to `start` is treated as unbounded.
    #[must_use]
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        match self {
            Self::Indefinite => None,
            Self::Immediate => Some(start),
            Self::After(d) => start.checked_add(*d),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self { Self::after(duration) }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Indefinite => f.write_str("indefinite"),
            Self::Immediate => f.write_str("0ms"),
            Self::After(d) => write!(f, "{}ms", d.as_millis()),
        }
    }
}
