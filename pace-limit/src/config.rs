use std::num::NonZeroUsize;
use std::time::Duration;

use crate::LimitError;
use crate::Strategy;

/// Parameters for every strategy.
///
/// Each strategy reads only the fields it needs and ignores the rest:
///
/// | strategy          | required fields                 |
/// |-------------------|---------------------------------|
/// | fixed window      | `limit`, `fixed_interval`       |
/// | max concurrency   | `limit`, `token_resets_after`   |
/// | throttle          | `throttle`                      |
///
/// A zero value means "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Maximum acquisitions per window, or maximum outstanding leases.
    pub limit: usize,
    /// Length of a fixed window.
    pub fixed_interval: Duration,
    /// Lifetime of a lease before it is forcibly reclaimed.
    pub token_resets_after: Duration,
    /// Minimum spacing between successive acquisitions.
    pub throttle: Duration,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_fixed_interval(mut self, fixed_interval: Duration) -> Self {
        self.fixed_interval = fixed_interval;
        self
    }

    pub fn with_token_resets_after(mut self, token_resets_after: Duration) -> Self {
        self.token_resets_after = token_resets_after;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Checks that the fields `strategy` requires are set.
    pub fn validate(&self, strategy: Strategy) -> Result<(), LimitError> {
        match strategy {
            Strategy::FixedWindow => {
                self.limit()?;
                self.fixed_interval()?;
            }
            Strategy::MaxConcurrency => {
                self.limit()?;
                self.token_resets_after()?;
            }
            Strategy::Throttle => {
                self.throttle()?;
            }
        }
        Ok(())
    }

    pub(crate) fn limit(&self) -> Result<NonZeroUsize, LimitError> {
        NonZeroUsize::new(self.limit).ok_or(LimitError::InvalidConfig {
            field: "limit",
            reason: "must be greater than zero",
        })
    }

    pub(crate) fn fixed_interval(&self) -> Result<Duration, LimitError> {
        positive("fixed_interval", self.fixed_interval)
    }

    pub(crate) fn token_resets_after(&self) -> Result<Duration, LimitError> {
        positive("token_resets_after", self.token_resets_after)
    }

    pub(crate) fn throttle(&self) -> Result<Duration, LimitError> {
        positive("throttle", self.throttle)
    }
}

fn positive(field: &'static str, value: Duration) -> Result<Duration, LimitError> {
    if value.is_zero() {
        return Err(LimitError::InvalidConfig {
            field,
            reason: "must be a positive duration",
        });
    }
    // Limiters keep nanosecond offsets in a u64.
    if value.as_nanos() > u128::from(u64::MAX) {
        return Err(LimitError::InvalidConfig {
            field,
            reason: "is too large",
        });
    }
    Ok(value)
}
