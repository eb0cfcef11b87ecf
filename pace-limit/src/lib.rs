//! # pace-limit
//!
//! `pace-limit` provides rate limiters that make callers *wait* for capacity instead of
//! rejecting them.
//!
//! ## Strategies
//!
//! * [`FixedWindowRateLimiter`]: at most `limit` acquisitions per fixed window.
//! * [`MaxConcurrencyRateLimiter`]: at most `limit` outstanding leases. Leases that are
//!   never released are reclaimed after `token_resets_after`.
//! * [`ThrottleRateLimiter`]: successive acquisitions are spaced at least `throttle` apart.
//!
//! All three implement [`RateLimiter`], so calling code can stay strategy-agnostic by
//! holding an `Arc<dyn RateLimiter>` (see [`build`]).
//!
//! ## Key Concepts
//!
//! * **Lazy Evaluation**: windows, lease expiry and spacing are recalculated at the moment
//!   of the request. There are no background worker threads or timers.
//! * **Interruptible Waits**: a blocked [`RateLimiter::acquire`] sleeps until capacity may
//!   be available and can be cut short by a deadline, an arbitrary cancellation future, or
//!   [`RateLimiter::close`]. An interrupted acquisition consumes nothing.
//! * **Substitutable Time**: every limiter reads time through a [`Clock`], so tests can run
//!   against paused tokio time or a mocked `quanta` clock.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use pace_limit::Config;
//! use pace_limit::MaxConcurrencyRateLimiter;
//! use pace_limit::RateLimiter;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), pace_limit::LimitError> {
//! let config = Config::new()
//!     .with_limit(4)
//!     .with_token_resets_after(Duration::from_secs(10));
//! let limiter = MaxConcurrencyRateLimiter::new(&config)?;
//!
//! let permit = limiter.acquire().await?;
//! // ... do the work ...
//! limiter.release(&permit);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::fmt::Debug;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use futures::future::BoxFuture;

mod clock;
mod config;
mod error;
mod fixed_window;
mod max_concurrency;
mod permit;
mod shutdown;
mod throttle;

pub use clock::Clock;
pub use clock::QuantaClock;
pub use clock::TokioClock;
pub use config::Config;
pub use error::LimitError;
pub use fixed_window::FixedWindowRateLimiter;
pub use max_concurrency::MaxConcurrencyRateLimiter;
pub use permit::Permit;
pub use throttle::ThrottleRateLimiter;

/// Reasons why a non-blocking acquisition might be refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// No capacity right now. Capacity may return after `retry_after`.
    Overloaded { retry_after: Duration },
    /// The limiter has been closed.
    Closed,
}

/// The contract shared by every strategy.
///
/// Limiters must be `Send` and `Sync` so they can be shared across tasks via `Arc`.
pub trait RateLimiter: Debug + Send + Sync {
    /// Attempts to acquire a permit without waiting.
    fn try_acquire(&self) -> ControlFlow<Reason, Permit>;

    /// Waits for a permit, giving up as soon as `cancel` resolves.
    ///
    /// # Errors
    ///
    /// * [`LimitError::Cancelled`] if `cancel` completes while the caller is blocked.
    /// * [`LimitError::Closed`] if the limiter is, or becomes, closed.
    fn acquire_until<'a>(
        &'a self,
        cancel: BoxFuture<'a, ()>,
    ) -> BoxFuture<'a, Result<Permit, LimitError>>;

    /// Returns a permit early.
    ///
    /// Only leases from a [`MaxConcurrencyRateLimiter`] occupy capacity, so the default is
    /// a no-op. Returns `true` when the permit was issued by this limiter and was still
    /// active.
    fn release(&self, _permit: &Permit) -> bool {
        false
    }

    /// Closes the limiter. Blocked and future acquisitions fail with [`LimitError::Closed`].
    fn close(&self);

    /// Whether [`RateLimiter::close`] has been called.
    fn is_closed(&self) -> bool;

    /// Waits for a permit with no deadline.
    fn acquire(&self) -> BoxFuture<'_, Result<Permit, LimitError>> {
        self.acquire_until(Box::pin(future::pending()))
    }

    /// Waits for a permit for at most `timeout`.
    fn acquire_timeout(&self, timeout: Duration) -> BoxFuture<'_, Result<Permit, LimitError>> {
        self.acquire_until(Box::pin(tokio::time::sleep(timeout)))
    }
}

/// The available limiting strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    FixedWindow,
    MaxConcurrency,
    Throttle,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::FixedWindow => "fixed-window",
            Strategy::MaxConcurrency => "max-concurrency",
            Strategy::Throttle => "throttle",
        };
        f.write_str(name)
    }
}

/// Builds a limiter for `strategy`, validating only the fields that strategy needs.
pub fn build(strategy: Strategy, config: &Config) -> Result<Arc<dyn RateLimiter>, LimitError> {
    Ok(match strategy {
        Strategy::FixedWindow => Arc::new(FixedWindowRateLimiter::new(config)?),
        Strategy::MaxConcurrency => Arc::new(MaxConcurrencyRateLimiter::new(config)?),
        Strategy::Throttle => Arc::new(ThrottleRateLimiter::new(config)?),
    })
}
