use std::fmt::Debug;
use std::time::Duration;

use futures::future::BoxFuture;

/// A source of time for limiters.
///
/// Time is expressed as the offset from a fixed origin captured when the clock is
/// created. Limiters only ever compare offsets from the same clock.
pub trait Clock: Debug + Send + Sync + 'static {
    /// Time elapsed since this clock's origin.
    fn now(&self) -> Duration;

    /// Resolves once [`Clock::now`] has reached `deadline`.
    fn sleep_until(&self, deadline: Duration) -> BoxFuture<'static, ()>;
}

/// A clock backed by `tokio::time`.
///
/// This is the default. It honours `tokio::time::pause` and `advance`, which makes
/// blocking behaviour deterministic in tests.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_until(&self, deadline: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep_until(self.origin + deadline))
    }
}

/// A clock backed by `quanta`.
///
/// Reading the time is cheap (TSC based where available). Waiting is delegated to the
/// tokio timer for whatever remains until the deadline, measured when the wait starts.
/// Build it from `quanta::Clock::mock()` to drive non-blocking calls by hand.
#[derive(Debug, Clone)]
pub struct QuantaClock {
    clock: quanta::Clock,
    origin: quanta::Instant,
}

impl QuantaClock {
    pub fn new() -> Self {
        Self::from(quanta::Clock::new())
    }
}

impl Default for QuantaClock {
    fn default() -> Self {
        Self::new()
    }
}

impl From<quanta::Clock> for QuantaClock {
    fn from(clock: quanta::Clock) -> Self {
        let origin = clock.now();
        Self { clock, origin }
    }
}

impl Clock for QuantaClock {
    fn now(&self) -> Duration {
        self.clock.now().duration_since(self.origin)
    }

    fn sleep_until(&self, deadline: Duration) -> BoxFuture<'static, ()> {
        let remaining = deadline.saturating_sub(self.now());
        Box::pin(tokio::time::sleep(remaining))
    }
}
