use std::ops::ControlFlow;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use crate::Clock;
use crate::Config;
use crate::LimitError;
use crate::Permit;
use crate::RateLimiter;
use crate::Reason;
use crate::TokioClock;
use crate::permit::Issuer;
use crate::shutdown::Shutdown;

/// A window-based limiter that makes callers wait for the next window.
///
/// Divides time into fixed intervals starting at construction and grants at most
/// `limit` permits per interval. Like any fixed window it is susceptible to "boundary
/// bursts" where up to twice the limit is granted in a short period spanning two windows.
#[derive(Debug)]
pub struct FixedWindowRateLimiter<C = TokioClock> {
    limit: usize,
    interval: Duration,
    window: Mutex<Window>,
    issuer: Issuer,
    shutdown: Shutdown,
    clock: C,
}

#[derive(Debug)]
struct Window {
    start: Duration,
    count: usize,
}

impl Window {
    /// Moves the window forward by every whole interval that has elapsed.
    fn roll(&mut self, now: Duration, interval: Duration) -> bool {
        let elapsed = now.saturating_sub(self.start);
        if elapsed < interval {
            return false;
        }
        let skipped = elapsed.as_nanos() / interval.as_nanos();
        self.start += Duration::from_nanos((skipped * interval.as_nanos()) as u64);
        self.count = 0;
        true
    }
}

impl FixedWindowRateLimiter<TokioClock> {
    /// Creates a limiter from `config.limit` and `config.fixed_interval`.
    pub fn new(config: &Config) -> Result<Self, LimitError> {
        Self::with_clock(config, TokioClock::new())
    }
}

impl<C: Clock> FixedWindowRateLimiter<C> {
    pub fn with_clock(config: &Config, clock: C) -> Result<Self, LimitError> {
        let limit = config.limit()?.get();
        let interval = config.fixed_interval()?;
        debug!(limit, ?interval, "created fixed window rate limiter");

        Ok(Self {
            limit,
            interval,
            window: Mutex::new(Window {
                start: clock.now(),
                count: 0,
            }),
            issuer: Issuer::new(),
            shutdown: Shutdown::default(),
            clock,
        })
    }

    /// Permits still available in the current window.
    pub fn remaining(&self) -> usize {
        let now = self.clock.now();
        let mut window = self.window.lock();
        window.roll(now, self.interval);
        self.limit - window.count
    }

    /// Takes a slot in the window containing `now`, or returns when the next window starts.
    fn claim(&self, now: Duration) -> Result<Permit, Duration> {
        let mut window = self.window.lock();
        if window.roll(now, self.interval) {
            debug!(window_start = ?window.start, "fixed window rolled over");
        }

        if window.count < self.limit {
            window.count += 1;
            debug_assert!(window.count <= self.limit);
            let permit = self.issuer.issue(now, None);
            trace!(id = permit.id(), count = window.count, "fixed window permit granted");
            Ok(permit)
        } else {
            Err(window.start + self.interval)
        }
    }
}

impl<C: Clock> RateLimiter for FixedWindowRateLimiter<C> {
    fn try_acquire(&self) -> ControlFlow<Reason, Permit> {
        if self.shutdown.is_closed() {
            return ControlFlow::Break(Reason::Closed);
        }

        let now = self.clock.now();
        match self.claim(now) {
            Ok(permit) => ControlFlow::Continue(permit),
            Err(rollover) => ControlFlow::Break(Reason::Overloaded {
                retry_after: rollover.saturating_sub(now),
            }),
        }
    }

    fn acquire_until<'a>(
        &'a self,
        mut cancel: BoxFuture<'a, ()>,
    ) -> BoxFuture<'a, Result<Permit, LimitError>> {
        Box::pin(async move {
            loop {
                if self.shutdown.is_closed() {
                    return Err(LimitError::Closed);
                }

                match self.claim(self.clock.now()) {
                    Ok(permit) => return Ok(permit),
                    Err(rollover) => {
                        trace!(?rollover, "fixed window full, waiting for rollover");
                        self.shutdown
                            .wait(self.clock.sleep_until(rollover), &mut cancel)
                            .await?;
                    }
                }
            }
        })
    }

    fn close(&self) {
        if self.shutdown.close() {
            debug!("fixed window rate limiter closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.shutdown.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use more_asserts::assert_ge;
    use more_asserts::assert_lt;

    use super::*;
    use crate::QuantaClock;

    fn config(limit: usize, interval: Duration) -> Config {
        Config::new()
            .with_limit(limit)
            .with_fixed_interval(interval)
    }

    #[test]
    fn a_full_window_reports_when_it_rolls_over() {
        let (clock, mock) = quanta::Clock::mock();
        let rl = FixedWindowRateLimiter::with_clock(
            &config(1, Duration::from_secs(10)),
            QuantaClock::from(clock),
        )
        .unwrap();

        mock.increment(Duration::from_secs(3));
        assert!(rl.claim(rl.clock.now()).is_ok());
        assert_eq!(rl.claim(rl.clock.now()).unwrap_err(), Duration::from_secs(10));

        // Idle across a boundary; the window stays aligned to the interval.
        mock.increment(Duration::from_secs(12));
        assert!(rl.claim(rl.clock.now()).is_ok());
        assert_eq!(rl.claim(rl.clock.now()).unwrap_err(), Duration::from_secs(20));
    }

    #[test]
    fn it_enforces_limits() {
        let (clock, mock) = quanta::Clock::mock();
        let rl = FixedWindowRateLimiter::with_clock(
            &config(2, Duration::from_millis(10)),
            QuantaClock::from(clock),
        )
        .unwrap();

        assert!(rl.try_acquire().is_continue());
        assert!(rl.try_acquire().is_continue());
        assert_eq!(
            rl.try_acquire(),
            ControlFlow::Break(Reason::Overloaded {
                retry_after: Duration::from_millis(10)
            })
        );

        mock.increment(Duration::from_millis(4));
        assert_eq!(
            rl.try_acquire(),
            ControlFlow::Break(Reason::Overloaded {
                retry_after: Duration::from_millis(6)
            })
        );

        mock.increment(Duration::from_millis(6));
        assert!(rl.try_acquire().is_continue());
        assert_eq!(rl.remaining(), 1);
    }

    #[test]
    fn test_idle_reset_drift() {
        let (clock, mock) = quanta::Clock::mock();
        let interval = Duration::from_millis(10);
        let rl =
            FixedWindowRateLimiter::with_clock(&config(1, interval), QuantaClock::from(clock))
                .unwrap();

        // Use the first permit
        assert!(rl.try_acquire().is_continue());

        // Idle for 5.5 intervals
        mock.increment(interval * 11 / 2);

        assert!(rl.try_acquire().is_continue());

        // The window moved by whole intervals, so it is half way through already.
        let window_start = rl.window.lock().start;
        assert_eq!(window_start, interval * 5);
        assert_eq!(
            rl.try_acquire(),
            ControlFlow::Break(Reason::Overloaded {
                retry_after: interval / 2
            })
        );
    }

    #[tokio::test]
    async fn test_actual_concurrency() {
        let capacity = 100;
        let rl = Arc::new(
            FixedWindowRateLimiter::new(&config(capacity, Duration::from_secs(60))).unwrap(),
        );

        let mut handles = vec![];

        for _ in 0..capacity + 10 {
            let rl_clone = Arc::clone(&rl);
            handles.push(tokio::spawn(async move { rl_clone.try_acquire() }));
        }

        let results = futures::future::join_all(handles).await;
        let success_count = results
            .into_iter()
            .filter(|r| matches!(r, Ok(ControlFlow::Continue(_))))
            .count();

        // Even with multiple tasks, exactly 'capacity' should pass
        assert_eq!(success_count, capacity);
    }

    #[tokio::test]
    async fn excess_callers_complete_in_the_next_window() {
        tokio::time::pause();
        let interval = Duration::from_secs(15);
        let rl = Arc::new(FixedWindowRateLimiter::new(&config(5, interval)).unwrap());
        let start = tokio::time::Instant::now();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let rl = rl.clone();
                tokio::spawn(async move {
                    rl.acquire().await.unwrap();
                    start.elapsed()
                })
            })
            .collect();

        let mut elapsed: Vec<Duration> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        elapsed.sort();

        for immediate in &elapsed[..5] {
            assert_eq!(*immediate, Duration::ZERO);
        }
        for delayed in &elapsed[5..] {
            assert_ge!(*delayed, interval);
            assert_lt!(*delayed, interval + Duration::from_millis(10));
        }
        assert_eq!(rl.remaining(), 0);
    }

    #[tokio::test]
    async fn cancelled_acquire_does_not_consume_a_slot() {
        tokio::time::pause();
        let interval = Duration::from_secs(10);
        let rl = FixedWindowRateLimiter::new(&config(1, interval)).unwrap();

        rl.acquire().await.unwrap();
        assert_eq!(
            rl.acquire_timeout(Duration::from_secs(1)).await,
            Err(LimitError::Cancelled)
        );

        tokio::time::advance(interval).await;
        assert_eq!(rl.remaining(), 1);
        assert!(rl.try_acquire().is_continue());
    }

    #[tokio::test]
    async fn close_releases_blocked_callers() {
        tokio::time::pause();
        let rl = Arc::new(
            FixedWindowRateLimiter::new(&config(1, Duration::from_secs(60))).unwrap(),
        );
        rl.acquire().await.unwrap();

        let blocked = {
            let rl = rl.clone();
            tokio::spawn(async move { rl.acquire().await })
        };
        tokio::task::yield_now().await;

        rl.close();
        assert_eq!(blocked.await.unwrap(), Err(LimitError::Closed));
        assert_eq!(rl.try_acquire(), ControlFlow::Break(Reason::Closed));
        assert!(rl.is_closed());
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let err = FixedWindowRateLimiter::new(&config(0, Duration::from_secs(1))).unwrap_err();
        assert!(matches!(err, LimitError::InvalidConfig { field: "limit", .. }));

        let err = FixedWindowRateLimiter::new(&config(1, Duration::ZERO)).unwrap_err();
        assert!(matches!(
            err,
            LimitError::InvalidConfig {
                field: "fixed_interval",
                ..
            }
        ));
    }
}
