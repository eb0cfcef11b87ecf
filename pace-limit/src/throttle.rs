use std::ops::ControlFlow;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::future::BoxFuture;
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

/// Sentinel for "no permit granted yet".
const NEVER: u64 = u64::MAX;

/// Spaces successive acquisitions at least `throttle` apart.
///
/// The only state is the time of the last grant, updated with a CAS loop. A caller
/// that had to wait is stamped with the instant it was scheduled for rather than the
/// instant it woke up, so the schedule does not drift with timer latency.
#[derive(Debug)]
pub struct ThrottleRateLimiter<C = TokioClock> {
    spacing_ns: u64,
    /// Nanoseconds since the clock origin of the last grant, or `NEVER`.
    last: AtomicU64,
    issuer: Issuer,
    shutdown: Shutdown,
    clock: C,
}

impl ThrottleRateLimiter<TokioClock> {
    /// Creates a limiter from `config.throttle`.
    pub fn new(config: &Config) -> Result<Self, LimitError> {
        Self::with_clock(config, TokioClock::new())
    }
}

impl<C: Clock> ThrottleRateLimiter<C> {
    pub fn with_clock(config: &Config, clock: C) -> Result<Self, LimitError> {
        let spacing = config.throttle()?;
        debug!(?spacing, "created throttle rate limiter");

        Ok(Self {
            spacing_ns: spacing.as_nanos() as u64,
            last: AtomicU64::new(NEVER),
            issuer: Issuer::new(),
            shutdown: Shutdown::default(),
            clock,
        })
    }

    /// Earliest time (since the clock origin) the next permit can be granted.
    pub fn next_available(&self) -> Duration {
        match self.last.load(Ordering::Acquire) {
            NEVER => Duration::ZERO,
            last => Duration::from_nanos(last.saturating_add(self.spacing_ns)),
        }
    }

    /// Claims the next slot at `now`.
    ///
    /// `waited_on` is the grant the caller slept behind. If that grant is still the
    /// latest, the caller takes the slot right after it. Returns the latest grant on
    /// refusal.
    fn claim(&self, now: u64, waited_on: Option<u64>) -> Result<u64, u64> {
        loop {
            let last = self.last.load(Ordering::Acquire);

            let granted = if last == NEVER {
                now
            } else {
                let next = last.saturating_add(self.spacing_ns);
                if now < next {
                    return Err(last);
                }
                if waited_on == Some(last) { next } else { now }
            };

            if self
                .last
                .compare_exchange_weak(last, granted, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(granted);
            }
        }
    }

    fn permit(&self, granted: u64) -> Permit {
        let permit = self.issuer.issue(Duration::from_nanos(granted), None);
        trace!(id = permit.id(), granted_ns = granted, "throttle permit granted");
        permit
    }

    fn now_ns(&self) -> u64 {
        self.clock.now().as_nanos() as u64
    }
}

impl<C: Clock> RateLimiter for ThrottleRateLimiter<C> {
    fn try_acquire(&self) -> ControlFlow<Reason, Permit> {
        if self.shutdown.is_closed() {
            return ControlFlow::Break(Reason::Closed);
        }

        let now = self.now_ns();
        match self.claim(now, None) {
            Ok(granted) => ControlFlow::Continue(self.permit(granted)),
            Err(last) => ControlFlow::Break(Reason::Overloaded {
                retry_after: Duration::from_nanos(last.saturating_add(self.spacing_ns) - now),
            }),
        }
    }

    fn acquire_until<'a>(
        &'a self,
        mut cancel: BoxFuture<'a, ()>,
    ) -> BoxFuture<'a, Result<Permit, LimitError>> {
        Box::pin(async move {
            let mut waited_on = None;
            loop {
                if self.shutdown.is_closed() {
                    return Err(LimitError::Closed);
                }

                match self.claim(self.now_ns(), waited_on) {
                    Ok(granted) => return Ok(self.permit(granted)),
                    Err(last) => {
                        let scheduled =
                            Duration::from_nanos(last.saturating_add(self.spacing_ns));
                        trace!(?scheduled, "throttled, waiting");
                        self.shutdown
                            .wait(self.clock.sleep_until(scheduled), &mut cancel)
                            .await?;
                        waited_on = Some(last);
                    }
                }
            }
        })
    }

    fn close(&self) {
        if self.shutdown.close() {
            debug!("throttle rate limiter closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.shutdown.is_closed()
    }
}
