use std::collections::HashMap;
use std::ops::ControlFlow;
use std::time::Duration;

use futures::FutureExt;
use futures::future;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Notify;
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

/// Caps the number of outstanding leases.
///
/// A lease is held from a successful acquisition until it is released, or until
/// `token_resets_after` has elapsed, whichever comes first. Expired leases are reclaimed
/// lazily whenever the limiter is called, and blocked callers wake up when the oldest
/// lease is due to expire, so no background sweeper is needed.
///
/// Blocked callers are woken one per release in arrival order, but a new caller may take
/// a freed slot before the woken one gets to it.
#[derive(Debug)]
pub struct MaxConcurrencyRateLimiter<C = TokioClock> {
    limit: usize,
    resets_after: Duration,
    /// Lease id -> acquisition time.
    leases: Mutex<HashMap<u64, Duration>>,
    released: Notify,
    issuer: Issuer,
    shutdown: Shutdown,
    clock: C,
}

impl MaxConcurrencyRateLimiter<TokioClock> {
    /// Creates a limiter from `config.limit` and `config.token_resets_after`.
    pub fn new(config: &Config) -> Result<Self, LimitError> {
        Self::with_clock(config, TokioClock::new())
    }
}

impl<C: Clock> MaxConcurrencyRateLimiter<C> {
    pub fn with_clock(config: &Config, clock: C) -> Result<Self, LimitError> {
        let limit = config.limit()?.get();
        let resets_after = config.token_resets_after()?;
        debug!(limit, ?resets_after, "created max concurrency rate limiter");

        Ok(Self {
            limit,
            resets_after,
            leases: Mutex::new(HashMap::new()),
            released: Notify::new(),
            issuer: Issuer::new(),
            shutdown: Shutdown::default(),
            clock,
        })
    }

    /// Leases currently held, after reclaiming expired ones.
    pub fn active(&self) -> usize {
        let now = self.clock.now();
        let mut leases = self.leases.lock();
        self.reclaim(&mut leases, now);
        leases.len()
    }

    /// Takes a lease at `now`, or returns when the oldest lease expires.
    fn claim(&self, now: Duration) -> Result<Permit, Duration> {
        let mut leases = self.leases.lock();
        self.reclaim(&mut leases, now);

        if leases.len() < self.limit {
            let permit = self.issuer.issue(now, Some(now + self.resets_after));
            leases.insert(permit.id(), now);
            debug_assert!(leases.len() <= self.limit);
            trace!(id = permit.id(), active = leases.len(), "lease granted");
            return Ok(permit);
        }

        // Full, so there is at least one lease and an oldest one.
        let oldest = leases.values().min().copied().unwrap_or(now);
        Err(oldest + self.resets_after)
    }

    /// Drops every lease whose lifetime has run out and wakes waiters if any were dropped.
    fn reclaim(&self, leases: &mut HashMap<u64, Duration>, now: Duration) {
        let before = leases.len();
        leases.retain(|id, acquired_at| {
            let live = now.saturating_sub(*acquired_at) < self.resets_after;
            if !live {
                debug!(id = *id, ?acquired_at, "reclaiming expired lease");
            }
            live
        });
        if leases.len() < before {
            self.released.notify_waiters();
        }
    }
}

impl<C: Clock> RateLimiter for MaxConcurrencyRateLimiter<C> {
    fn try_acquire(&self) -> ControlFlow<Reason, Permit> {
        if self.shutdown.is_closed() {
            return ControlFlow::Break(Reason::Closed);
        }

        let now = self.clock.now();
        match self.claim(now) {
            Ok(permit) => ControlFlow::Continue(permit),
            Err(expiry) => ControlFlow::Break(Reason::Overloaded {
                retry_after: expiry.saturating_sub(now),
            }),
        }
    }

    fn acquire_until<'a>(
        &'a self,
        mut cancel: BoxFuture<'a, ()>,
    ) -> BoxFuture<'a, Result<Permit, LimitError>> {
        Box::pin(async move {
            loop {
                // Register interest before checking so a release in between is not missed.
                let released = self.released.notified();
                tokio::pin!(released);
                released.as_mut().enable();

                if self.shutdown.is_closed() {
                    return Err(LimitError::Closed);
                }

                match self.claim(self.clock.now()) {
                    Ok(permit) => return Ok(permit),
                    Err(expiry) => {
                        trace!(?expiry, "all leases taken, waiting");
                        let expired = self.clock.sleep_until(expiry);
                        let wake = future::select(released, expired).map(drop);
                        self.shutdown.wait(wake, &mut cancel).await?;
                    }
                }
            }
        })
    }

    fn release(&self, permit: &Permit) -> bool {
        let now = self.clock.now();
        let mut leases = self.leases.lock();
        self.reclaim(&mut leases, now);

        let held = self.issuer.issued(permit)
            && leases.get(&permit.id()) == Some(&permit.acquired_at());
        if held {
            leases.remove(&permit.id());
            trace!(id = permit.id(), active = leases.len(), "lease released");
            self.released.notify_one();
        } else {
            debug!(id = permit.id(), "ignoring release of inactive lease");
        }
        held
    }

    fn close(&self) {
        if self.shutdown.close() {
            debug!("max concurrency rate limiter closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.shutdown.is_closed()
    }
}
