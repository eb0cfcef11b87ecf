use std::sync::Arc;
use std::time::Duration;

use pace_limit::RateLimiter;
use tower::Layer;

use crate::service::RateLimitService;

/// Applies a rate limiter to requests.
///
/// Every service produced by one layer shares the same limiter.
#[derive(Debug)]
pub struct RateLimitLayer<L>
where
    L: ?Sized,
{
    limiter: Arc<L>,
    timeout: Option<Duration>,
}

impl<L> Clone for RateLimitLayer<L>
where
    L: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            timeout: self.timeout,
        }
    }
}

impl<L> RateLimitLayer<L>
where
    L: RateLimiter + ?Sized,
{
    /// Create a RateLimitLayer
    pub fn new(limiter: Arc<L>) -> Self {
        RateLimitLayer {
            limiter,
            timeout: None,
        }
    }

    /// Bound the time spent waiting for a permit.
    ///
    /// If no permit is granted within this duration, `poll_ready` fails with
    /// `PaceError::Timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<L, S> Layer<S> for RateLimitLayer<L>
where
    L: RateLimiter + ?Sized + 'static,
{
    type Service = RateLimitService<L, S>;

    fn layer(&self, service: S) -> Self::Service {
        let svc = RateLimitService::new(service, self.limiter.clone());
        match self.timeout {
            Some(timeout) => svc.with_timeout(timeout),
            None => svc,
        }
    }
}
