use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use futures::future::BoxFuture;
use pace_limit::LimitError;
use pace_limit::Permit;
use pace_limit::RateLimiter;
use pin_project_lite::pin_project;
use tower::BoxError;
use tower::Service;
use tracing::trace;

use crate::error::PaceError;

type Acquiring = BoxFuture<'static, Result<Permit, LimitError>>;

/// A granted permit, handed back to its limiter when dropped.
struct PermitGuard {
    permit: Permit,
    release: Option<Box<dyn FnOnce(&Permit) + Send + Sync>>,
}

impl PermitGuard {
    fn new<L>(limiter: Arc<L>, permit: Permit) -> Self
    where
        L: RateLimiter + ?Sized + 'static,
    {
        Self {
            permit,
            release: Some(Box::new(move |permit| {
                limiter.release(permit);
            })),
        }
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            trace!(permit = %self.permit, "returning permit");
            release(&self.permit);
        }
    }
}

impl fmt::Debug for PermitGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermitGuard")
            .field("permit", &self.permit)
            .finish_non_exhaustive()
    }
}

pin_project! {
    /// Drives the inner service future and returns the permit once it finishes.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        permit: Option<PermitGuard>,
    }
}

impl<F, T, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let output = std::task::ready!(this.inner.poll(cx));
        this.permit.take();
        Poll::Ready(output)
    }
}

impl<F> fmt::Debug for ResponseFuture<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("permit", &self.permit)
            .finish_non_exhaustive()
    }
}

/// Waits for a permit from the limiter before each request.
pub struct RateLimitService<L, S>
where
    L: ?Sized,
{
    inner: S,
    limiter: Arc<L>,
    acquiring: Option<Acquiring>,
    permit: Option<PermitGuard>,
    timeout: Option<Duration>,
}

impl<L, S> fmt::Debug for RateLimitService<L, S>
where
    L: fmt::Debug + ?Sized,
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitService")
            .field("inner", &self.inner)
            .field("limiter", &self.limiter)
            .field("acquiring", &self.acquiring.is_some())
            .field("permit", &self.permit)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// Manually implement Clone because an in-flight acquisition cannot be cloned
impl<L, S> Clone for RateLimitService<L, S>
where
    L: ?Sized,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            // The clone waits for its own permit
            acquiring: None,
            permit: None,
            timeout: self.timeout,
        }
    }
}

impl<L, S, Req> Service<Req> for RateLimitService<L, S>
where
    L: RateLimiter + ?Sized + 'static,
    S: Service<Req, Error = BoxError>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Check inner service readiness FIRST so capacity is not held by a busy service
        match self.inner.poll_ready(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {}
        }

        if self.permit.is_none() {
            let limiter = &self.limiter;
            let timeout = self.timeout;
            let acquiring = self
                .acquiring
                .get_or_insert_with(|| acquire(Arc::clone(limiter), timeout));

            let outcome = std::task::ready!(acquiring.as_mut().poll(cx));
            self.acquiring = None;
            match outcome {
                Ok(permit) => {
                    trace!(%permit, "permit acquired for request");
                    self.permit = Some(PermitGuard::new(Arc::clone(&self.limiter), permit));
                }
                Err(e) => return Poll::Ready(Err(PaceError::from(e).into())),
            }
        }

        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let permit = self.permit.take();
        debug_assert!(permit.is_some(), "poll_ready must be called before call");

        ResponseFuture {
            inner: self.inner.call(req),
            permit,
        }
    }
}

fn acquire<L>(limiter: Arc<L>, timeout: Option<Duration>) -> Acquiring
where
    L: RateLimiter + ?Sized + 'static,
{
    Box::pin(async move {
        match timeout {
            Some(timeout) => limiter.acquire_timeout(timeout).await,
            None => limiter.acquire().await,
        }
    })
}

impl<L, S> RateLimitService<L, S>
where
    L: ?Sized,
{
    pub fn new(inner: S, limiter: Arc<L>) -> Self {
        Self {
            inner,
            limiter,
            acquiring: None,
            permit: None,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
