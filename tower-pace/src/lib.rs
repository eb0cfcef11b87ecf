//! # Tower Pace
//!
//! `tower-pace` puts a [`pace_limit::RateLimiter`] in front of a
//! [Tower](https://github.com/tower-rs/tower) service.
//!
//! [`RateLimitService`] waits for a permit in `poll_ready`, so backpressure flows to the
//! caller the way Tower expects. The permit is handed back to the limiter once the
//! response future completes or is dropped, which is what makes a
//! [`pace_limit::MaxConcurrencyRateLimiter`] bound in-flight requests.
//!
//! An optional timeout bounds the wait for a permit; exceeding it fails with
//! [`PaceError::Timeout`] without consuming any capacity.

mod error;
mod layer;
mod service;


pub use error::PaceError;
pub use layer::RateLimitLayer;
pub use service::RateLimitService;
pub use service::ResponseFuture;
