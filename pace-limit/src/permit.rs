use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

static NEXT_ISSUER: AtomicU64 = AtomicU64::new(0);

/// Proof of a successful acquisition.
///
/// Times are offsets from the origin of the limiter's [`Clock`](crate::Clock).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permit {
    issuer: u64,
    id: u64,
    acquired_at: Duration,
    expires_at: Option<Duration>,
}

impl Permit {
    /// Identifier, unique within the limiter that issued it.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When the permit was granted.
    pub fn acquired_at(&self) -> Duration {
        self.acquired_at
    }

    /// When a lease is forcibly reclaimed. Only leases from a
    /// [`MaxConcurrencyRateLimiter`](crate::MaxConcurrencyRateLimiter) expire.
    pub fn expires_at(&self) -> Option<Duration> {
        self.expires_at
    }
}

impl fmt::Display for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} @ {:?}", self.id, self.acquired_at)
    }
}

/// Numbers the permits of one limiter and recognises them when they come back.
#[derive(Debug)]
pub(crate) struct Issuer {
    token: u64,
    next_id: AtomicU64,
}

impl Issuer {
    pub(crate) fn new() -> Self {
        Self {
            token: NEXT_ISSUER.fetch_add(1, Ordering::Relaxed),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn issue(&self, acquired_at: Duration, expires_at: Option<Duration>) -> Permit {
        Permit {
            issuer: self.token,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            acquired_at,
            expires_at,
        }
    }

    /// Whether `permit` came from this issuer.
    pub(crate) fn issued(&self, permit: &Permit) -> bool {
        permit.issuer == self.token
    }
}
