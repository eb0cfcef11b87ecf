use pace_limit::LimitError;

/// Errors produced by the Tower Pace middleware.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaceError {
    /// The request gave up waiting for a permit.
    #[error("timed out waiting for rate limit capacity")]
    Timeout,

    /// The rate limiter was closed; no further requests will be admitted.
    #[error("rate limiter is closed")]
    Closed,

    /// The limiter failed in an unexpected way.
    ///
    /// The string contains the `Display` representation of the limiter error.
    #[error("rate limiter error: {0}")]
    Limiter(String),
}

impl From<LimitError> for PaceError {
    fn from(err: LimitError) -> Self {
        match err {
            LimitError::Cancelled => PaceError::Timeout,
            LimitError::Closed => PaceError::Closed,
            other => PaceError::Limiter(other.to_string()),
        }
    }
}
