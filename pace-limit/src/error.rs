/// Errors produced by limiter construction and acquisition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    /// A configuration field required by the chosen strategy is missing or not positive.
    ///
    /// Returned by constructors only; no limiter is produced.
    #[error("invalid config: `{field}` {reason}")]
    InvalidConfig {
        /// The offending [`Config`](crate::Config) field.
        field: &'static str,
        reason: &'static str,
    },

    /// The caller's deadline or cancellation signal fired before capacity became available.
    ///
    /// Nothing was consumed by the abandoned attempt.
    #[error("acquisition cancelled while waiting for capacity")]
    Cancelled,

    /// The limiter was closed.
    #[error("rate limiter is closed")]
    Closed,
}
