//! Error types for conversation state.

use thiserror::Error;

/// A result type using `TranscriptError`.
pub type Result<T> = std::result::Result<T, TranscriptError>;

/// Errors raised when an exchange is started or settled out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TranscriptError {
    /// The user message is empty after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// Another exchange has not been settled yet.
    #[error("an exchange is already in flight")]
    ExchangeInFlight,

    /// There is no exchange to complete or roll back.
    #[error("no exchange is in flight")]
    NoActiveExchange,
}
