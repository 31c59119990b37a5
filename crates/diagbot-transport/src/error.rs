//! Transport error types.

use std::time::Duration;

use diagbot_core::traits::ErrorAction;
use thiserror::Error;

/// Errors that can occur when talking to a chat backend.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The backend returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The bot token was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The backend returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl TransportError {
    /// Returns `true` if retrying cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(self, TransportError::Unauthorized(_))
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            TransportError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }

    /// How a serve loop should react to this error.
    pub fn action(&self) -> ErrorAction {
        if self.is_permanent() {
            ErrorAction::Stop
        } else if let Some(ms) = self.retry_after_ms() {
            ErrorAction::RetryAfter(Duration::from_millis(ms))
        } else {
            ErrorAction::Retry
        }
    }
}

/// Classify an error from a transport call. Errors that are not a
/// [`TransportError`] are retried.
pub fn classify(error: &anyhow::Error) -> ErrorAction {
    error
        .downcast_ref::<TransportError>()
        .map_or(ErrorAction::Retry, TransportError::action)
}
