//! HTTP client, network and cancellation errors.

use std::sync::Arc;

use thiserror::Error;

/// Errors from the transport layer.
///
/// These errors represent network-level failures, HTTP status errors,
/// cancellations and requests that could not be built.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// HTTP request failed due to network or protocol error.
    #[error("HTTP request failed: {0}")]
    Request(Arc<reqwest::Error>),

    /// Server returned a non-success HTTP status code.
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        /// The HTTP status code returned.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// Request exceeded the configured timeout.
    #[error("Request timeout after {duration_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        duration_ms: u64,
    },

    /// The request could not be built or the connection could not be made.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The request was canceled through its cancellation token.
    ///
    /// The message is exactly the reason handed to
    /// [`CancellationSource::cancel`](crate::CancellationSource::cancel).
    #[error("{reason}")]
    Canceled {
        /// The reason supplied by the canceller.
        reason: String,
    },
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(Arc::new(err))
    }
}

impl ClientError {
    /// Returns `true` if this error is retryable.
    ///
    /// Timeout and connection errors are typically retryable,
    /// while HTTP status errors depend on the status code.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection(_) => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            Self::Canceled { .. } => false,
        }
    }

    /// Returns `true` if the request was canceled by its token.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }

    /// Returns the HTTP status code if this is an HTTP status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
