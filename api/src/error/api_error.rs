//! Top-level API error type.

use std::sync::Arc;

use super::{ClientError, ConfigError};
use thiserror::Error;

/// Top-level error type for every api-module operation.
///
/// Middleware may reject a call with any value that converts into an
/// `ApiError`. Plain strings are wrapped into [`ApiError::Message`], JSON
/// values that are not strings pass through as [`ApiError::Payload`], and
/// arbitrary error types can be carried with [`ApiError::other`].
///
/// ## Examples
///
/// ```rust
/// use api_module::ApiError;
///
/// let err: ApiError = "token expired".into();
/// assert_eq!(err.to_string(), "token expired");
///
/// let err: ApiError = serde_json::json!({ "code": 500 }).into();
/// assert!(matches!(err, ApiError::Payload(_)));
/// ```
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Transport errors (network, status, timeout, cancellation).
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Metadata and configuration errors.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plain string error raised by middleware.
    #[error("{0}")]
    Message(String),

    /// A non-error value passed through unchanged (e.g. a rejected body).
    #[error("{0}")]
    Payload(serde_json::Value),

    /// An arbitrary caller-supplied error.
    #[error("{0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),

    /// The fallback hook removed every error from the context.
    ///
    /// Fallback is the error-terminal path, so the call still rejects.
    #[error("request failed and the fallback middleware cleared the error")]
    Cleared,
}

impl ApiError {
    /// Wraps an arbitrary error type.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Arc::new(err))
    }

    /// Returns `true` if the call was canceled through its token.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_canceled())
    }

    /// Returns the HTTP status code for transport status errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Client(e) => e.status_code(),
            _ => None,
        }
    }

    /// Returns the wrapped value for [`ApiError::Payload`].
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Payload(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for ApiError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

impl From<String> for ApiError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<serde_json::Value> for ApiError {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(message) => Self::Message(message),
            other => Self::Payload(other),
        }
    }
}
