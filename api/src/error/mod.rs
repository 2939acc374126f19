//! Layered error types for the api-module crate.
//!
//! - [`ApiError`] - Top-level error surfaced by every endpoint call
//! - [`ClientError`] - Transport, network and cancellation errors
//! - [`ConfigError`] - Metadata, options and configuration errors

mod api_error;
mod client_error;
mod config_error;

pub use api_error::ApiError;
pub use client_error::ClientError;
pub use config_error::ConfigError;
pub(crate) use config_error::json_kind;
