//! Metadata, options and module configuration errors.

use thiserror::Error;

/// Errors in endpoint metadata or module configuration.
///
/// Metadata errors are raised while an [`ApiModule`](crate::ApiModule) is
/// being constructed and abort the construction. Options errors are raised at
/// call time and are only logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A metadata entry is not a key-value object.
    #[error("Api metadata [{key}] is not an object")]
    NotAnObject {
        /// Name of the offending entry.
        key: String,
    },

    /// A metadata entry lacks a non-empty `method` or `url`.
    #[error("[ApiModule] Api metadata [{key}]: 'method' or 'url' value not found")]
    MissingMethodOrUrl {
        /// Name of the offending entry.
        key: String,
    },

    /// A metadata entry names an HTTP method that is not supported.
    #[error("[ApiModule] Api metadata [{key}]: unsupported method '{method}'")]
    InvalidMethod {
        /// Name of the offending entry.
        key: String,
        /// The method string found in the metadata.
        method: String,
    },

    /// The `metadatas` tree itself is not a key-value object.
    #[error("[ApiModule] metadatas must be an object, got {found}")]
    InvalidMetadataTree {
        /// JSON kind of the value found.
        found: &'static str,
    },

    /// Transport options were not a key-value object.
    #[error("the parameter `{value}` is not an object")]
    InvalidOptions {
        /// Rendering of the rejected value.
        value: String,
    },

    /// A configuration document could not be parsed.
    #[error("Invalid configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Creates an options error from the rejected JSON value.
    pub fn invalid_options(value: &serde_json::Value) -> Self {
        Self::InvalidOptions {
            value: value.to_string(),
        }
    }
}

/// Names the JSON kind of a value for error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
