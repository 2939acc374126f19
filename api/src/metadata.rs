//! Endpoint metadata and the metadata tree supplied at module construction.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{json_kind, ConfigError};
use crate::method::RestMethod;

/// Static description of one callable HTTP operation.
///
/// ## Examples
///
/// ```rust
/// use api_module::{Metadata, RestMethod};
/// use serde_json::json;
///
/// let meta = Metadata::from_value("getUser", &json!({
///     "method": "get",
///     "url": "/users/:id",
///     "name": "Fetch one user",
///     "cache": false
/// })).unwrap();
///
/// assert_eq!(meta.method(), RestMethod::Get);
/// assert_eq!(meta.url(), "/users/:id");
/// assert_eq!(meta.extra().get("cache"), Some(&json!(false)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    method: RestMethod,
    url: String,
    name: Option<String>,
    extra: Map<String, Value>,
}

impl Metadata {
    /// Creates metadata for the given method and URL template.
    pub fn new(method: RestMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            name: None,
            extra: Map::new(),
        }
    }

    /// Sets the human-readable name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches an extra field carried through to middleware.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Validates one metadata entry from a dynamic tree.
    ///
    /// ## Errors
    ///
    /// - [`ConfigError::NotAnObject`] if the entry is not a key-value object
    /// - [`ConfigError::MissingMethodOrUrl`] if `method` or `url` is missing,
    ///   empty, or not a string
    /// - [`ConfigError::InvalidMethod`] if `method` names no supported method
    pub fn from_value(key: &str, value: &Value) -> Result<Self, ConfigError> {
        let Some(fields) = value.as_object() else {
            return Err(ConfigError::NotAnObject {
                key: key.to_string(),
            });
        };

        let non_empty = |field: &str| {
            fields
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        };

        let (Some(method), Some(url)) = (non_empty("method"), non_empty("url")) else {
            debug!(key, metadata = %value, "check your api metadata");
            return Err(ConfigError::MissingMethodOrUrl {
                key: key.to_string(),
            });
        };

        let method = method
            .parse::<RestMethod>()
            .map_err(|_| ConfigError::InvalidMethod {
                key: key.to_string(),
                method: method.to_string(),
            })?;

        let extra = fields
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "method" | "url" | "name"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            method,
            url: url.to_string(),
            name: fields.get("name").and_then(Value::as_str).map(str::to_string),
            extra,
        })
    }

    /// The HTTP method.
    pub fn method(&self) -> RestMethod {
        self.method
    }

    /// The URL template.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The optional human-readable name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Fields beyond `method`, `url` and `name`.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

/// Metadata for every endpoint of a module, flat or grouped by namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataTree {
    /// `{ endpoint: metadata }`
    Flat(BTreeMap<String, Metadata>),
    /// `{ namespace: { endpoint: metadata } }`
    Namespaced(BTreeMap<String, BTreeMap<String, Metadata>>),
}

impl MetadataTree {
    /// Validates a whole tree. `null` is read as an empty tree.
    ///
    /// ## Errors
    ///
    /// Returns the first [`ConfigError`] found; a partially valid tree is
    /// never returned.
    pub fn from_value(value: &Value, namespaced: bool) -> Result<Self, ConfigError> {
        let empty = Map::new();
        let entries = match value {
            Value::Null => &empty,
            Value::Object(entries) => entries,
            other => {
                return Err(ConfigError::InvalidMetadataTree {
                    found: json_kind(other),
                })
            }
        };

        if !namespaced {
            return Ok(Self::Flat(flat_entries(entries)?));
        }

        let mut namespaces = BTreeMap::new();
        for (namespace, group) in entries {
            let Some(group) = group.as_object() else {
                return Err(ConfigError::NotAnObject {
                    key: namespace.clone(),
                });
            };
            namespaces.insert(namespace.clone(), flat_entries(group)?);
        }
        Ok(Self::Namespaced(namespaces))
    }

    /// Returns every endpoint with its key path (`[namespace, name]` or `[name]`).
    pub fn entries(&self) -> Vec<(Vec<String>, &Metadata)> {
        match self {
            Self::Flat(entries) => entries
                .iter()
                .map(|(name, meta)| (vec![name.clone()], meta))
                .collect(),
            Self::Namespaced(namespaces) => namespaces
                .iter()
                .flat_map(|(namespace, entries)| {
                    entries
                        .iter()
                        .map(move |(name, meta)| (vec![namespace.clone(), name.clone()], meta))
                })
                .collect(),
        }
    }
}

fn flat_entries(entries: &Map<String, Value>) -> Result<BTreeMap<String, Metadata>, ConfigError> {
    entries
        .iter()
        .map(|(key, value)| Metadata::from_value(key, value).map(|meta| (key.clone(), meta)))
        .collect()
}
