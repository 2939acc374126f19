//! Per-call transport options.
//!
//! Two option layers are kept on a [`Context`](crate::Context): options set
//! by middleware through [`Context::set_options`](crate::Context::set_options)
//! and options handed to the call itself. They are merged shallowly, key by
//! key, with the call-level layer winning.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::cancel::CancelToken;
use crate::error::ConfigError;
use crate::method::RestMethod;

/// Transport options for a single call.
///
/// Every field is optional; an unset field defers to the next layer and
/// finally to the transport's defaults. `headers` is replaced as a whole on
/// merge, it is not combined with a lower layer's headers (the transport
/// still overlays it on its default headers).
///
/// ## Examples
///
/// ```rust
/// use api_module::RequestOptions;
///
/// let from_middleware = RequestOptions::new()
///     .with_base_url("http://localhost:8877")
///     .with_header("x-custom-header", "I am custom header");
/// let from_call = RequestOptions::new().with_base_url("http://localhost:7788");
///
/// let merged = from_call.merged_over(&from_middleware);
/// assert_eq!(merged.base_url.as_deref(), Some("http://localhost:7788"));
/// assert!(merged.headers.unwrap().contains_key("x-custom-header"));
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestOptions {
    /// Base URL prefixed to relative endpoint URLs.
    #[serde(alias = "baseURL")]
    pub base_url: Option<String>,
    /// Headers sent with the request (overlaying the transport defaults).
    pub headers: Option<BTreeMap<String, String>>,
    /// Request timeout in milliseconds.
    pub timeout: Option<u64>,
    /// Token that aborts the request when its source is canceled.
    #[serde(skip)]
    pub cancel_token: Option<CancelToken>,
    /// Replaces the interpolated endpoint URL.
    pub url: Option<String>,
    /// Replaces the endpoint's HTTP method.
    pub method: Option<RestMethod>,
    /// Replaces the query parameters taken from the call data.
    pub params: Option<Map<String, Value>>,
    /// Replaces the request body taken from the call data.
    pub data: Option<Value>,
}

impl RequestOptions {
    /// Creates an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and deserializes options from a dynamic JSON value.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::InvalidOptions`] if the value is not a
    /// key-value object, or [`ConfigError::Parse`] if a field has the wrong
    /// shape.
    pub fn from_json(value: Value) -> Result<Self, ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::invalid_options(&value));
        }
        serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Adds a header, creating the header layer if needed.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Attaches a cancellation token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Overrides the dispatched URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Overrides the dispatched HTTP method.
    pub fn with_method(mut self, method: RestMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Overrides the dispatched query parameters.
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    /// Overrides the dispatched body.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.base_url.is_none()
            && self.headers.is_none()
            && self.timeout.is_none()
            && self.cancel_token.is_none()
            && self.url.is_none()
            && self.method.is_none()
            && self.params.is_none()
            && self.data.is_none()
    }

    /// Shallow merge: fields set on `self` win over those on `base`.
    pub fn merged_over(&self, base: &RequestOptions) -> RequestOptions {
        RequestOptions {
            base_url: self.base_url.clone().or_else(|| base.base_url.clone()),
            headers: self.headers.clone().or_else(|| base.headers.clone()),
            timeout: self.timeout.or(base.timeout),
            cancel_token: self
                .cancel_token
                .clone()
                .or_else(|| base.cancel_token.clone()),
            url: self.url.clone().or_else(|| base.url.clone()),
            method: self.method.or(base.method),
            params: self.params.clone().or_else(|| base.params.clone()),
            data: self.data.clone().or_else(|| base.data.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationSource;
    use serde_json::json;

    #[test]
    fn test_new_is_empty() {
        assert!(RequestOptions::new().is_empty());
        assert!(!RequestOptions::new().with_timeout(Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_call_layer_wins_key_by_key() {
        let middleware = RequestOptions::new()
            .with_base_url("http://localhost:8877")
            .with_header("authorization", "Basic abc")
            .with_timeout(Duration::from_millis(500));
        let call = RequestOptions::new().with_base_url("http://localhost:7788");

        let merged = call.merged_over(&middleware);
        assert_eq!(merged.base_url.as_deref(), Some("http://localhost:7788"));
        assert_eq!(merged.timeout, Some(500));
        assert_eq!(
            merged.headers.unwrap().get("authorization").map(String::as_str),
            Some("Basic abc")
        );
    }

    #[test]
    fn test_headers_are_replaced_not_combined() {
        let middleware = RequestOptions::new().with_header("a", "1");
        let call = RequestOptions::new().with_header("b", "2");
        let headers = call.merged_over(&middleware).headers.unwrap();
        assert!(!headers.contains_key("a"));
        assert!(headers.contains_key("b"));
    }

    #[test]
    fn test_cancel_token_survives_merge() {
        let source = CancellationSource::new();
        let call = RequestOptions::new().with_cancel_token(source.token());
        let merged = call.merged_over(&RequestOptions::new());
        source.cancel("gone");
        assert!(merged.cancel_token.unwrap().is_canceled());
    }

    #[test]
    fn test_from_json_accepts_axios_style_keys() {
        let opts = RequestOptions::from_json(json!({
            "baseURL": "http://localhost:7788",
            "headers": { "Content-Type": "application/x-www-form-urlencoded" },
            "timeout": 10000,
            "method": "put"
        }))
        .unwrap();
        assert_eq!(opts.base_url.as_deref(), Some("http://localhost:7788"));
        assert_eq!(opts.timeout, Some(10000));
        assert_eq!(opts.method, Some(RestMethod::Put));
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        for value in [json!(null), json!(123), json!("opts"), json!([1, 2])] {
            let err = RequestOptions::from_json(value).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidOptions { .. }));
        }
    }

    #[test]
    fn test_from_json_reports_bad_field_shapes() {
        let err = RequestOptions::from_json(json!({ "timeout": "soon" })).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
