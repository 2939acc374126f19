//! Per-call state threaded through the middleware pipeline.
//!
//! A [`Context`] carries the endpoint's metadata, the call input, two layers
//! of transport options, the response and the error. Every call of an
//! [`Endpoint`](crate::Endpoint) starts from the endpoint's template context
//! with `response`, `response_error` and the middleware option layer reset,
//! so nothing set during call N is visible to call N+1.

use std::sync::Arc;

use serde_json::{Map, Value};
use strum::Display;
use tracing::error;

use crate::error::ApiError;
use crate::metadata::Metadata;
use crate::method::RestMethod;
use crate::options::RequestOptions;
use crate::template;
use crate::transport::ApiResponse;

/// Where a call currently is in its lifecycle.
///
/// ```text
/// CREATED -> FORE_REQUEST -> TRANSPORT -> POST_REQUEST -> RESOLVED
///                 |              |             |
///                 +--------------+-------------+--> FALLBACK -> REJECTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    /// Context prepared, no middleware has run yet.
    Created,
    /// The fore-request hook is running.
    ForeRequest,
    /// The transport call is in flight.
    Transport,
    /// The post-request hook is running.
    PostRequest,
    /// The fallback hook is running.
    Fallback,
    /// The call fulfilled with the context's response.
    Resolved,
    /// The call rejected with the context's error.
    Rejected,
}

impl CallState {
    /// Returns `true` for `Resolved` and `Rejected`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected)
    }
}

/// The input of one call: query string, path params and body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestData {
    /// Query-string parameters.
    pub query: Option<Map<String, Value>>,
    /// Values for the URL template's placeholders.
    pub params: Option<Map<String, Value>>,
    /// Request body.
    pub body: Option<Value>,
}

impl RequestData {
    /// Creates empty call data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads call data from a dynamic `{ query?, params?, body? }` value.
    ///
    /// `query` and `params` are only taken when they are key-value objects;
    /// a `null` body counts as absent. Anything that is not an object yields
    /// empty data.
    pub fn from_json(value: &Value) -> Self {
        Self {
            query: value.get("query").and_then(Value::as_object).cloned(),
            params: value.get("params").and_then(Value::as_object).cloned(),
            body: value.get("body").filter(|body| !body.is_null()).cloned(),
        }
    }

    /// Adds a query-string parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Adds a path parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Mutable state of one endpoint call.
///
/// Middleware receives `&mut Context`. Setters return `&mut Self` so they can
/// be chained:
///
/// ```rust,ignore
/// ctx.set_data(data).set_error("not allowed");
/// ```
#[derive(Debug, Clone)]
pub struct Context {
    metadata: Arc<Metadata>,
    metadata_keys: Arc<[String]>,
    data: RequestData,
    request_options: RequestOptions,
    meta_options: RequestOptions,
    response: Option<ApiResponse>,
    error: Option<ApiError>,
    state: CallState,
}

impl Context {
    pub(crate) fn new(metadata: Arc<Metadata>, metadata_keys: Arc<[String]>) -> Self {
        Self {
            metadata,
            metadata_keys,
            data: RequestData::default(),
            request_options: RequestOptions::default(),
            meta_options: RequestOptions::default(),
            response: None,
            error: None,
            state: CallState::Created,
        }
    }

    /// Clears everything a previous call may have left behind.
    pub(crate) fn reset(&mut self) -> &mut Self {
        self.error = None;
        self.response = None;
        self.meta_options = RequestOptions::default();
        self.state = CallState::Created;
        self
    }

    /// Replaces the call data.
    pub fn set_data(&mut self, data: RequestData) -> &mut Self {
        self.data = data;
        self
    }

    /// Replaces the stored response.
    pub fn set_response(&mut self, response: ApiResponse) -> &mut Self {
        self.response = Some(response);
        self
    }

    /// Stores an error; strings are wrapped into [`ApiError::Message`].
    pub fn set_error(&mut self, error: impl Into<ApiError>) -> &mut Self {
        self.error = Some(error.into());
        self
    }

    /// Removes the stored error.
    pub fn clear_error(&mut self) -> &mut Self {
        self.error = None;
        self
    }

    /// Sets the middleware option layer (auth headers, alternate base URLs).
    ///
    /// Options passed to the call itself still win key by key.
    pub fn set_options(&mut self, options: RequestOptions) {
        self.meta_options = options;
    }

    /// Sets the middleware option layer from a dynamic value.
    ///
    /// A value that is not a key-value object is reported and ignored; the
    /// previous options stay in place.
    pub fn set_options_json(&mut self, options: Value) {
        match RequestOptions::from_json(options) {
            Ok(options) => self.meta_options = options,
            Err(err) => error!(
                endpoint = %self.metadata_keys.join("."),
                error = %err,
                "[ApiModule] configure axios options error"
            ),
        }
    }

    pub(crate) fn set_request_options(&mut self, options: RequestOptions) -> &mut Self {
        self.request_options = options;
        self
    }

    pub(crate) fn set_request_options_json(&mut self, options: Value) -> &mut Self {
        match RequestOptions::from_json(options) {
            Ok(options) => self.request_options = options,
            Err(err) => error!(
                endpoint = %self.metadata_keys.join("."),
                error = %err,
                "[ApiModule] the request parameter is not an object"
            ),
        }
        self
    }

    pub(crate) fn set_state(&mut self, state: CallState) {
        self.state = state;
    }

    /// A copy of the endpoint's metadata.
    pub fn metadata(&self) -> Metadata {
        Metadata::clone(&self.metadata)
    }

    /// Path of the endpoint in the API map: `[namespace, name]` or `[name]`.
    pub fn metadata_keys(&self) -> &[String] {
        &self.metadata_keys
    }

    /// The endpoint's HTTP method.
    pub fn method(&self) -> RestMethod {
        self.metadata.method()
    }

    /// Base URL from the merged option layers, if any sets one.
    pub fn base_url(&self) -> Option<String> {
        self.options().base_url
    }

    /// The URL template with placeholders substituted from `data.params`.
    pub fn parsed_url(&self) -> String {
        template::substitute(self.metadata.url(), self.data.params.as_ref())
    }

    /// The substituted URL, prefixed by [`base_url`](Self::base_url) when set.
    pub fn url(&self) -> String {
        template::resolve(self.base_url().as_deref(), &self.parsed_url())
    }

    /// The current call data.
    pub fn data(&self) -> &RequestData {
        &self.data
    }

    /// Mutable access to the current call data.
    pub fn data_mut(&mut self) -> &mut RequestData {
        &mut self.data
    }

    /// The response of the current call, once the transport succeeded.
    pub fn response(&self) -> Option<&ApiResponse> {
        self.response.as_ref()
    }

    /// Mutable access to the response, for post-request transformations.
    pub fn response_mut(&mut self) -> Option<&mut ApiResponse> {
        self.response.as_mut()
    }

    /// The error of the current call, if any.
    pub fn response_error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Merged options: the call layer over the middleware layer.
    pub fn options(&self) -> RequestOptions {
        self.request_options.merged_over(&self.meta_options)
    }

    /// The lifecycle state of the call.
    pub fn state(&self) -> CallState {
        self.state
    }
}
