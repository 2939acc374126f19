//! HTTP transport seam.
//!
//! Endpoints never talk to `reqwest` directly. They build a [`RequestConfig`]
//! from the call's [`Context`](crate::Context) and hand it to a
//! [`Transport`]. The default transport is [`ReqwestTransport`]; tests and
//! embedders can inject their own through
//! [`ApiModule::with_transport`](crate::ApiModule::with_transport).
//!
//! ## Examples
//!
//! ```rust,ignore
//! use api_module::transport::{BoxFuture, RequestConfig, ApiResponse, Transport};
//! use api_module::ApiError;
//!
//! struct Canned;
//!
//! impl Transport for Canned {
//!     fn request(&self, config: RequestConfig) -> BoxFuture<'_, Result<ApiResponse, ApiError>> {
//!         Box::pin(async move { Ok(ApiResponse::new(200, serde_json::json!({ "ok": true }), config)) })
//!     }
//! }
//! ```

mod executor;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::cancel::CancelToken;
use crate::context::Context;
use crate::error::ApiError;
use crate::method::RestMethod;

pub use executor::{ResponseInterceptor, ReqwestTransport};

/// Boxed, sendable future returned by [`Transport::request`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Anything that can execute a [`RequestConfig`].
pub trait Transport: Send + Sync {
    /// Executes the request, resolving with the response or rejecting with
    /// a transport error (network, status, timeout, cancellation).
    fn request(&self, config: RequestConfig) -> BoxFuture<'_, Result<ApiResponse, ApiError>>;
}

/// Transport defaults shared by every call of a module.
///
/// Deserializes from the `baseConfig` section of a module configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportConfig {
    /// Base URL for relative endpoint URLs.
    #[serde(alias = "baseURL")]
    pub base_url: Option<String>,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Default timeout in milliseconds. No timeout when unset.
    #[serde(rename = "timeout")]
    pub timeout_ms: Option<u64>,
}

impl TransportConfig {
    /// Creates empty defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Adds a default header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the default timeout in milliseconds.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// The request handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// HTTP method.
    pub method: RestMethod,
    /// Interpolated URL; relative URLs resolve against `base_url`.
    pub url: String,
    /// Per-call base URL. The transport's default applies when unset.
    pub base_url: Option<String>,
    /// Per-call headers, overlaid on the transport's default headers.
    pub headers: BTreeMap<String, String>,
    /// Query-string parameters.
    pub params: Map<String, Value>,
    /// Request body.
    pub data: Value,
    /// Per-call timeout in milliseconds.
    pub timeout: Option<u64>,
    /// Cancellation token for this call.
    pub cancel_token: Option<CancelToken>,
}

impl RequestConfig {
    /// Builds the dispatch config for the context's current call.
    ///
    /// Fields come from the endpoint and the call data; explicit option
    /// overrides (`url`, `method`, `params`, `data`) win over them.
    pub fn from_context(ctx: &Context) -> Self {
        let options = ctx.options();
        let data = ctx.data();
        Self {
            method: options.method.unwrap_or_else(|| ctx.method()),
            url: options.url.unwrap_or_else(|| ctx.url()),
            base_url: options.base_url,
            headers: options.headers.unwrap_or_default(),
            params: options
                .params
                .or_else(|| data.query.clone())
                .unwrap_or_default(),
            data: options
                .data
                .or_else(|| data.body.clone())
                .unwrap_or_else(|| Value::Object(Map::new())),
            timeout: options.timeout,
            cancel_token: options.cancel_token,
        }
    }
}

/// A successful transport response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers (non-UTF-8 values are dropped).
    pub headers: BTreeMap<String, String>,
    /// Parsed body: JSON when it parses, otherwise a JSON string; `null`
    /// when empty.
    pub data: Value,
    /// The config that was dispatched, with transport defaults applied.
    pub config: RequestConfig,
}

impl ApiResponse {
    /// Creates a response without headers.
    pub fn new(status: u16, data: Value, config: RequestConfig) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            data,
            config,
        }
    }

    /// Deserializes the body into a typed value.
    ///
    /// ## Errors
    ///
    /// Returns [`ApiError::Other`] wrapping the `serde_json` error.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.data.clone()).map_err(ApiError::other)
    }
}
