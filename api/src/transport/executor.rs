//! Default transport built on `reqwest`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::{Map, Value};
use tracing::{debug, instrument, Span};
use url::Url;

use super::{ApiResponse, BoxFuture, RequestConfig, Transport, TransportConfig};
use crate::error::{ApiError, ClientError};
use crate::template;

/// A response interceptor: receives each successful response and returns it
/// (possibly transformed) or rejects the call.
pub type ResponseInterceptor =
    Arc<dyn Fn(ApiResponse) -> Result<ApiResponse, ApiError> + Send + Sync>;

/// HTTP transport with module-wide defaults and response interceptors.
///
/// Relative URLs are joined onto the effective base URL (the call's, else
/// the default) by trimming the slashes on both sides of the seam; absolute
/// URLs are sent as-is. Call headers overlay the default headers. Non-2xx
/// responses reject with [`ClientError::HttpStatus`].
///
/// ## Examples
///
/// ```rust,ignore
/// use api_module::transport::{ReqwestTransport, TransportConfig};
///
/// let transport = ReqwestTransport::new(
///     TransportConfig::new()
///         .with_base_url("http://localhost:7788")
///         .with_header("X-test-header", "api-module"),
/// )?;
/// transport.intercept_response(|res| Ok(res));
/// ```
pub struct ReqwestTransport {
    client: reqwest::Client,
    defaults: TransportConfig,
    interceptors: RwLock<Vec<ResponseInterceptor>>,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("defaults", &self.defaults)
            .field("interceptors", &self.interceptor_count())
            .finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Creates a transport with the given defaults.
    ///
    /// ## Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(defaults: TransportConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .build()
            .map_err(ClientError::from)?;

        Ok(Self {
            client,
            defaults,
            interceptors: RwLock::new(Vec::new()),
        })
    }

    /// The defaults every request starts from.
    pub fn defaults(&self) -> &TransportConfig {
        &self.defaults
    }

    /// Appends a response interceptor. Interceptors run in registration
    /// order on every 2xx response.
    pub fn intercept_response<F>(&self, interceptor: F)
    where
        F: Fn(ApiResponse) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    {
        self.interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(interceptor));
    }

    /// Removes every response interceptor.
    pub fn clear_interceptors(&self) {
        self.interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn interceptor_count(&self) -> usize {
        self.interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[instrument(
        name = "api_transport",
        skip(self, config),
        fields(
            http.method = %config.method,
            http.url = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
            otel.kind = "client",
            otel.status_code = tracing::field::Empty,
        )
    )]
    async fn dispatch(&self, mut config: RequestConfig) -> Result<ApiResponse, ApiError> {
        if let Some(reason) = config.cancel_token.as_ref().and_then(|t| t.reason()) {
            return Err(ClientError::Canceled { reason }.into());
        }

        config.base_url = config.base_url.or_else(|| self.defaults.base_url.clone());
        let call_headers = std::mem::take(&mut config.headers);
        config.headers = merge_headers(&self.defaults.headers, call_headers);
        let timeout_ms = config.timeout.or(self.defaults.timeout_ms);

        let full_url = template::resolve(config.base_url.as_deref(), &config.url);
        let full_url = Url::parse(&full_url)
            .map_err(|e| ClientError::Connection(format!("invalid URL: {e}")))?;
        Span::current().record("http.url", full_url.as_str());

        let mut request = self
            .client
            .request(config.method.to_reqwest(), full_url)
            .headers(header_map(&config.headers)?);

        let query = query_pairs(&config.params);
        if !query.is_empty() {
            request = request.query(&query);
        }

        if sends_body(&config) {
            let body = serde_json::to_vec(&config.data)
                .map_err(|e| ClientError::Connection(format!("invalid body: {e}")))?;
            if !config.headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                request = request.header(CONTENT_TYPE, "application/json");
            }
            request = request.body(body);
        }

        if let Some(ms) = timeout_ms {
            request = request.timeout(Duration::from_millis(ms));
        }

        debug!("dispatching request");
        let sent = match config.cancel_token.clone() {
            Some(token) => tokio::select! {
                biased;
                reason = token.canceled() => {
                    debug!(%reason, "request canceled");
                    return Err(ClientError::Canceled { reason }.into());
                }
                sent = request.send() => sent,
            },
            None => request.send().await,
        };
        let response = sent.map_err(|e| classify(e, timeout_ms))?;

        let status = response.status();
        let status_code = status.as_u16();
        Span::current().record("http.status_code", status_code);

        if !status.is_success() {
            let message = response
                .text()
                .await
                .ok()
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| status.to_string());

            let otel_status = if status.is_server_error() {
                "ERROR"
            } else {
                "UNSET"
            };
            Span::current().record("otel.status_code", otel_status);

            return Err(ClientError::HttpStatus {
                status: status_code,
                message,
            }
            .into());
        }

        Span::current().record("otel.status_code", "OK");

        let response_headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, timeout_ms))?;

        let mut response = ApiResponse {
            status: status_code,
            headers: response_headers,
            data: parse_body(&body),
            config,
        };

        let interceptors = self
            .interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for interceptor in interceptors {
            response = interceptor(response)?;
        }

        Ok(response)
    }
}

impl Transport for ReqwestTransport {
    fn request(&self, config: RequestConfig) -> BoxFuture<'_, Result<ApiResponse, ApiError>> {
        Box::pin(self.dispatch(config))
    }
}

fn classify(err: reqwest::Error, timeout_ms: Option<u64>) -> ApiError {
    match timeout_ms {
        Some(duration_ms) if err.is_timeout() => ClientError::Timeout { duration_ms }.into(),
        _ => ClientError::from(err).into(),
    }
}

/// Overlays call headers on the defaults. Names compare case-insensitively,
/// so a call header replaces a default that differs only in case.
fn merge_headers(
    defaults: &BTreeMap<String, String>,
    call: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = defaults
        .iter()
        .filter(|(name, _)| !call.keys().any(|key| key.eq_ignore_ascii_case(name)))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    merged.extend(call);
    merged
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ApiError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|e| ClientError::Connection(format!("invalid header name: {e}")))?;
        let value = HeaderValue::try_from(value.as_str())
            .map_err(|e| ClientError::Connection(format!("invalid header value: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Query pairs in key order. `null` values are skipped and arrays
/// expand to repeated `key[]` pairs.
fn query_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => pairs.extend(
                items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(|item| (format!("{key}[]"), render(item))),
            ),
            other => pairs.push((key.clone(), render(other))),
        }
    }
    pairs
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Bodyless methods only carry a body when one was actually provided.
fn sends_body(config: &RequestConfig) -> bool {
    if config.method.has_body() {
        return !config.data.is_null();
    }
    match &config.data {
        Value::Null => false,
        Value::Object(fields) => !fields.is_empty(),
        _ => true,
    }
}

fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}
