//! Bound endpoint callables.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, instrument, Span};

use crate::context::{CallState, Context, RequestData};
use crate::error::ApiError;
use crate::metadata::Metadata;
use crate::middleware::{self, HookSlots, SharedHook, Stage};
use crate::options::RequestOptions;
use crate::transport::{ApiResponse, RequestConfig, Transport};

/// What every endpoint of one module shares: the transport, the instance
/// hook slots and the console flag.
pub(crate) struct Pipeline {
    transport: Arc<dyn Transport>,
    hooks: RwLock<HookSlots>,
    console: bool,
}

impl Pipeline {
    pub(crate) fn new(transport: Arc<dyn Transport>, console: bool) -> Self {
        Self {
            transport,
            hooks: RwLock::new(HookSlots::default()),
            console,
        }
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn set_hook(&self, stage: Stage, hook: Option<SharedHook>) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(stage, hook);
    }

    pub(crate) fn hook(&self, stage: Stage) -> Option<SharedHook> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stage)
    }

    fn run(&self, stage: Stage, ctx: &mut Context) -> Option<ApiError> {
        let hook = {
            let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
            middleware::resolve(&hooks, stage)
        };
        middleware::run_stage(stage, hook, ctx, self.console)
    }
}

/// One callable HTTP operation of an [`ApiModule`](crate::ApiModule).
///
/// Cloning is cheap; clones share the module's transport and hooks. Every
/// call works on its own copy of the endpoint's context, so concurrent calls
/// never observe each other's data, response or error. The context of the
/// most recently settled call is kept for inspection through
/// [`last_context`](Self::last_context).
///
/// ## Examples
///
/// ```rust,ignore
/// use api_module::RequestData;
/// use serde_json::json;
///
/// let test = api.endpoint("test").unwrap();
/// let res = test.call(RequestData::new().with_body(json!({ "a": 1, "b": 2 }))).await?;
/// ```
#[derive(Clone)]
pub struct Endpoint {
    template: Arc<Context>,
    pipeline: Arc<Pipeline>,
    last: Arc<Mutex<Option<Context>>>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("keys", &self.template.metadata_keys())
            .field("method", &self.template.method())
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    pub(crate) fn new(metadata: Metadata, keys: Vec<String>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            template: Arc::new(Context::new(Arc::new(metadata), Arc::from(keys))),
            pipeline,
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// The endpoint's metadata.
    pub fn metadata(&self) -> Metadata {
        self.template.metadata()
    }

    /// Path of the endpoint in the API map: `[namespace, name]` or `[name]`.
    pub fn metadata_keys(&self) -> &[String] {
        self.template.metadata_keys()
    }

    /// Dotted key path, e.g. `"main.test"`.
    pub fn name(&self) -> String {
        self.template.metadata_keys().join(".")
    }

    /// Snapshot of the context of the most recently settled call.
    pub fn last_context(&self) -> Option<Context> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls the endpoint with the given data and no extra options.
    ///
    /// ## Errors
    ///
    /// Rejects with the error left on the context after the fallback stage:
    /// a middleware veto, a transport failure or a cancellation.
    pub async fn call(&self, data: RequestData) -> Result<ApiResponse, ApiError> {
        self.call_with(data, RequestOptions::default()).await
    }

    /// Calls the endpoint with per-call transport options.
    ///
    /// Per-call options win over options set by middleware.
    ///
    /// ## Errors
    ///
    /// See [`call`](Self::call).
    pub async fn call_with(
        &self,
        data: RequestData,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let mut ctx = self.prepare();
        ctx.set_data(data).set_request_options(options);
        self.execute(ctx).await
    }

    /// Calls the endpoint with dynamic data and options.
    ///
    /// `data` is read as `{ query?, params?, body? }`. Options that are not a
    /// key-value object are reported and ignored, they do not fail the call.
    ///
    /// ## Errors
    ///
    /// See [`call`](Self::call).
    pub async fn call_value(
        &self,
        data: Value,
        options: Option<Value>,
    ) -> Result<ApiResponse, ApiError> {
        let mut ctx = self.prepare();
        ctx.set_data(RequestData::from_json(&data));
        if let Some(options) = options {
            ctx.set_request_options_json(options);
        }
        self.execute(ctx).await
    }

    fn prepare(&self) -> Context {
        let mut ctx = Context::clone(&self.template);
        ctx.reset();
        ctx
    }

    #[instrument(
        name = "api_call",
        skip(self, ctx),
        fields(
            api.endpoint = %self.name(),
            http.method = %ctx.method(),
            http.url = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
            otel.kind = "client",
            otel.status_code = tracing::field::Empty,
        )
    )]
    async fn execute(&self, mut ctx: Context) -> Result<ApiResponse, ApiError> {
        ctx.set_state(CallState::ForeRequest);
        let resolved = match self.pipeline.run(Stage::Before, &mut ctx) {
            Some(_) => None,
            None => self.dispatch(&mut ctx).await,
        };

        let outcome = match resolved {
            Some(response) => {
                ctx.set_state(CallState::Resolved);
                Span::current().record("otel.status_code", "OK");
                Ok(response)
            }
            None => {
                ctx.set_state(CallState::Fallback);
                self.pipeline.run(Stage::Catch, &mut ctx);
                ctx.set_state(CallState::Rejected);
                Span::current().record("otel.status_code", "ERROR");
                Err(ctx.response_error().cloned().unwrap_or(ApiError::Cleared))
            }
        };

        debug!(state = %ctx.state(), "call settled");
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(ctx);
        outcome
    }

    /// Transport plus post-request stage. `None` routes the call to fallback.
    async fn dispatch(&self, ctx: &mut Context) -> Option<ApiResponse> {
        let config = RequestConfig::from_context(ctx);
        Span::current().record("http.url", config.url.as_str());

        ctx.set_state(CallState::Transport);
        let response = match self.pipeline.transport().request(config).await {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "transport failed");
                ctx.set_error(err);
                return None;
            }
        };
        Span::current().record("http.status_code", response.status);

        ctx.set_response(response.clone()).set_state(CallState::PostRequest);
        if self.pipeline.run(Stage::After, ctx).is_some() {
            return None;
        }
        Some(ctx.response().cloned().unwrap_or(response))
    }
}
