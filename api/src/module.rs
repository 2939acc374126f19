//! Module construction and the produced API map.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::cancel::CancellationSource;
use crate::context::Context;
use crate::endpoint::{Endpoint, Pipeline};
use crate::error::{ApiError, ConfigError};
use crate::metadata::{Metadata, MetadataTree};
use crate::middleware::{self, Hook, Next, SharedHook, Signal, Stage};
use crate::transport::{ReqwestTransport, Transport, TransportConfig};

/// Construction-time configuration of an [`ApiModule`].
///
/// ## Examples
///
/// ```rust
/// use api_module::ModuleConfig;
///
/// let config = ModuleConfig::from_yaml_str(r#"
/// module: false
/// metadatas:
///   test:
///     method: post
///     url: /api/info
/// baseConfig:
///   baseURL: http://localhost:7788
/// "#).unwrap();
///
/// assert!(!config.module);
/// assert!(config.console);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleConfig {
    /// Endpoint metadata: `{ name: meta }`, or `{ namespace: { name: meta } }`
    /// when `module` is set.
    #[serde(alias = "apiMetas")]
    pub metadatas: Value,
    /// Group endpoints by namespace.
    pub module: bool,
    /// Log failures from the default fallback hook.
    pub console: bool,
    /// Transport defaults.
    pub base_config: TransportConfig,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            metadatas: Value::Null,
            module: true,
            console: true,
            base_config: TransportConfig::default(),
        }
    }
}

impl ModuleConfig {
    /// Creates the default configuration: namespaced, console on, no endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON configuration document.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is malformed.
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parses a YAML configuration document.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is malformed.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Sets the endpoint metadata tree.
    pub fn metadatas(mut self, metadatas: Value) -> Self {
        self.metadatas = metadatas;
        self
    }

    /// Sets whether endpoints are grouped by namespace.
    pub fn module(mut self, namespaced: bool) -> Self {
        self.module = namespaced;
        self
    }

    /// Enables or disables default fallback logging.
    pub fn console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    /// Sets the transport defaults.
    pub fn base_config(mut self, base_config: TransportConfig) -> Self {
        self.base_config = base_config;
        self
    }
}

/// Endpoints of a module, flat or grouped by namespace.
#[derive(Debug, Clone)]
pub enum ApiEntries {
    /// `{ name: endpoint }`
    Flat(BTreeMap<String, Endpoint>),
    /// `{ namespace: { name: endpoint } }`
    Namespaced(BTreeMap<String, BTreeMap<String, Endpoint>>),
}

/// The API object produced by an [`ApiModule`].
///
/// Besides the endpoints it carries a back-reference to the owning module
/// ([`module`](Self::module)), which is not one of its [`keys`](Self::keys).
/// The map keeps the module's state alive, so the back-reference stays valid
/// after every [`ApiModule`] handle is dropped.
#[derive(Clone)]
pub struct ApiMap {
    entries: Arc<ApiEntries>,
    shared: Arc<ModuleShared>,
}

impl fmt::Debug for ApiMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiMap")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl ApiMap {
    /// Top-level names: endpoint names when flat, namespaces otherwise.
    pub fn keys(&self) -> Vec<&str> {
        match &*self.entries {
            ApiEntries::Flat(endpoints) => endpoints.keys().map(String::as_str).collect(),
            ApiEntries::Namespaced(namespaces) => {
                namespaces.keys().map(String::as_str).collect()
            }
        }
    }

    /// The endpoints, in their flat or namespaced shape.
    pub fn entries(&self) -> &ApiEntries {
        &self.entries
    }

    /// Returns `true` when endpoints are grouped by namespace.
    pub fn is_namespaced(&self) -> bool {
        matches!(*self.entries, ApiEntries::Namespaced(_))
    }

    /// A top-level endpoint of a flat map.
    pub fn endpoint(&self, name: &str) -> Option<&Endpoint> {
        match &*self.entries {
            ApiEntries::Flat(endpoints) => endpoints.get(name),
            ApiEntries::Namespaced(_) => None,
        }
    }

    /// The endpoints of one namespace of a namespaced map.
    pub fn namespace(&self, namespace: &str) -> Option<&BTreeMap<String, Endpoint>> {
        match &*self.entries {
            ApiEntries::Flat(_) => None,
            ApiEntries::Namespaced(namespaces) => namespaces.get(namespace),
        }
    }

    /// Looks up an endpoint by key path: `["name"]` or `["namespace", "name"]`.
    pub fn get(&self, path: &[&str]) -> Option<&Endpoint> {
        match (&*self.entries, path) {
            (ApiEntries::Flat(endpoints), [name]) => endpoints.get(*name),
            (ApiEntries::Namespaced(namespaces), [namespace, name]) => {
                namespaces.get(*namespace)?.get(*name)
            }
            _ => None,
        }
    }

    /// Every endpoint, in key order.
    pub fn endpoints(&self) -> Vec<&Endpoint> {
        match &*self.entries {
            ApiEntries::Flat(endpoints) => endpoints.values().collect(),
            ApiEntries::Namespaced(namespaces) => {
                namespaces.values().flat_map(BTreeMap::values).collect()
            }
        }
    }

    /// The module that produced this map.
    pub fn module(&self) -> ApiModule {
        ApiModule { api: self.clone() }
    }
}

struct ModuleShared {
    config: ModuleConfig,
    pipeline: Arc<Pipeline>,
    http: Option<Arc<ReqwestTransport>>,
}

/// Builds endpoint callables from a metadata tree and owns their hooks.
///
/// Cloning yields another handle to the same module.
///
/// ## Examples
///
/// ```rust,ignore
/// use api_module::{ApiModule, ModuleConfig, RequestData, TransportConfig};
/// use serde_json::json;
///
/// let module = ApiModule::new(
///     ModuleConfig::new()
///         .module(false)
///         .metadatas(json!({ "test": { "method": "post", "url": "/api/info" } }))
///         .base_config(TransportConfig::new().with_base_url("http://localhost:7788")),
/// )?;
///
/// module.use_after(|ctx, next| {
///     if let Some(res) = ctx.response_mut() {
///         res.data = res.data["data"].clone();
///     }
///     next.pass()
/// });
///
/// let test = module.get_instance().endpoint("test").unwrap();
/// let res = test.call(RequestData::new().with_body(json!({ "a": 1, "b": 2 }))).await?;
/// assert_eq!(res.data, json!({ "a": 1, "b": 2 }));
/// ```
#[derive(Clone)]
pub struct ApiModule {
    api: ApiMap,
}

impl fmt::Debug for ApiModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = &self.shared().config;
        f.debug_struct("ApiModule")
            .field("module", &config.module)
            .field("console", &config.console)
            .field("base_config", &config.base_config)
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

impl ApiModule {
    /// Creates a module using a [`ReqwestTransport`] built from
    /// `config.base_config`.
    ///
    /// ## Errors
    ///
    /// Returns [`ApiError::Config`] if any metadata entry is invalid; no
    /// module is built in that case.
    pub fn new(config: ModuleConfig) -> Result<Self, ApiError> {
        let http = Arc::new(ReqwestTransport::new(config.base_config.clone())?);
        let transport: Arc<dyn Transport> = http.clone();
        Self::build(config, transport, Some(http))
    }

    /// Creates a module that dispatches through a custom transport.
    ///
    /// ## Errors
    ///
    /// Returns [`ApiError::Config`] if any metadata entry is invalid.
    pub fn with_transport(
        config: ModuleConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ApiError> {
        Self::build(config, transport, None)
    }

    fn build(
        config: ModuleConfig,
        transport: Arc<dyn Transport>,
        http: Option<Arc<ReqwestTransport>>,
    ) -> Result<Self, ApiError> {
        let tree = MetadataTree::from_value(&config.metadatas, config.module)?;
        let pipeline = Arc::new(Pipeline::new(transport, config.console));

        let bind = |metadata: &Metadata, keys: Vec<String>| {
            Endpoint::new(metadata.clone(), keys, Arc::clone(&pipeline))
        };
        let entries = match &tree {
            MetadataTree::Flat(metas) => ApiEntries::Flat(
                metas
                    .iter()
                    .map(|(name, meta)| (name.clone(), bind(meta, vec![name.clone()])))
                    .collect(),
            ),
            MetadataTree::Namespaced(namespaces) => ApiEntries::Namespaced(
                namespaces
                    .iter()
                    .map(|(namespace, metas)| {
                        let endpoints = metas
                            .iter()
                            .map(|(name, meta)| {
                                let keys = vec![namespace.clone(), name.clone()];
                                (name.clone(), bind(meta, keys))
                            })
                            .collect();
                        (namespace.clone(), endpoints)
                    })
                    .collect(),
            ),
        };

        let endpoint_count = tree.entries().len();
        info!(
            endpoints = endpoint_count,
            namespaced = config.module,
            "[ApiModule] module created"
        );
        let shared = Arc::new(ModuleShared {
            config,
            pipeline,
            http,
        });

        Ok(Self {
            api: ApiMap {
                entries: Arc::new(entries),
                shared,
            },
        })
    }

    fn shared(&self) -> &ModuleShared {
        &self.api.shared
    }

    /// The produced API map.
    pub fn get_instance(&self) -> &ApiMap {
        &self.api
    }

    /// The transport every endpoint dispatches through.
    pub fn get_transport(&self) -> Arc<dyn Transport> {
        Arc::clone(self.shared().pipeline.transport())
    }

    /// The default `reqwest` transport, for registering response
    /// interceptors. `None` when a custom transport was injected.
    pub fn http_transport(&self) -> Option<&Arc<ReqwestTransport>> {
        self.shared().http.as_ref()
    }

    /// The construction configuration.
    pub fn config(&self) -> &ModuleConfig {
        &self.shared().config
    }

    /// The transport defaults.
    pub fn options(&self) -> &TransportConfig {
        &self.shared().config.base_config
    }

    /// Creates a cancellation source whose token can be passed to a call via
    /// [`RequestOptions::with_cancel_token`](crate::RequestOptions::with_cancel_token).
    pub fn generate_cancellation_source(&self) -> CancellationSource {
        CancellationSource::new()
    }

    /// Returns `true` if both handles refer to the same module.
    pub fn ptr_eq(&self, other: &ApiModule) -> bool {
        Arc::ptr_eq(&self.api.shared, &other.api.shared)
    }

    /// Sets this module's fore-request hook.
    pub fn use_before<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut Context, Next) -> Signal + Send + Sync + 'static,
    {
        self.use_hook(Stage::Before, hook)
    }

    /// Sets this module's post-request hook.
    pub fn use_after<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut Context, Next) -> Signal + Send + Sync + 'static,
    {
        self.use_hook(Stage::After, hook)
    }

    /// Sets this module's fallback hook.
    pub fn use_catch<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut Context, Next) -> Signal + Send + Sync + 'static,
    {
        self.use_hook(Stage::Catch, hook)
    }

    /// Sets this module's hook for `stage` from any [`Hook`] implementation.
    pub fn use_hook<H: Hook + 'static>(&self, stage: Stage, hook: H) -> &Self {
        self.set_hook(stage, Some(Arc::new(hook)))
    }

    /// Sets or clears (`None`) this module's hook for `stage`. A cleared
    /// stage falls back to the global hook, then to the stage default.
    pub fn set_hook(&self, stage: Stage, hook: Option<SharedHook>) -> &Self {
        debug!(stage = %stage, present = hook.is_some(), "instance hook updated");
        self.shared().pipeline.set_hook(stage, hook);
        self
    }

    /// This module's hook for `stage`, if one is set.
    pub fn hook(&self, stage: Stage) -> Option<SharedHook> {
        self.shared().pipeline.hook(stage)
    }

    /// Clears this module's fore-request hook.
    pub fn clear_before(&self) -> &Self {
        self.set_hook(Stage::Before, None)
    }

    /// Clears this module's post-request hook.
    pub fn clear_after(&self) -> &Self {
        self.set_hook(Stage::After, None)
    }

    /// Clears this module's fallback hook.
    pub fn clear_catch(&self) -> &Self {
        self.set_hook(Stage::Catch, None)
    }

    /// Alias of [`use_before`](Self::use_before).
    pub fn register_fore_request_middleware<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut Context, Next) -> Signal + Send + Sync + 'static,
    {
        self.use_before(hook)
    }

    /// Alias of [`use_after`](Self::use_after).
    pub fn register_post_request_middleware<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut Context, Next) -> Signal + Send + Sync + 'static,
    {
        self.use_after(hook)
    }

    /// Alias of [`use_catch`](Self::use_catch).
    pub fn register_fallback_middleware<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut Context, Next) -> Signal + Send + Sync + 'static,
    {
        self.use_catch(hook)
    }

    /// Sets the process-wide fore-request hook.
    pub fn global_before<F>(hook: F)
    where
        F: Fn(&mut Context, Next) -> Signal + Send + Sync + 'static,
    {
        middleware::set_global_hook(Stage::Before, Some(Arc::new(hook)));
    }

    /// Sets the process-wide post-request hook.
    pub fn global_after<F>(hook: F)
    where
        F: Fn(&mut Context, Next) -> Signal + Send + Sync + 'static,
    {
        middleware::set_global_hook(Stage::After, Some(Arc::new(hook)));
    }

    /// Sets the process-wide fallback hook.
    pub fn global_catch<F>(hook: F)
    where
        F: Fn(&mut Context, Next) -> Signal + Send + Sync + 'static,
    {
        middleware::set_global_hook(Stage::Catch, Some(Arc::new(hook)));
    }

    /// Sets or clears the process-wide hook for `stage`.
    pub fn set_global_hook(stage: Stage, hook: Option<SharedHook>) {
        middleware::set_global_hook(stage, hook);
    }

    /// Alias of [`global_before`](Self::global_before).
    pub fn global_fore_request_middleware<F>(hook: F)
    where
        F: Fn(&mut Context, Next) -> Signal + Send + Sync + 'static,
    {
        Self::global_before(hook);
    }

    /// Alias of [`global_after`](Self::global_after).
    pub fn global_post_request_middleware<F>(hook: F)
    where
        F: Fn(&mut Context, Next) -> Signal + Send + Sync + 'static,
    {
        Self::global_after(hook);
    }

    /// Alias of [`global_catch`](Self::global_catch).
    pub fn global_fallback_middleware<F>(hook: F)
    where
        F: Fn(&mut Context, Next) -> Signal + Send + Sync + 'static,
    {
        Self::global_catch(hook);
    }

    /// Removes every process-wide hook.
    pub fn reset_global_hooks() {
        middleware::reset_global_hooks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadatas() -> Value {
        json!({
            "main": { "test": { "url": "/api/test", "method": "get" } },
            "sub": { "subTest": { "url": "/sub/test", "method": "post" } }
        })
    }

    #[test]
    fn test_default_config() {
        let config = ModuleConfig::new();
        assert!(config.module);
        assert!(config.console);
        assert!(config.metadatas.is_null());
    }

    #[test]
    fn test_config_from_json_accepts_legacy_key() {
        let config = ModuleConfig::from_json_str(
            r#"{ "apiMetas": { "test": { "url": "/t", "method": "get" } }, "module": false }"#,
        )
        .unwrap();
        assert!(!config.module);
        assert!(config.metadatas.get("test").is_some());
    }

    #[test]
    fn test_config_parse_error() {
        let err = ModuleConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        let err = ModuleConfig::from_yaml_str("module: [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_namespaced_keys_and_lookup() {
        let module = ApiModule::new(ModuleConfig::new().metadatas(metadatas())).unwrap();
        let api = module.get_instance();
        assert!(api.is_namespaced());
        assert_eq!(api.keys(), vec!["main", "sub"]);
        assert!(api.namespace("sub").unwrap().contains_key("subTest"));
        assert_eq!(
            api.get(&["sub", "subTest"]).unwrap().metadata_keys(),
            ["sub".to_string(), "subTest".to_string()]
        );
        assert!(api.endpoint("main").is_none());
        assert_eq!(api.endpoints().len(), 2);
    }

    #[test]
    fn test_back_reference_is_the_module() {
        let module = ApiModule::new(ModuleConfig::new().metadatas(metadatas())).unwrap();
        let back = module.get_instance().module();
        assert!(back.ptr_eq(&module));
        assert!(!module.get_instance().keys().contains(&"module"));
    }

    #[test]
    fn test_back_reference_outlives_module_handle() {
        let api = ApiModule::new(ModuleConfig::new().metadatas(metadatas()))
            .unwrap()
            .get_instance()
            .clone();

        let module = api.module();
        module.use_before(|_, next| next.pass());
        assert!(module.hook(Stage::Before).is_some());
        assert!(api.module().ptr_eq(&module));
        assert!(api.module().config().module);
    }

    #[test]
    fn test_invalid_metadata_fails_construction() {
        let err = ApiModule::new(ModuleConfig::new().module(false).metadatas(json!({ "test": {} })))
            .unwrap_err();
        assert!(err.to_string().contains("'method' or 'url' value not found"));
    }

    #[test]
    fn test_instance_hooks_set_and_clear() {
        let module = ApiModule::new(ModuleConfig::new()).unwrap();
        module.use_before(|_, next| next.pass()).use_catch(|_, next| next.pass());
        assert!(module.hook(Stage::Before).is_some());
        assert!(module.hook(Stage::After).is_none());
        module.clear_before();
        assert!(module.hook(Stage::Before).is_none());
        assert!(module.hook(Stage::Catch).is_some());
    }

    #[test]
    fn test_options_and_http_transport() {
        let base = TransportConfig::new().with_base_url("http://localhost:7788");
        let module = ApiModule::new(ModuleConfig::new().base_config(base.clone())).unwrap();
        assert_eq!(module.options(), &base);
        assert_eq!(module.http_transport().unwrap().defaults(), &base);
    }
}
