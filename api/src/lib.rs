//! Declarative HTTP request generation.
//!
//! The `api_module` crate turns a static description of named endpoints
//! (method plus URL template, optionally grouped into namespaces) into a map
//! of callable [`Endpoint`]s. Each call flows through a three-stage
//! middleware pipeline around an injectable HTTP [`Transport`]:
//!
//! ```text
//! fore-request ──pass──▶ transport ──ok──▶ post-request ──pass──▶ resolved
//!      │                     │                  │
//!      └──veto───────────────┴──error───────────┴──veto──▶ fallback ──▶ rejected
//! ```
//!
//! ## Features
//!
//! - **Declarative endpoints**: metadata from JSON/YAML or `serde_json::Value`
//! - **URL templates**: `:name` and `{name}` placeholders filled from call params
//! - **Layered hooks**: instance hooks, then process-wide hooks, then defaults
//! - **Per-call context**: nothing set during one call leaks into the next
//! - **Cancellation**: tokens that abort in-flight requests with a reason
//! - **Async-first transport**: built on `reqwest` with `tokio`
//!
//! ## Example
//!
//! ```rust,ignore
//! use api_module::{ApiModule, ModuleConfig, RequestData, TransportConfig};
//! use serde_json::json;
//!
//! let module = ApiModule::new(
//!     ModuleConfig::new()
//!         .metadatas(json!({
//!             "user": {
//!                 "get": { "method": "get", "url": "/users/:id" }
//!             }
//!         }))
//!         .base_config(TransportConfig::new().with_base_url("https://api.example.com")),
//! )?;
//!
//! module.use_before(|ctx, next| {
//!     ctx.set_options(api_module::RequestOptions::new().with_header("authorization", "Bearer t"));
//!     next.pass()
//! });
//!
//! let get_user = module.get_instance().get(&["user", "get"]).unwrap();
//! let res = get_user.call(RequestData::new().with_param("id", 42)).await?;
//! ```

pub mod cancel;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod method;
pub mod middleware;
pub mod module;
pub mod options;
pub mod template;
pub mod transport;

// Re-exports for convenience
pub use cancel::{CancelToken, CancellationSource};
pub use context::{CallState, Context, RequestData};
pub use endpoint::Endpoint;
pub use error::{ApiError, ClientError, ConfigError};
pub use metadata::{Metadata, MetadataTree};
pub use method::RestMethod;
pub use middleware::{Hook, Next, SharedHook, Signal, Stage};
pub use module::{ApiEntries, ApiMap, ApiModule, ModuleConfig};
pub use options::RequestOptions;
pub use transport::{ApiResponse, RequestConfig, ReqwestTransport, Transport, TransportConfig};
