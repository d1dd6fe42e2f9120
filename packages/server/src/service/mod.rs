//! API request dispatch.
//!
//! Every API request is handled in the same order:
//!
//! 1. **Routing** (`routes`): path and method matched against registered templates
//! 2. **Credentials** (`credential`): deploy token, personal or OAuth token, session, or anonymous
//! 3. **Authorization** (`authorize`): scope and feature-flag checks per route
//! 4. **Context** (`context`): correlation metadata for logs
//! 5. **Handlers** (`router`, `middleware`, `domain`): Tower layers around endpoint handlers
//! 6. **Logging and activity** (`log_sink`, `activity`): one log record per request

pub mod activity;
pub mod authorize;
pub mod config;
pub mod context;
pub mod credential;
pub mod dispatch;
pub mod domain;
pub mod flags;
pub mod log_sink;
pub mod middleware;
pub mod registry;
pub mod request;
pub mod router;
pub mod routes;

pub use activity::{ActivityOutcome, ActivityRecorder};
pub use authorize::{Decision, ScopeAuthorizer};
pub use config::{ConfigError, ServerConfig};
pub use context::ContextBuilder;
pub use credential::CredentialResolver;
pub use dispatch::{Collaborators, DispatchPipeline, CLIENT_CLOSED_REQUEST};
pub use flags::FeatureFlags;
pub use log_sink::{
    FanoutLogSink, JsonLinesSink, LogRecord, LogSink, RecordingLogSink, Severity, TracingLogSink,
};
pub use registry::ApiRegistry;
pub use request::{
    ApiParams, ApiRequest, ApiResponse, HandlerCall, HandlerResponse, ResponseBody, RouteParams,
};
pub use router::{ApiHandler, HandlerRouter};
pub use routes::{RegisteredRoute, RouteLookup, RouteTable};
