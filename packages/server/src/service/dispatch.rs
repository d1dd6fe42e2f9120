//! The dispatch pipeline: the single path every API request takes.
//!
//! ```text
//! Received -> Resolved -> Authorized -> HandlerExecuting -> {Completed, Faulted}
//!          -> Logged -> ActivityRecorded (optional) -> Done
//! ```
//!
//! Before resolution the request is matched to a route, OPTIONS is answered,
//! the media type is checked and parameters are parsed. Every path through
//! the pipeline emits exactly one [`LogRecord`]; if the dispatch future is
//! dropped first, a guard emits it with status 499.

use std::sync::Arc;
use std::time::Instant;

use apigate_core::{
    ActivityStore, ApiError, EntityStore, FeatureGate, RequestContext, TokenStore,
    UserId,
};
use axum::http::Method;
use chrono::{DateTime, NaiveDate, Utc};
use tower::ServiceExt;

use super::activity::ActivityRecorder;
use super::authorize::ScopeAuthorizer;
use super::config::ServerConfig;
use super::context::ContextBuilder;
use super::credential::CredentialResolver;
use super::log_sink::{LogRecord, LogSink, Severity};
use super::middleware::{build_handler_pipeline, HandlerPipeline};
use super::registry::ApiRegistry;
use super::request::{ApiRequest, ApiResponse, HandlerCall};
use super::routes::{RouteLookup, RouteTable};
use crate::storage::InMemoryStore;

/// Status logged when the client goes away before the response is ready.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// External collaborators the pipeline consults.
#[derive(Clone)]
pub struct Collaborators {
    pub tokens: Arc<dyn TokenStore>,
    pub entities: Arc<dyn EntityStore>,
    pub activity: Arc<dyn ActivityStore>,
    pub features: Arc<dyn FeatureGate>,
}

impl Collaborators {
    /// Every store backed by one [`InMemoryStore`].
    #[must_use]
    pub fn in_memory(store: &Arc<InMemoryStore>, features: Arc<dyn FeatureGate>) -> Self {
        Self {
            tokens: Arc::clone(store) as Arc<dyn TokenStore>,
            entities: Arc::clone(store) as Arc<dyn EntityStore>,
            activity: Arc::clone(store) as Arc<dyn ActivityStore>,
            features,
        }
    }
}

/// How a request left the pipeline, before logging.
struct Completion {
    response: ApiResponse,
    fault: Option<ApiError>,
    /// User whose activity should be recorded; only set on `Completed`.
    active_user: Option<UserId>,
}

impl Completion {
    fn faulted(error: ApiError) -> Self {
        Self {
            response: ApiResponse::from_error(&error),
            fault: Some(error),
            active_user: None,
        }
    }

    fn answered(response: ApiResponse) -> Self {
        Self {
            response,
            fault: None,
            active_user: None,
        }
    }
}

/// Emits the request's log record exactly once: explicitly via
/// [`LogGuard::emit`], or with status 499 on drop.
struct LogGuard {
    sink: Arc<dyn LogSink>,
    clock: fn() -> DateTime<Utc>,
    method: Method,
    path: String,
    started: Instant,
    context: RequestContext,
    emitted: bool,
}

impl LogGuard {
    fn emit(&mut self, status: u16, fault: Option<String>) {
        if self.emitted {
            return;
        }
        self.emitted = true;
        let record = LogRecord {
            severity: Severity::for_status(status),
            time: (self.clock)(),
            method: self.method.to_string(),
            path: self.path.clone(),
            status,
            duration_s: self.started.elapsed().as_secs_f64(),
            context: self.context.clone(),
            fault,
        };
        self.sink.emit(&record);
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if !self.emitted {
            self.emit(CLIENT_CLOSED_REQUEST, None);
        }
    }
}

/// Composition root for API requests. Cheap to clone.
#[derive(Clone)]
pub struct DispatchPipeline {
    config: Arc<ServerConfig>,
    routes: Arc<RouteTable>,
    resolver: CredentialResolver,
    authorizer: ScopeAuthorizer,
    contexts: ContextBuilder,
    handlers: HandlerPipeline,
    activity: ActivityRecorder,
    sink: Arc<dyn LogSink>,
    clock: fn() -> DateTime<Utc>,
}

impl DispatchPipeline {
    #[must_use]
    pub fn new(
        config: ServerConfig,
        registry: ApiRegistry,
        collaborators: Collaborators,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let (routes, router) = registry.into_parts();
        let Collaborators {
            tokens,
            entities,
            activity,
            features,
        } = collaborators;
        Self {
            resolver: CredentialResolver::new(tokens, Arc::clone(&entities), &config),
            authorizer: ScopeAuthorizer::new(features),
            contexts: ContextBuilder::new(entities),
            handlers: build_handler_pipeline(router, &config),
            activity: ActivityRecorder::new(activity),
            routes: Arc::new(routes),
            config: Arc::new(config),
            sink,
            clock: Utc::now,
        }
    }

    /// Replaces the wall clock, e.g. to pin "today" in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    fn today(&self) -> NaiveDate {
        (self.clock)().date_naive()
    }

    /// Runs `request` through every stage and returns the response.
    ///
    /// Never fails: every outcome, including handler panics, becomes a
    /// response, and every outcome is logged once before returning.
    pub async fn dispatch(&self, request: ApiRequest) -> ApiResponse {
        let mut guard = LogGuard {
            sink: Arc::clone(&self.sink),
            clock: self.clock,
            method: request.method.clone(),
            path: request.path().to_string(),
            started: Instant::now(),
            context: ContextBuilder::initial(&request, &self.routes.catch_all_template()),
            emitted: false,
        };

        let completion = self.run(&request, &mut guard.context).await;

        if let Some(ApiError::InternalFault(error)) = &completion.fault {
            tracing::error!(
                correlation_id = %request.correlation_id,
                error = ?error,
                "unhandled fault while serving api request"
            );
        }
        let fault = completion.fault.as_ref().map(ToString::to_string);
        guard.emit(completion.response.status.as_u16(), fault);

        if let Some(user) = completion.active_user {
            self.activity.spawn_record(user, self.today());
        }
        completion.response
    }

    async fn run(&self, request: &ApiRequest, context: &mut RequestContext) -> Completion {
        let (route, route_params) = match self.routes.lookup(&request.method, request.path()) {
            RouteLookup::Matched { route, params } => (route, params),
            RouteLookup::MethodNotAllowed { template, allowed } => {
                context.set_route(template);
                if request.method == Method::OPTIONS {
                    return Completion::answered(ApiResponse::options(allowed));
                }
                return Completion::faulted(ApiError::MethodNotAllowed {
                    method: request.method.clone(),
                    allowed,
                });
            }
            RouteLookup::NotFound => return Completion::faulted(ApiError::not_found("")),
        };
        context.set_route(route.template());

        if request.has_body() {
            match request.content_type() {
                Some(content_type) if self.config.accepts_media_type(content_type) => {}
                other => {
                    return Completion::faulted(ApiError::UnsupportedMediaType {
                        content_type: other.unwrap_or("none").to_string(),
                    });
                }
            }
        }
        let params = match request.parse_params().await {
            Ok(params) => params,
            Err(error) => return Completion::faulted(error),
        };
        ContextBuilder::identify_route(context, route);

        // Received -> Resolved
        let credential = match self.resolver.resolve(request, &params, self.today()).await {
            Ok(credential) => credential,
            Err(error) => {
                if let ApiError::Unauthenticated { reason } = &error {
                    tracing::debug!(
                        correlation_id = %request.correlation_id,
                        reason = reason.as_str(),
                        "credential rejected"
                    );
                }
                return Completion::faulted(error);
            }
        };
        ContextBuilder::identify_caller(context, &credential);

        // Resolved -> Authorized
        let descriptor = route.descriptor();
        if let Err(error) = self
            .authorizer
            .authorize(&credential, descriptor, &request.method)
            .into_result()
        {
            return Completion::faulted(error);
        }
        self.contexts
            .enrich(context, &credential, descriptor, &route_params)
            .await;

        // Authorized -> HandlerExecuting -> Completed | Faulted
        let active_user = credential.user_id();
        let call = HandlerCall {
            route_key: Arc::clone(route.caller_id()),
            method: request.method.clone(),
            credential: Arc::new(credential),
            context: context.clone(),
            params,
            route_params,
        };
        match self.handlers.clone().oneshot(call).await {
            Ok(response) => Completion {
                response: response.into(),
                fault: None,
                active_user,
            },
            Err(error) => Completion::faulted(error),
        }
    }
}
