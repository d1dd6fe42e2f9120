//! Ingress for every route under the API prefix.
//!
//! Turns the axum request into an [`ApiRequest`] and hands it to the
//! dispatch pipeline, which owns routing, authentication and logging.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::response::{IntoResponse, Response};

use super::AppState;
use crate::network::middleware::REQUEST_ID_HEADER;
use crate::service::ApiRequest;

/// Reads the body up to the configured limit and dispatches the request.
///
/// An oversized or unreadable body is not answered here: it is recorded on
/// the request so the pipeline can reject it after routing, and log it.
pub async fn api_handler(State(state): State<AppState>, request: Request) -> Response {
    let _in_flight = state.shutdown.in_flight_guard();
    let (parts, body) = request.into_parts();

    let remote_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string());
    let correlation_id = parts
        .headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);

    let limit = state.pipeline.config().body_limit;
    let (body, body_error) = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => (bytes, None),
        Err(e) => (Bytes::new(), Some(format!("request body could not be read: {e}"))),
    };

    let request = ApiRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
        body_error,
        remote_ip,
        correlation_id,
    };
    state.pipeline.dispatch(request).await.into_response()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use apigate_core::{FeatureCategory, RouteDescriptor};
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use axum::routing::any;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;
    use crate::network::ShutdownController;
    use crate::service::domain::broadcast::ListBroadcastMessages;
    use crate::service::{
        ApiRegistry, Collaborators, DispatchPipeline, FeatureFlags, RecordingLogSink,
        ServerConfig,
    };
    use crate::storage::InMemoryStore;

    fn pipeline_with_sink(sink: Arc<RecordingLogSink>) -> DispatchPipeline {
        let config = ServerConfig {
            body_limit: 16,
            ..ServerConfig::default()
        };
        let mut registry = ApiRegistry::new(&config);
        registry.route(
            RouteDescriptor::get("/broadcast_messages", FeatureCategory::ONBOARDING)
                .allow_anonymous(),
            Arc::new(ListBroadcastMessages::default()),
        );
        registry.route(
            RouteDescriptor::post("/broadcast_messages", FeatureCategory::ONBOARDING)
                .allow_anonymous(),
            Arc::new(ListBroadcastMessages::default()),
        );
        let store = Arc::new(InMemoryStore::new());
        let collaborators = Collaborators::in_memory(&store, Arc::new(FeatureFlags::default()));
        DispatchPipeline::new(config, registry, collaborators, sink)
    }

    pub(crate) fn test_state() -> AppState {
        AppState {
            pipeline: pipeline_with_sink(Arc::new(RecordingLogSink::new())),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        }
    }

    fn app(sink: Arc<RecordingLogSink>) -> Router {
        let state = AppState {
            pipeline: pipeline_with_sink(sink),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        };
        Router::new()
            .route("/api/{*path}", any(api_handler))
            .with_state(state)
    }

    #[tokio::test]
    async fn uses_request_id_header_and_peer_address() {
        let sink = Arc::new(RecordingLogSink::new());
        let mut request = Request::builder()
            .uri("/api/v4/broadcast_messages")
            .header(REQUEST_ID_HEADER, "req-123")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4242))));

        let response = app(Arc::clone(&sink)).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let record = sink.last().unwrap();
        assert_eq!(record.attribute("correlation_id"), Some("req-123"));
        assert_eq!(record.attribute("meta.remote_ip"), Some("10.0.0.7"));
    }

    #[tokio::test]
    async fn missing_peer_address_is_unknown() {
        let sink = Arc::new(RecordingLogSink::new());
        let request = Request::builder()
            .uri("/api/v4/broadcast_messages")
            .body(Body::empty())
            .unwrap();

        app(Arc::clone(&sink)).oneshot(request).await.unwrap();

        let record = sink.last().unwrap();
        assert_eq!(record.attribute("meta.remote_ip"), Some("unknown"));
        assert!(!record.attribute("correlation_id").unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_and_logged() {
        let sink = Arc::new(RecordingLogSink::new());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v4/broadcast_messages")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"message":"this body is far too long"}"#))
            .unwrap();

        let response = app(Arc::clone(&sink)).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.last().unwrap().status, 400);
    }
}
