//! Transport-level Tower middleware applied to every HTTP request.
//!
//! Authentication, authorization and API logging are not done here; they
//! belong to the dispatch pipeline behind the API route.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{HeaderName, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower::{service_fn, Layer, ServiceBuilder, ServiceExt};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;

/// Header carrying the correlation id, set here when the client sent none.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wraps `router` in the HTTP middleware stack.
///
/// **Ordering (outermost to innermost):**
/// 1. `SetRequestId`: keeps the client's `X-Request-Id` or assigns a UUID v4
/// 2. `Tracing`: request/response spans
/// 3. `Compression`: gzip responses
/// 4. `CORS`: configured origins; preflights still reach the API
/// 5. `Timeout`: 408 once `request_timeout` passes
/// 6. `PropagateRequestId`: echoes `X-Request-Id` on the response
pub fn with_http_layers<S>(router: Router<S>, config: &NetworkConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let cors = build_cors_layer(&config.cors_origins);

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(middleware::from_fn_with_state(cors, cors_preflight))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                config.request_timeout,
            ))
            .layer(PropagateRequestIdLayer::new(x_request_id)),
    )
}

/// A CORS preflight: OPTIONS carrying `Origin` and
/// `Access-Control-Request-Method`.
fn is_preflight(request: &Request) -> bool {
    request.method() == Method::OPTIONS
        && request.headers().contains_key(ORIGIN)
        && request.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

/// Applies CORS around the API.
///
/// Every OPTIONS request reaches the API so it is logged and answered with
/// its `Allow` list; a preflight additionally carries the CORS headers the
/// layer would have answered with.
async fn cors_preflight(State(cors): State<CorsLayer>, request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return match cors.layer(next).oneshot(request).await {
            Ok(response) => response.into_response(),
            Err(never) => match never {},
        };
    }
    if !is_preflight(&request) {
        return next.run(request).await;
    }

    let cors_headers = preflight_headers(&cors, request.uri(), request.headers()).await;
    let mut response = next.run(request).await;
    response.headers_mut().extend(cors_headers);
    response
}

/// The headers `cors` answers a preflight for `request` with.
async fn preflight_headers(cors: &CorsLayer, uri: &Uri, headers: &HeaderMap) -> HeaderMap {
    let mut preflight = Request::new(Body::empty());
    *preflight.method_mut() = Method::OPTIONS;
    *preflight.uri_mut() = uri.clone();
    *preflight.headers_mut() = headers.clone();

    let unreachable = service_fn(|_: Request| async {
        Ok::<_, Infallible>(Response::new(Body::empty()))
    });
    match cors.layer(unreachable).oneshot(preflight).await {
        Ok(response) => response.into_parts().0.headers,
        Err(never) => match never {},
    }
}

/// A wildcard `"*"` allows any origin; otherwise unparsable origins are skipped.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use axum::http::header::{ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW};
    use axum::routing::any;

    use super::*;

    fn app() -> Router {
        let router = Router::new().route(
            "/api/{*path}",
            any(|| async { (StatusCode::NO_CONTENT, [(ALLOW, "GET, OPTIONS")]) }),
        );
        with_http_layers(router, &NetworkConfig::default())
    }

    #[tokio::test]
    async fn plain_options_reaches_the_handler() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v4/user")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ALLOW], "GET, OPTIONS");
    }

    #[tokio::test]
    async fn preflight_reaches_the_handler_with_cors_headers() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v4/user")
            .header(ORIGIN, "https://example.com")
            .header(ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ALLOW], "GET, OPTIONS");
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let methods = response.headers()[ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        assert!(methods.contains("PUT"), "{methods}");
    }

    #[tokio::test]
    async fn simple_requests_get_cors_headers() {
        let request = Request::get("/api/v4/user")
            .header(ORIGIN, "https://example.com")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn request_id_is_assigned_and_echoed() {
        let request = Request::get("/api/v4/user").body(Body::empty()).unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn listed_origins_are_allowed_and_invalid_ones_skipped() {
        let config = NetworkConfig {
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "not a valid origin\n".to_string(),
            ],
            ..NetworkConfig::default()
        };
        let router = Router::new().route("/api/{*path}", any(|| async { StatusCode::OK }));
        let app = with_http_layers(router, &config);

        let allowed = Request::get("/api/v4/user")
            .header(ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(allowed).await.unwrap();
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );

        let other = Request::get("/api/v4/user")
            .header(ORIGIN, "https://elsewhere.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(other).await.unwrap();
        assert!(!response.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
