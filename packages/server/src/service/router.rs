//! Handler routing: dispatches a [`HandlerCall`] to the endpoint handler
//! registered for its route key.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use apigate_core::ApiError;
use async_trait::async_trait;
use tokio::task::{JoinError, JoinHandle};
use tower::Service;

use super::request::{HandlerCall, HandlerResponse};

/// Boxed future returned by every service in the handler stack.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<HandlerResponse, ApiError>> + Send>>;

/// An endpoint's business logic.
///
/// Receives the resolved credential, the request context, raw params and
/// route params. Object-level permission checks (404 vs 403) belong here.
#[async_trait]
pub trait ApiHandler: Send + Sync {
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, ApiError>;
}

/// Routes calls by `route_key` (the caller id, `"<METHOD> <template>"`).
///
/// Each call runs on its own task so that a panicking handler surfaces as
/// `ApiError::InternalFault` instead of unwinding through the pipeline. The
/// task is aborted when the call's future is dropped (timeout, shed caller,
/// client disconnect), so a handler never outlives its call.
#[derive(Clone, Default)]
pub struct HandlerRouter {
    handlers: Arc<HashMap<Arc<str>, Arc<dyn ApiHandler>>>,
}

impl HandlerRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `route_key`, replacing any previous handler.
    pub fn register(&mut self, route_key: Arc<str>, handler: Arc<dyn ApiHandler>) {
        Arc::make_mut(&mut self.handlers).insert(route_key, handler);
    }

    #[must_use]
    pub fn contains(&self, route_key: &str) -> bool {
        self.handlers.contains_key(route_key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRouter")
            .field("routes", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Service<HandlerCall> for HandlerRouter {
    type Response = HandlerResponse;
    type Error = ApiError;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: HandlerCall) -> Self::Future {
        let Some(handler) = self.handlers.get(&call.route_key).cloned() else {
            let route_key = Arc::clone(&call.route_key);
            return Box::pin(async move {
                Err(ApiError::InternalFault(anyhow::anyhow!(
                    "no handler registered for {route_key}"
                )))
            });
        };

        Box::pin(async move {
            let task = AbortOnDrop(tokio::spawn(async move { handler.handle(call).await }));
            match task.await {
                Ok(result) => result,
                Err(join_error) => Err(ApiError::InternalFault(anyhow::anyhow!(
                    "handler task failed: {}",
                    describe_join_error(join_error)
                ))),
            }
        })
    }
}

/// Aborts the wrapped task when dropped before completion.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn describe_join_error(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use apigate_core::{Credential, RequestContext};
    use axum::http::Method;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    struct Echo(&'static str);

    #[async_trait]
    impl ApiHandler for Echo {
        async fn handle(&self, _call: HandlerCall) -> Result<HandlerResponse, ApiError> {
            Ok(HandlerResponse::ok(json!({ "handler": self.0 })))
        }
    }

    struct Panics;

    #[async_trait]
    impl ApiHandler for Panics {
        async fn handle(&self, _call: HandlerCall) -> Result<HandlerResponse, ApiError> {
            panic!("boom");
        }
    }

    struct DelayedWrite(Arc<AtomicBool>);

    #[async_trait]
    impl ApiHandler for DelayedWrite {
        async fn handle(&self, _call: HandlerCall) -> Result<HandlerResponse, ApiError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.0.store(true, Ordering::SeqCst);
            Ok(HandlerResponse::no_content())
        }
    }

    fn call(route_key: &str) -> HandlerCall {
        HandlerCall::new(
            Arc::from(route_key),
            Method::GET,
            Arc::new(Credential::Anonymous),
            RequestContext::new("cid", "127.0.0.1", "/api/:version/x"),
        )
    }

    #[tokio::test]
    async fn routes_to_correct_handler_among_multiple() {
        let mut router = HandlerRouter::new();
        router.register(Arc::from("GET /api/:version/a"), Arc::new(Echo("a")));
        router.register(Arc::from("GET /api/:version/b"), Arc::new(Echo("b")));

        let resp = router
            .clone()
            .oneshot(call("GET /api/:version/b"))
            .await
            .unwrap();
        assert_eq!(resp, HandlerResponse::ok(json!({ "handler": "b" })));
    }

    #[tokio::test]
    async fn missing_handler_is_internal_fault() {
        let router = HandlerRouter::new();
        let err = router.oneshot(call("GET /api/:version/none")).await.unwrap_err();
        assert!(matches!(err, ApiError::InternalFault(_)));
    }

    #[tokio::test]
    async fn panicking_handler_becomes_internal_fault() {
        let mut router = HandlerRouter::new();
        router.register(Arc::from("GET /api/:version/x"), Arc::new(Panics));
        let err = router.oneshot(call("GET /api/:version/x")).await.unwrap_err();
        assert!(matches!(err, ApiError::InternalFault(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn dropping_the_call_aborts_the_handler() {
        let written = Arc::new(AtomicBool::new(false));
        let mut router = HandlerRouter::new();
        router.register(
            Arc::from("GET /api/:version/x"),
            Arc::new(DelayedWrite(Arc::clone(&written))),
        );

        let pending = router.oneshot(call("GET /api/:version/x"));
        let outcome = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!written.load(Ordering::SeqCst));
    }
}
