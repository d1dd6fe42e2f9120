//! Timeout middleware for handler calls.

use std::task::{Context, Poll};
use std::time::Duration;

use apigate_core::ApiError;
use tower::{Layer, Service};

use crate::service::request::{HandlerCall, HandlerResponse};
use crate::service::router::HandlerFuture;

/// Tower layer that fails calls running longer than `timeout` with
/// `ApiError::Timeout`.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutLayer {
    timeout: Duration,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            timeout: self.timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    timeout: Duration,
}

impl<S> Service<HandlerCall> for TimeoutService<S>
where
    S: Service<HandlerCall, Response = HandlerResponse, Error = ApiError> + Send,
    S::Future: Send + 'static,
{
    type Response = HandlerResponse;
    type Error = ApiError;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: HandlerCall) -> Self::Future {
        let timeout = self.timeout;
        let fut = self.inner.call(call);
        Box::pin(async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_elapsed) => Err(ApiError::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::service::middleware::test_support::{make_call, SlowService};

    #[tokio::test]
    async fn completes_within_timeout() {
        let svc = TimeoutLayer::new(Duration::from_secs(1)).layer(SlowService { delay_ms: 10 });
        let resp = svc.oneshot(make_call()).await.unwrap();
        assert_eq!(resp, HandlerResponse::no_content());
    }

    #[tokio::test]
    async fn times_out_slow_call() {
        let svc =
            TimeoutLayer::new(Duration::from_millis(10)).layer(SlowService { delay_ms: 5000 });
        let err = svc.oneshot(make_call()).await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout { timeout_ms: 10 }));
    }
}
