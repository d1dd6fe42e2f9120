//! Metrics middleware for handler calls.
//!
//! Records call duration and outcome on a `tracing` span rather than through
//! a metrics crate.

use std::task::{Context, Poll};
use std::time::Instant;

use apigate_core::ApiError;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::request::{HandlerCall, HandlerResponse};
use crate::service::router::HandlerFuture;

#[derive(Debug, Clone, Copy)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<HandlerCall> for MetricsService<S>
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
        let span = info_span!(
            "handler",
            route = %call.route_key,
            correlation_id = call.context.correlation_id(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(call);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(e) => e.kind(),
                };
                let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                let span = tracing::Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", outcome);

                tracing::debug!(duration_ms, outcome, "handler complete");
                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::service::middleware::test_support::{make_call, SlowService};

    #[tokio::test]
    async fn passes_through_response() {
        let svc = MetricsLayer.layer(SlowService { delay_ms: 0 });
        let resp = svc.oneshot(make_call()).await.unwrap();
        assert_eq!(resp, HandlerResponse::no_content());
    }
}
