//! Load-shedding middleware for handler calls.
//!
//! Rejects calls with `ApiError::Overloaded` when `max_concurrent_handlers`
//! are already running.

use std::sync::Arc;
use std::task::{Context, Poll};

use apigate_core::ApiError;
use tokio::sync::Semaphore;
use tower::{Layer, Service};

use crate::service::request::{HandlerCall, HandlerResponse};
use crate::service::router::HandlerFuture;

/// Tower layer that limits concurrent handler calls via a semaphore.
///
/// Calls arriving while every permit is taken are rejected, not queued.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    semaphore: Arc<Semaphore>,
}

impl LoadShedLayer {
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent as usize)),
        }
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            semaphore: Arc::clone(&self.semaphore),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    semaphore: Arc<Semaphore>,
}

impl<S> Service<HandlerCall> for LoadShedService<S>
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
        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
            tracing::warn!(route = %call.route_key, "handler capacity exhausted, shedding call");
            return Box::pin(async { Err(ApiError::Overloaded) });
        };

        let fut = self.inner.call(call);
        Box::pin(async move {
            let result = fut.await;
            drop(permit);
            result
        })
    }
}
