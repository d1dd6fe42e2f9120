//! Composes the handler middleware around the [`HandlerRouter`].

use tower::ServiceBuilder;

use super::load_shed::{LoadShedLayer, LoadShedService};
use super::metrics::{MetricsLayer, MetricsService};
use super::timeout::{TimeoutLayer, TimeoutService};
use crate::service::config::ServerConfig;
use crate::service::router::HandlerRouter;

/// The assembled handler stack. Cheap to clone; clones share the load-shed
/// semaphore and the handler table.
pub type HandlerPipeline = LoadShedService<TimeoutService<MetricsService<HandlerRouter>>>;

/// Wrap `router` with the handler middleware.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded before doing any work
/// 2. `TimeoutLayer` -- enforce `handler_timeout`
/// 3. `MetricsLayer` -- timing and outcome, closest to the handler
#[must_use]
pub fn build_handler_pipeline(router: HandlerRouter, config: &ServerConfig) -> HandlerPipeline {
    ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_handlers))
        .layer(TimeoutLayer::new(config.handler_timeout))
        .layer(MetricsLayer)
        .service(router)
}
