//! Tower middleware layers wrapped around handler invocation.
//!
//! - [`load_shed`]: semaphore-based concurrency limiting
//! - [`timeout`]: per-call timeout enforcement
//! - [`metrics`]: call timing and outcome via `tracing` spans
//! - [`pipeline`]: composes the layers around the [`HandlerRouter`](super::router::HandlerRouter)

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_handler_pipeline, HandlerPipeline};
pub use timeout::TimeoutLayer;
