//! Axum handlers and the state they share.

pub mod api;
pub mod health;

pub use api::api_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::service::DispatchPipeline;

/// Shared state handed to every axum handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Runs API requests end to end.
    pub pipeline: DispatchPipeline,
    pub shutdown: Arc<ShutdownController>,
    /// Server process start time, for uptime.
    pub start_time: Instant,
}
