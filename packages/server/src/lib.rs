//! `apigate` server: an authenticated, scope-checked API gateway over axum.
//!
//! Every request under the API prefix runs through one dispatch pipeline
//! that resolves the caller, authorizes the route, runs the handler and
//! emits exactly one structured log record.

pub mod network;
pub mod service;
pub mod storage;
