//! Error taxonomy for the request pipeline.
//!
//! Each variant maps to exactly one HTTP status. Client-facing bodies are
//! generic; the `Display` text (which may carry internal detail) is for logs.

use http::{Method, StatusCode};
use serde_json::{json, Value};

use crate::credential::AuthFailure;
use crate::scope::Scope;

/// Errors produced by pipeline stages and handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthenticated: {reason}")]
    Unauthenticated { reason: AuthFailure },
    #[error("insufficient scope: requires {required}")]
    InsufficientScope { required: Scope },
    #[error("forbidden")]
    Forbidden,
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("method {method} not allowed")]
    MethodNotAllowed { method: Method, allowed: Vec<Method> },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("unsupported media type: {content_type}")]
    UnsupportedMediaType { content_type: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("handler timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("feature {flag} is disabled")]
    ServiceUnavailable { flag: String },
    #[error("server overloaded, try again later")]
    Overloaded,
    #[error("internal fault: {0}")]
    InternalFault(#[from] anyhow::Error),
}

impl ApiError {
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope { .. } | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Self::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Self::ServiceUnavailable { .. } | Self::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated { .. } => "unauthenticated",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::Forbidden => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::BadRequest(_) => "bad_request",
            Self::ValidationFailed(_) => "validation_failed",
            Self::UnsupportedMediaType { .. } => "unsupported_media_type",
            Self::Conflict(_) => "conflict",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::Timeout { .. } => "timeout",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Overloaded => "overloaded",
            Self::InternalFault(_) => "internal_fault",
        }
    }

    /// JSON body safe to return to the client.
    ///
    /// Authentication reasons and internal fault messages are never included.
    #[must_use]
    pub fn client_body(&self) -> Value {
        let status = self.status();
        let status_line = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Error")
        );
        match self {
            Self::InsufficientScope { required } => json!({
                "error": "insufficient_scope",
                "error_description":
                    "The request requires higher privileges than provided by the access token.",
                "scope": required.as_str(),
            }),
            Self::NotFound { resource } if resource.is_empty() => {
                json!({ "error": "404 Not Found" })
            }
            Self::NotFound { resource } => {
                json!({ "message": format!("404 {resource} Not Found") })
            }
            Self::BadRequest(detail) | Self::ValidationFailed(detail) | Self::Conflict(detail) => {
                json!({ "message": format!("{status_line} - {detail}") })
            }
            _ => json!({ "message": status_line }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        let cases = [
            (
                ApiError::Unauthenticated {
                    reason: AuthFailure::Revoked,
                },
                401,
            ),
            (
                ApiError::InsufficientScope {
                    required: Scope::API,
                },
                403,
            ),
            (ApiError::not_found("Project"), 404),
            (ApiError::BadRequest("name is missing".into()), 400),
            (ApiError::ValidationFailed("name is taken".into()), 422),
            (
                ApiError::UnsupportedMediaType {
                    content_type: "image/png".into(),
                },
                415,
            ),
            (ApiError::Conflict("exists".into()), 409),
            (ApiError::PreconditionFailed("etag".into()), 412),
            (ApiError::InternalFault(anyhow::anyhow!("boom")), 500),
        ];
        for (error, status) in cases {
            assert_eq!(error.status().as_u16(), status, "{error}");
        }
    }

    #[test]
    fn unauthenticated_body_hides_reason() {
        let error = ApiError::Unauthenticated {
            reason: AuthFailure::Revoked,
        };
        assert_eq!(error.client_body(), json!({ "message": "401 Unauthorized" }));
    }

    #[test]
    fn internal_fault_body_hides_message() {
        let error = ApiError::InternalFault(anyhow::anyhow!("database password is hunter2"));
        let body = error.client_body().to_string();
        assert!(!body.contains("hunter2"));
        assert!(body.contains("500 Internal Server Error"));
    }

    #[test]
    fn insufficient_scope_names_required_scope() {
        let error = ApiError::InsufficientScope {
            required: Scope::API,
        };
        let body = error.client_body();
        assert_eq!(body["error"], "insufficient_scope");
        assert_eq!(body["scope"], "api");
    }
}
