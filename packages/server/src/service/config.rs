use std::collections::BTreeMap;
use std::time::Duration;

/// Pipeline-level configuration for the API dispatcher.
///
/// Controls route prefixing, accepted credentials and media types, handler
/// concurrency and timeouts, and feature flags.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path prefix in front of the version segment.
    pub api_prefix: String,
    /// Accepted values for the `:version` segment.
    pub api_versions: Vec<String>,
    /// Header carrying a deploy token.
    pub deploy_token_header: String,
    /// Cookie carrying a browser session id.
    pub session_cookie: String,
    /// `Content-Type` values accepted on requests with a body.
    pub accepted_media_types: Vec<String>,
    /// Maximum time a handler may run.
    pub handler_timeout: Duration,
    /// Maximum number of handlers running at once before load shedding.
    pub max_concurrent_handlers: u32,
    /// Maximum accepted request body in bytes.
    pub body_limit: usize,
    /// Explicit feature flag states. Flags not listed are enabled.
    pub feature_flags: BTreeMap<String, bool>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_prefix: "/api".to_string(),
            api_versions: vec!["v4".to_string()],
            deploy_token_header: "deploy-token".to_string(),
            session_cookie: "_apigate_session".to_string(),
            accepted_media_types: vec![
                "application/json".to_string(),
                "application/x-www-form-urlencoded".to_string(),
                "multipart/form-data".to_string(),
            ],
            handler_timeout: Duration::from_secs(60),
            max_concurrent_handlers: 1000,
            body_limit: 2 * 1024 * 1024,
            feature_flags: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    /// Checks the invariants the dispatcher relies on.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api_prefix.starts_with('/') || self.api_prefix.ends_with('/') {
            return Err(ConfigError::InvalidPrefix(self.api_prefix.clone()));
        }
        if self.api_versions.is_empty() {
            return Err(ConfigError::NoVersions);
        }
        if self.max_concurrent_handlers == 0 {
            return Err(ConfigError::ZeroLimit("max_concurrent_handlers"));
        }
        if self.body_limit == 0 {
            return Err(ConfigError::ZeroLimit("body_limit"));
        }
        if self.handler_timeout.is_zero() {
            return Err(ConfigError::ZeroLimit("handler_timeout"));
        }
        Ok(())
    }

    /// Whether `content_type` (parameters ignored) is accepted for bodies.
    #[must_use]
    pub fn accepts_media_type(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.accepted_media_types.iter().any(|m| *m == essence)
    }
}

/// Invalid [`ServerConfig`] values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api prefix must start with '/' and not end with one: {0:?}")]
    InvalidPrefix(String),
    #[error("at least one api version must be configured")]
    NoVersions,
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
}
