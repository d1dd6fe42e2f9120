//! Scope authorization: decides whether a resolved credential may call a
//! route with a given method, before any object-level permission check.

use std::sync::Arc;

use apigate_core::{
    is_read_method, ApiError, AuthFailure, AuthMethod, AuthRequirement, Credential,
    DeployCredential, FeatureGate, RouteDescriptor, Scope, UserCredential,
};
use axum::http::Method;

/// Outcome of [`ScopeAuthorizer::authorize`].
#[derive(Debug)]
pub enum Decision {
    Allow,
    Deny(ApiError),
}

impl Decision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Converts a denial into an error for `?` propagation.
    ///
    /// # Errors
    ///
    /// Returns the denial reason.
    pub fn into_result(self) -> Result<(), ApiError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(error) => Err(error),
        }
    }
}

fn insufficient(required: Scope) -> Decision {
    Decision::Deny(ApiError::InsufficientScope { required })
}

/// Stateless scope check with an injected feature-flag predicate.
#[derive(Clone)]
pub struct ScopeAuthorizer {
    features: Arc<dyn FeatureGate>,
}

impl ScopeAuthorizer {
    #[must_use]
    pub fn new(features: Arc<dyn FeatureGate>) -> Self {
        Self { features }
    }

    /// Decision order:
    /// 1. anonymous on an auth-required route: 401
    /// 2. deploy token on a route accepting none: 401
    /// 3. route behind a disabled feature flag: 503
    /// 4. user and deploy-token scope checks: 403 on mismatch
    /// 5. anonymous on an optional route: allow
    #[must_use]
    pub fn authorize(
        &self,
        credential: &Credential,
        route: &RouteDescriptor,
        method: &Method,
    ) -> Decision {
        match credential {
            Credential::Anonymous if route.auth() == AuthRequirement::Required => {
                return Decision::Deny(ApiError::Unauthenticated {
                    reason: AuthFailure::Missing,
                });
            }
            Credential::DeployToken(_) if !route.accepts_deploy_tokens() => {
                return Decision::Deny(ApiError::Unauthenticated {
                    reason: AuthFailure::NotAccepted,
                });
            }
            _ => {}
        }

        if let Some(flag) = route.flag() {
            if !self.features.is_enabled(flag) {
                return Decision::Deny(ApiError::ServiceUnavailable {
                    flag: flag.to_string(),
                });
            }
        }

        match credential {
            Credential::Anonymous => Decision::Allow,
            Credential::User(user) => Self::authorize_user(user, route, method),
            Credential::DeployToken(token) => Self::authorize_deploy_token(token, route, method),
        }
    }

    fn authorize_user(user: &UserCredential, route: &RouteDescriptor, method: &Method) -> Decision {
        if user.method == AuthMethod::Session || user.scopes.contains(&Scope::API) {
            return Decision::Allow;
        }
        if is_read_method(method)
            && (user.scopes.contains(&Scope::READ_API)
                || user.scopes.contains_any(route.extra_read_scopes()))
        {
            return Decision::Allow;
        }
        let required = if is_read_method(method) {
            Scope::READ_API
        } else {
            route.required_scope()
        };
        insufficient(required)
    }

    fn authorize_deploy_token(
        token: &DeployCredential,
        route: &RouteDescriptor,
        method: &Method,
    ) -> Decision {
        let accepted = route.accepted_deploy_scopes();
        if is_read_method(method) {
            if token.scopes.contains_any(accepted) {
                return Decision::Allow;
            }
            return insufficient(accepted.first().cloned().unwrap_or(Scope::READ_API));
        }

        if accepted
            .iter()
            .any(|scope| scope.grants_write() && token.scopes.contains(scope))
        {
            return Decision::Allow;
        }
        let required = accepted.iter().find(|scope| scope.grants_write()).cloned();
        insufficient(required.unwrap_or(Scope::API))
    }
}
