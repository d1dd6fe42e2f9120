//! Demo endpoint handlers backed by the in-memory store.
//!
//! These exist so the pipeline can be exercised end to end; they cover a few
//! representative shapes (anonymous reads, entity-bound reads and writes,
//! deploy-token package downloads, a feature-gated admin listing) rather than
//! a full resource API.

pub mod broadcast;
pub mod deploy_tokens;
pub mod groups;
pub mod projects;
pub mod users;

use std::sync::Arc;

use apigate_core::{
    ApiError, Credential, EntityBinding, FeatureCategory, RouteDescriptor, Scope, UserCredential,
};
use serde_json::Value;

use crate::service::registry::ApiRegistry;
use crate::service::request::ApiParams;
use crate::storage::InMemoryStore;

pub use broadcast::{BroadcastMessage, ListBroadcastMessages};

/// Feature flag gating the deploy token listing.
pub const DEPLOY_TOKENS_API_FLAG: &str = "deploy_tokens_api";

/// The caller as a user, or 401 for anyone else.
pub(crate) fn require_user(credential: &Credential) -> Result<&UserCredential, ApiError> {
    match credential {
        Credential::User(user) => Ok(user),
        _ => Err(ApiError::Unauthenticated {
            reason: apigate_core::AuthFailure::Missing,
        }),
    }
}

/// A required, non-empty string parameter.
pub(crate) fn required_param<'a>(params: &'a ApiParams, name: &str) -> Result<&'a str, ApiError> {
    match params.get(name) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.as_str()),
        _ => Err(ApiError::BadRequest(format!("{name} is missing"))),
    }
}

pub(crate) fn optional_param<'a>(params: &'a ApiParams, name: &str) -> Option<&'a str> {
    match params.get(name) {
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.as_str()),
        _ => None,
    }
}

/// Registers every demo endpoint.
pub fn register_default_routes(registry: &mut ApiRegistry, store: &Arc<InMemoryStore>) {
    registry.route(
        RouteDescriptor::get("/broadcast_messages", FeatureCategory::ONBOARDING).allow_anonymous(),
        Arc::new(ListBroadcastMessages::default()),
    );

    registry.route(
        RouteDescriptor::get("/groups", FeatureCategory::GROUPS_AND_PROJECTS).allow_anonymous(),
        Arc::new(groups::ListGroups::new(Arc::clone(store))),
    );
    registry.route(
        RouteDescriptor::post("/groups", FeatureCategory::GROUPS_AND_PROJECTS),
        Arc::new(groups::CreateGroup::new(Arc::clone(store))),
    );
    registry.route(
        RouteDescriptor::put("/groups/:id", FeatureCategory::GROUPS_AND_PROJECTS)
            .bound_to(EntityBinding::Group),
        Arc::new(groups::UpdateGroup::new(Arc::clone(store))),
    );
    registry.route(
        RouteDescriptor::delete("/groups/:id", FeatureCategory::GROUPS_AND_PROJECTS)
            .bound_to(EntityBinding::Group),
        Arc::new(groups::DeleteGroup::new(Arc::clone(store))),
    );

    let issues = Arc::new(projects::ProjectIssues::new(Arc::clone(store)));
    registry.route(
        RouteDescriptor::get("/projects/:id/issues", FeatureCategory::TEAM_PLANNING)
            .allow_anonymous()
            .bound_to(EntityBinding::Project),
        issues.clone(),
    );
    registry.route(
        RouteDescriptor::post("/projects/:id/issues", FeatureCategory::TEAM_PLANNING)
            .bound_to(EntityBinding::Project),
        issues,
    );

    let packages = Arc::new(projects::MavenPackages::new(Arc::clone(store)));
    registry.route(
        RouteDescriptor::get(
            "/projects/:id/packages/maven/:file",
            FeatureCategory::PACKAGE_REGISTRY,
        )
        .allow_anonymous()
        .bound_to(EntityBinding::Project)
        .deploy_scopes([Scope::READ_PACKAGE_REGISTRY, Scope::WRITE_PACKAGE_REGISTRY]),
        packages.clone(),
    );
    registry.route(
        RouteDescriptor::put(
            "/projects/:id/packages/maven/:file",
            FeatureCategory::PACKAGE_REGISTRY,
        )
        .bound_to(EntityBinding::Project)
        .deploy_scopes([Scope::READ_PACKAGE_REGISTRY, Scope::WRITE_PACKAGE_REGISTRY]),
        packages,
    );

    registry.route(
        RouteDescriptor::get("/user", FeatureCategory::USER_PROFILE),
        Arc::new(users::CurrentUser::new(Arc::clone(store))),
    );
    registry.route(
        RouteDescriptor::get("/users", FeatureCategory::USERS),
        Arc::new(users::ListUsers::new(Arc::clone(store))),
    );
    registry.route(
        RouteDescriptor::get("/users/:id", FeatureCategory::USERS).bound_to(EntityBinding::User),
        Arc::new(users::ShowUser::new(Arc::clone(store))),
    );
    registry.route(
        RouteDescriptor::put("/users/:id", FeatureCategory::USER_PROFILE)
            .bound_to(EntityBinding::User),
        Arc::new(users::UpdateUser::new(Arc::clone(store))),
    );
    registry.route(
        RouteDescriptor::get("/events", FeatureCategory::USERS).read_scopes([Scope::READ_USER]),
        Arc::new(users::ListEvents),
    );

    registry.route(
        RouteDescriptor::get("/deploy_tokens", FeatureCategory::CONTINUOUS_DELIVERY)
            .feature_flag(DEPLOY_TOKENS_API_FLAG),
        Arc::new(deploy_tokens::ListDeployTokens::new(Arc::clone(store))),
    );
}
