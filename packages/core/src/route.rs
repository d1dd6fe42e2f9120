//! Static endpoint metadata.
//!
//! Every endpoint registers one [`RouteDescriptor`] at startup. The pipeline
//! consults it for authentication, scope checks, feature gating and context
//! enrichment; it is never mutated afterwards.

use std::fmt;

use http::Method;
use serde::Serialize;

use crate::scope::Scope;

/// Product area that owns an endpoint, used for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FeatureCategory(&'static str);

impl FeatureCategory {
    pub const ONBOARDING: FeatureCategory = FeatureCategory("onboarding");
    pub const TEAM_PLANNING: FeatureCategory = FeatureCategory("team_planning");
    pub const USERS: FeatureCategory = FeatureCategory("users");
    pub const USER_PROFILE: FeatureCategory = FeatureCategory("user_profile");
    pub const GROUPS_AND_PROJECTS: FeatureCategory = FeatureCategory("groups_and_projects");
    pub const PACKAGE_REGISTRY: FeatureCategory = FeatureCategory("package_registry");
    pub const CONTINUOUS_DELIVERY: FeatureCategory = FeatureCategory("continuous_delivery");

    #[must_use]
    pub const fn new(tag: &'static str) -> Self {
        Self(tag)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Whether an endpoint can be reached without credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    Required,
    Optional,
}

/// The entity an endpoint's `:id` parameter refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityBinding {
    None,
    Project,
    Group,
    User,
}

/// Registration-time metadata for one endpoint.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    method: Method,
    path: &'static str,
    feature_category: FeatureCategory,
    auth: AuthRequirement,
    entity: EntityBinding,
    enrich_context: bool,
    read_scopes: Vec<Scope>,
    deploy_scopes: Vec<Scope>,
    feature_flag: Option<&'static str>,
}

impl RouteDescriptor {
    /// Creates a descriptor for `method` on `path`, relative to the versioned
    /// API root (e.g. `"/projects/:id/issues"`).
    ///
    /// Defaults: authentication required, no entity binding, no deploy
    /// tokens, no feature flag.
    #[must_use]
    pub fn new(method: Method, path: &'static str, feature_category: FeatureCategory) -> Self {
        Self {
            method,
            path,
            feature_category,
            auth: AuthRequirement::Required,
            entity: EntityBinding::None,
            enrich_context: false,
            read_scopes: Vec::new(),
            deploy_scopes: Vec::new(),
            feature_flag: None,
        }
    }

    #[must_use]
    pub fn get(path: &'static str, feature_category: FeatureCategory) -> Self {
        Self::new(Method::GET, path, feature_category)
    }

    #[must_use]
    pub fn post(path: &'static str, feature_category: FeatureCategory) -> Self {
        Self::new(Method::POST, path, feature_category)
    }

    #[must_use]
    pub fn put(path: &'static str, feature_category: FeatureCategory) -> Self {
        Self::new(Method::PUT, path, feature_category)
    }

    #[must_use]
    pub fn delete(path: &'static str, feature_category: FeatureCategory) -> Self {
        Self::new(Method::DELETE, path, feature_category)
    }

    /// Allows anonymous callers.
    #[must_use]
    pub fn allow_anonymous(mut self) -> Self {
        self.auth = AuthRequirement::Optional;
        self
    }

    /// Binds the `:id` parameter to an entity and turns on context enrichment.
    #[must_use]
    pub fn bound_to(mut self, entity: EntityBinding) -> Self {
        self.entity = entity;
        self.enrich_context = entity != EntityBinding::None;
        self
    }

    /// Keeps the entity binding but leaves `meta.user`/`meta.project` out of the context.
    #[must_use]
    pub fn without_context_enrichment(mut self) -> Self {
        self.enrich_context = false;
        self
    }

    /// Additional scopes accepted for GET/HEAD on this route.
    #[must_use]
    pub fn read_scopes(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
        self.read_scopes.extend(scopes);
        self
    }

    /// Deploy-token scopes accepted on this route. Empty means deploy
    /// tokens are not a credential here.
    #[must_use]
    pub fn deploy_scopes(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
        self.deploy_scopes.extend(scopes);
        self
    }

    /// Gates the route behind a feature flag.
    #[must_use]
    pub fn feature_flag(mut self, flag: &'static str) -> Self {
        self.feature_flag = Some(flag);
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path template relative to `/api/:version`.
    #[must_use]
    pub fn path(&self) -> &'static str {
        self.path
    }

    #[must_use]
    pub fn feature_category(&self) -> FeatureCategory {
        self.feature_category
    }

    #[must_use]
    pub fn auth(&self) -> AuthRequirement {
        self.auth
    }

    #[must_use]
    pub fn entity(&self) -> EntityBinding {
        self.entity
    }

    #[must_use]
    pub fn enriches_context(&self) -> bool {
        self.enrich_context
    }

    #[must_use]
    pub fn extra_read_scopes(&self) -> &[Scope] {
        &self.read_scopes
    }

    #[must_use]
    pub fn accepted_deploy_scopes(&self) -> &[Scope] {
        &self.deploy_scopes
    }

    #[must_use]
    pub fn accepts_deploy_tokens(&self) -> bool {
        !self.deploy_scopes.is_empty()
    }

    #[must_use]
    pub fn flag(&self) -> Option<&'static str> {
        self.feature_flag
    }

    /// The scope a user token needs for this route's method.
    #[must_use]
    pub fn required_scope(&self) -> Scope {
        if is_read_method(&self.method) {
            Scope::READ_API
        } else {
            Scope::API
        }
    }
}

/// GET and HEAD never mutate state.
#[must_use]
pub fn is_read_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_require_auth_without_enrichment() {
        let route = RouteDescriptor::get("/groups", FeatureCategory::GROUPS_AND_PROJECTS);
        assert_eq!(route.auth(), AuthRequirement::Required);
        assert_eq!(route.entity(), EntityBinding::None);
        assert!(!route.enriches_context());
        assert!(!route.accepts_deploy_tokens());
        assert_eq!(route.flag(), None);
    }

    #[test]
    fn binding_an_entity_enables_enrichment() {
        let route = RouteDescriptor::get("/projects/:id/issues", FeatureCategory::TEAM_PLANNING)
            .bound_to(EntityBinding::Project);
        assert!(route.enriches_context());

        let route = route.without_context_enrichment();
        assert_eq!(route.entity(), EntityBinding::Project);
        assert!(!route.enriches_context());
    }

    #[test]
    fn required_scope_follows_method() {
        let read = RouteDescriptor::get("/groups", FeatureCategory::GROUPS_AND_PROJECTS);
        let write = RouteDescriptor::delete("/groups/:id", FeatureCategory::GROUPS_AND_PROJECTS);
        assert_eq!(read.required_scope(), Scope::READ_API);
        assert_eq!(write.required_scope(), Scope::API);
    }
}
