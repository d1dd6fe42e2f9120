//! Request context construction.
//!
//! The dispatch pipeline builds the context in steps, because which keys are
//! present depends on how far the request got: the initial context carries
//! only `correlation_id`, `route`, `remote_ip` and `client_id`; a matched and
//! accepted route adds `caller_id` and `feature_category`; a resolved user
//! switches `client_id` to `user/<id>`; an authorized user on an
//! entity-bound route adds `user`, `project` and `root_namespace`.

use std::sync::Arc;

use apigate_core::{
    ContextKey, Credential, EntityBinding, EntityStore, RequestContext, RouteDescriptor,
};

use super::request::{ApiRequest, RouteParams};
use super::routes::RegisteredRoute;

/// Assembles [`RequestContext`] values, looking entities up for enrichment.
#[derive(Clone)]
pub struct ContextBuilder {
    entities: Arc<dyn EntityStore>,
}

impl ContextBuilder {
    #[must_use]
    pub fn new(entities: Arc<dyn EntityStore>) -> Self {
        Self { entities }
    }

    /// Context for a request that has not been matched to a handler yet.
    #[must_use]
    pub fn initial(request: &ApiRequest, route_template: &str) -> RequestContext {
        RequestContext::new(
            request.correlation_id.clone(),
            request.remote_ip.clone(),
            route_template,
        )
    }

    /// Records the matched handler. Called once the request has passed the
    /// media-type and parameter gates.
    pub fn identify_route(context: &mut RequestContext, route: &RegisteredRoute) {
        context.set(ContextKey::CallerId, &**route.caller_id());
        context.set(
            ContextKey::FeatureCategory,
            route.descriptor().feature_category().as_str(),
        );
    }

    /// Switches `client_id` to the user once a user credential resolved.
    pub fn identify_caller(context: &mut RequestContext, credential: &Credential) {
        if let Some(user_id) = credential.user_id() {
            context.set(ContextKey::ClientId, format!("user/{user_id}"));
        }
    }

    /// Adds `user`, `project` and `root_namespace` for authenticated users
    /// on routes that enrich the context.
    ///
    /// Lookup failures and unreadable entities leave the keys out; they
    /// never fail the request.
    pub async fn enrich(
        &self,
        context: &mut RequestContext,
        credential: &Credential,
        route: &RouteDescriptor,
        params: &RouteParams,
    ) {
        let Credential::User(user) = credential else {
            return;
        };
        if !route.enriches_context() {
            return;
        }
        context.set(ContextKey::User, user.username.as_str());

        let Some(id) = params.id() else {
            return;
        };
        match route.entity() {
            EntityBinding::Project => match self.entities.project(id).await {
                Ok(Some(project)) if project.readable_by(Some(user.user_id)) => {
                    context.set(ContextKey::RootNamespace, project.root_namespace());
                    context.set(ContextKey::Project, project.full_path);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    error = %e,
                    project = id,
                    "project lookup failed during context enrichment"
                ),
            },
            EntityBinding::Group => match self.entities.group(id).await {
                Ok(Some(group)) if group.readable_by(Some(user.user_id)) => {
                    context.set(ContextKey::RootNamespace, group.root_namespace());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    error = %e,
                    group = id,
                    "group lookup failed during context enrichment"
                ),
            },
            EntityBinding::User | EntityBinding::None => {}
        }
    }

    /// Builds the complete context for an authorized request in one go.
    pub async fn build(
        &self,
        request: &ApiRequest,
        credential: &Credential,
        route: &RegisteredRoute,
        params: &RouteParams,
    ) -> RequestContext {
        let mut context = Self::initial(request, route.template());
        Self::identify_route(&mut context, route);
        Self::identify_caller(&mut context, credential);
        self.enrich(&mut context, credential, route.descriptor(), params)
            .await;
        context
    }
}
