//! Endpoint registry: pairs each [`RouteDescriptor`] with its handler.
//!
//! Built once at startup and consumed by the dispatch pipeline.

use std::sync::Arc;

use apigate_core::RouteDescriptor;

use super::config::ServerConfig;
use super::router::{ApiHandler, HandlerRouter};
use super::routes::RouteTable;

/// Route table and handler router kept in step with each other.
#[derive(Debug, Clone)]
pub struct ApiRegistry {
    routes: RouteTable,
    handlers: HandlerRouter,
}

impl ApiRegistry {
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            routes: RouteTable::new(config),
            handlers: HandlerRouter::new(),
        }
    }

    /// Registers `handler` for `descriptor` and returns the caller id.
    pub fn route(&mut self, descriptor: RouteDescriptor, handler: Arc<dyn ApiHandler>) -> Arc<str> {
        let key = self.routes.register(descriptor);
        self.handlers.register(Arc::clone(&key), handler);
        key
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    #[must_use]
    pub fn into_parts(self) -> (RouteTable, HandlerRouter) {
        (self.routes, self.handlers)
    }
}

#[cfg(test)]
mod tests {
    use apigate_core::{ApiError, FeatureCategory};
    use async_trait::async_trait;

    use super::*;
    use crate::service::request::{HandlerCall, HandlerResponse};

    struct Noop;

    #[async_trait]
    impl ApiHandler for Noop {
        async fn handle(&self, _call: HandlerCall) -> Result<HandlerResponse, ApiError> {
            Ok(HandlerResponse::no_content())
        }
    }

    #[test]
    fn routes_and_handlers_share_keys() {
        let mut registry = ApiRegistry::new(&ServerConfig::default());
        let key = registry.route(
            RouteDescriptor::delete("/groups/:id", FeatureCategory::GROUPS_AND_PROJECTS),
            Arc::new(Noop),
        );
        assert_eq!(&*key, "DELETE /api/:version/groups/:id");
        assert_eq!(registry.len(), 1);

        let (routes, handlers) = registry.into_parts();
        let route = routes.iter().next().unwrap();
        assert!(handlers.contains(route.caller_id()));
    }
}
