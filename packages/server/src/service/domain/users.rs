//! User endpoints and the caller's event feed.

use std::sync::Arc;

use apigate_core::{ApiError, EntityStore, User, UserId};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{optional_param, require_user};
use crate::service::request::{HandlerCall, HandlerResponse};
use crate::service::router::ApiHandler;
use crate::storage::InMemoryStore;

fn user_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "username": user.username,
        "state": if user.is_active() { "active" } else { "blocked" },
    })
}

fn route_user_id(call: &HandlerCall) -> Result<UserId, ApiError> {
    call.route_params
        .id()
        .and_then(|id| id.parse().ok())
        .map(UserId)
        .ok_or_else(|| ApiError::not_found("User"))
}

/// `GET /user`: the authenticated user.
pub struct CurrentUser {
    store: Arc<InMemoryStore>,
}

impl CurrentUser {
    #[must_use]
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ApiHandler for CurrentUser {
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, ApiError> {
        let caller = require_user(&call.credential)?;
        let user = self
            .store
            .user(caller.user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User"))?;
        let mut body = user_json(&user);
        body["is_admin"] = Value::Bool(user.admin);
        Ok(HandlerResponse::ok(body))
    }
}

/// `GET /users`.
pub struct ListUsers {
    store: Arc<InMemoryStore>,
}

impl ListUsers {
    #[must_use]
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ApiHandler for ListUsers {
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, ApiError> {
        let username = optional_param(&call.params, "username");
        let users: Vec<Value> = self
            .store
            .list_users()
            .iter()
            .filter(|u| username.map_or(true, |name| u.username == name))
            .map(user_json)
            .collect();
        Ok(HandlerResponse::ok(Value::Array(users)))
    }
}

/// `GET /users/:id`.
pub struct ShowUser {
    store: Arc<InMemoryStore>,
}

impl ShowUser {
    #[must_use]
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ApiHandler for ShowUser {
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, ApiError> {
        let id = route_user_id(&call)?;
        let user = self
            .store
            .user(id)
            .await?
            .ok_or_else(|| ApiError::not_found("User"))?;
        Ok(HandlerResponse::ok(user_json(&user)))
    }
}

/// `PUT /users/:id`: admins may edit anyone, users only themselves.
pub struct UpdateUser {
    store: Arc<InMemoryStore>,
}

impl UpdateUser {
    #[must_use]
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ApiHandler for UpdateUser {
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, ApiError> {
        let caller = require_user(&call.credential)?;
        let id = route_user_id(&call)?;
        let mut target = self
            .store
            .user(id)
            .await?
            .ok_or_else(|| ApiError::not_found("User"))?;

        if caller.user_id != id {
            let is_admin = self
                .store
                .user(caller.user_id)
                .await?
                .is_some_and(|u| u.admin);
            if !is_admin {
                return Err(ApiError::Forbidden);
            }
        }

        if let Some(username) = optional_param(&call.params, "username") {
            let taken = self
                .store
                .list_users()
                .iter()
                .any(|u| u.username == username && u.id != id);
            if taken {
                return Err(ApiError::Conflict("Username has already been taken".to_string()));
            }
            target.username = username.to_string();
        }
        self.store.insert_user(target.clone());
        Ok(HandlerResponse::ok(user_json(&target)))
    }
}

/// `GET /events`: the caller's activity feed. Accepts `read_user` tokens.
pub struct ListEvents;

#[async_trait]
impl ApiHandler for ListEvents {
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, ApiError> {
        require_user(&call.credential)?;
        Ok(HandlerResponse::ok(json!([])))
    }
}

#[cfg(test)]
mod tests {
    use apigate_core::{
        AuthMethod, Credential, RequestContext, Scope, ScopeSet, UserCredential, UserState,
    };
    use axum::http::Method;

    use super::*;
    use crate::service::request::RouteParams;

    fn store() -> Arc<InMemoryStore> {
        let store = InMemoryStore::new();
        for (id, name, admin) in [(1, "root", true), (2, "maria", false), (3, "john", false)] {
            store.insert_user(User {
                id: UserId(id),
                username: name.to_string(),
                state: UserState::Active,
                admin,
            });
        }
        Arc::new(store)
    }

    fn call(caller: u64, target: &str, params: Value) -> HandlerCall {
        let mut call = HandlerCall::new(
            Arc::from("PUT /api/:version/users/:id"),
            Method::PUT,
            Arc::new(Credential::User(UserCredential {
                user_id: UserId(caller),
                username: format!("user{caller}"),
                method: AuthMethod::PersonalAccessToken,
                token_id: Some(caller),
                scopes: ScopeSet::from([Scope::API]),
            })),
            RequestContext::new("cid", "127.0.0.1", "/api/:version/users/:id"),
        );
        let mut route_params = RouteParams::new();
        route_params.insert("id", target);
        call.route_params = route_params;
        if let Value::Object(params) = params {
            call.params = params;
        }
        call
    }

    #[tokio::test]
    async fn users_edit_themselves_admins_edit_anyone() {
        let store = store();
        let handler = UpdateUser::new(store.clone());

        let own = handler.handle(call(2, "2", json!({ "username": "maria2" }))).await.unwrap();
        assert_eq!(
            own,
            HandlerResponse::ok(json!({ "id": 2, "username": "maria2", "state": "active" }))
        );

        let other = handler.handle(call(2, "3", json!({ "username": "x" }))).await.unwrap_err();
        assert!(matches!(other, ApiError::Forbidden));

        let admin = handler.handle(call(1, "3", json!({ "username": "johnny" }))).await.unwrap();
        assert_eq!(admin.status, 200);
        assert_eq!(store.user(UserId(3)).await.unwrap().unwrap().username, "johnny");
    }

    #[tokio::test]
    async fn username_conflicts_and_missing_users() {
        let handler = UpdateUser::new(store());
        let taken = handler.handle(call(1, "3", json!({ "username": "maria" }))).await.unwrap_err();
        assert_eq!(taken.status(), 409);

        let missing = handler.handle(call(1, "99", json!({}))).await.unwrap_err();
        assert_eq!(missing.status(), 404);

        let not_numeric = ShowUser::new(store())
            .handle(call(1, "abc", json!({})))
            .await
            .unwrap_err();
        assert_eq!(not_numeric.status(), 404);
    }

    #[tokio::test]
    async fn list_filters_by_username() {
        let mut call = call(1, "1", json!({ "username": "john" }));
        call.method = Method::GET;
        let resp = ListUsers::new(store()).handle(call).await.unwrap();
        assert_eq!(
            resp,
            HandlerResponse::ok(json!([{ "id": 3, "username": "john", "state": "active" }]))
        );
    }
}
