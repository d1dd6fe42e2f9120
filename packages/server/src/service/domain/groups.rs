//! Group endpoints: list, create, update, delete.

use std::collections::BTreeSet;
use std::sync::Arc;

use apigate_core::{ApiError, EntityStore, Group};
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{json, Value};

use super::{optional_param, require_user, required_param};
use crate::service::request::{HandlerCall, HandlerResponse, ResponseBody};
use crate::service::router::ApiHandler;
use crate::storage::InMemoryStore;

fn group_json(group: &Group) -> Value {
    json!({
        "id": group.id,
        "full_path": group.full_path,
        "visibility": if group.public { "public" } else { "private" },
    })
}

/// Looks up the `:id` group, answering 404 when the caller cannot see it
/// and 403 when the caller can see it but is not a member.
async fn writable_group(store: &InMemoryStore, call: &HandlerCall) -> Result<Group, ApiError> {
    let user = require_user(&call.credential)?;
    let id = call.route_params.id().unwrap_or_default();
    let group = store
        .group(id)
        .await?
        .filter(|g| g.readable_by(Some(user.user_id)))
        .ok_or_else(|| ApiError::not_found("Group"))?;
    if !group.member_ids.contains(&user.user_id) {
        return Err(ApiError::Forbidden);
    }
    Ok(group)
}

pub struct ListGroups {
    store: Arc<InMemoryStore>,
}

impl ListGroups {
    #[must_use]
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ApiHandler for ListGroups {
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, ApiError> {
        let caller = call.credential.user_id();
        let groups: Vec<Value> = self
            .store
            .list_groups()
            .iter()
            .filter(|g| g.readable_by(caller))
            .map(group_json)
            .collect();
        Ok(HandlerResponse::ok(Value::Array(groups)))
    }
}

pub struct CreateGroup {
    store: Arc<InMemoryStore>,
}

impl CreateGroup {
    #[must_use]
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ApiHandler for CreateGroup {
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, ApiError> {
        let user = require_user(&call.credential)?;
        required_param(&call.params, "name")?;
        let path = required_param(&call.params, "path")?;
        if path.contains('/') {
            return Err(ApiError::ValidationFailed("path must not contain '/'".to_string()));
        }
        if self.store.list_groups().iter().any(|g| g.full_path == path) {
            return Err(ApiError::Conflict(format!("group path {path} is taken")));
        }

        let group = Group {
            id: self.store.next_group_id(),
            full_path: path.to_string(),
            public: optional_param(&call.params, "visibility") == Some("public"),
            member_ids: BTreeSet::from([user.user_id]),
        };
        self.store.insert_group(group.clone());
        Ok(HandlerResponse::created(group_json(&group)))
    }
}

pub struct UpdateGroup {
    store: Arc<InMemoryStore>,
}

impl UpdateGroup {
    #[must_use]
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ApiHandler for UpdateGroup {
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, ApiError> {
        let mut group = writable_group(&self.store, &call).await?;
        if let Some(visibility) = optional_param(&call.params, "visibility") {
            match visibility {
                "public" => group.public = true,
                "private" => group.public = false,
                other => {
                    return Err(ApiError::BadRequest(format!(
                        "visibility does not have a valid value: {other}"
                    )))
                }
            }
        }
        self.store.insert_group(group.clone());
        Ok(HandlerResponse::ok(group_json(&group)))
    }
}

pub struct DeleteGroup {
    store: Arc<InMemoryStore>,
}

impl DeleteGroup {
    #[must_use]
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ApiHandler for DeleteGroup {
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, ApiError> {
        let group = writable_group(&self.store, &call).await?;
        self.store.remove_group(group.id);
        Ok(HandlerResponse {
            status: StatusCode::ACCEPTED,
            body: ResponseBody::Json(json!({ "message": "202 Accepted" })),
        })
    }
}
