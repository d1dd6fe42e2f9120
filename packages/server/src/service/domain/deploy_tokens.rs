//! `GET /deploy_tokens`: instance-wide deploy token listing for admins.

use std::sync::Arc;

use apigate_core::{ApiError, EntityStore};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::require_user;
use crate::service::request::{HandlerCall, HandlerResponse};
use crate::service::router::ApiHandler;
use crate::storage::InMemoryStore;

pub struct ListDeployTokens {
    store: Arc<InMemoryStore>,
}

impl ListDeployTokens {
    #[must_use]
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ApiHandler for ListDeployTokens {
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, ApiError> {
        let caller = require_user(&call.credential)?;
        let is_admin = self
            .store
            .user(caller.user_id)
            .await?
            .is_some_and(|u| u.admin);
        if !is_admin {
            return Err(ApiError::Forbidden);
        }

        let tokens: Vec<Value> = self
            .store
            .list_deploy_tokens()
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "username": t.username,
                    "scopes": t.scopes,
                    "revoked": t.revoked,
                    "expires_at": t.expires_at,
                })
            })
            .collect();
        Ok(HandlerResponse::ok(Value::Array(tokens)))
    }
}
