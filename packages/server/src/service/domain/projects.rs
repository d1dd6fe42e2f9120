//! Project-scoped endpoints: issues and Maven package files.

use std::sync::Arc;

use apigate_core::{ApiError, Credential, EntityStore, Project};
use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};

use super::{require_user, required_param};
use crate::service::request::{HandlerCall, HandlerResponse, ResponseBody};
use crate::service::router::ApiHandler;
use crate::storage::InMemoryStore;

/// Resolves the `:id` project, hiding projects the caller cannot read.
///
/// Deploy tokens may read any project's packages.
async fn readable_project(store: &InMemoryStore, call: &HandlerCall) -> Result<Project, ApiError> {
    let id = call.route_params.id().unwrap_or_default();
    let project = store
        .project(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))?;
    let readable = match call.credential.as_ref() {
        Credential::DeployToken(_) => true,
        credential => project.readable_by(credential.user_id()),
    };
    if readable {
        Ok(project)
    } else {
        Err(ApiError::not_found("Project"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub iid: u64,
    pub project_id: u64,
    pub title: String,
    pub author: String,
    pub state: &'static str,
}

/// `GET|POST /projects/:id/issues`.
pub struct ProjectIssues {
    store: Arc<InMemoryStore>,
    issues: DashMap<u64, Vec<Issue>>,
}

impl ProjectIssues {
    #[must_use]
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self {
            store,
            issues: DashMap::new(),
        }
    }
}

#[async_trait]
impl ApiHandler for ProjectIssues {
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, ApiError> {
        let project = readable_project(&self.store, &call).await?;

        if call.method != Method::POST {
            let issues = self
                .issues
                .get(&project.id)
                .map(|issues| issues.clone())
                .unwrap_or_default();
            let body = serde_json::to_value(issues).map_err(anyhow::Error::from)?;
            return Ok(HandlerResponse::ok(body));
        }

        let user = require_user(&call.credential)?;
        if !project.member_ids.contains(&user.user_id) {
            return Err(ApiError::Forbidden);
        }
        let title = required_param(&call.params, "title")?;
        let mut issues = self.issues.entry(project.id).or_default();
        let issue = Issue {
            iid: issues.len() as u64 + 1,
            project_id: project.id,
            title: title.to_string(),
            author: user.username.clone(),
            state: "opened",
        };
        issues.push(issue.clone());
        let body = serde_json::to_value(issue).map_err(anyhow::Error::from)?;
        Ok(HandlerResponse::created(body))
    }
}

/// `GET|PUT /projects/:id/packages/maven/:file`.
pub struct MavenPackages {
    store: Arc<InMemoryStore>,
    files: DashMap<(u64, String), Bytes>,
}

impl MavenPackages {
    #[must_use]
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self {
            store,
            files: DashMap::new(),
        }
    }

    /// Stores a package file directly, bypassing the upload endpoint.
    pub fn publish(&self, project_id: u64, file: impl Into<String>, data: impl Into<Bytes>) {
        self.files.insert((project_id, file.into()), data.into());
    }
}

#[async_trait]
impl ApiHandler for MavenPackages {
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, ApiError> {
        let project = readable_project(&self.store, &call).await?;
        let file = call
            .route_params
            .get("file")
            .ok_or_else(|| ApiError::BadRequest("file is missing".to_string()))?
            .to_string();

        if call.method == Method::PUT {
            let content = match call.params.get("file") {
                Some(Value::String(content)) => Bytes::from(content.clone()),
                _ => return Err(ApiError::BadRequest("file is missing".to_string())),
            };
            self.files.insert((project.id, file.clone()), content);
            return Ok(HandlerResponse {
                status: StatusCode::CREATED,
                body: ResponseBody::Json(json!({ "message": "201 Created", "file_name": file })),
            });
        }

        let data = self
            .files
            .get(&(project.id, file))
            .map(|data| data.clone())
            .ok_or_else(|| ApiError::not_found("Package"))?;
        Ok(HandlerResponse::bytes("application/octet-stream", data))
    }
}
