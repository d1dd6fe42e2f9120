//! JSON seed data for [`InMemoryStore`].
//!
//! ```json
//! {
//!   "users": [{ "id": 1, "username": "root", "admin": true }],
//!   "projects": [{ "id": 1, "full_path": "acme/app", "member_ids": [1] }],
//!   "personal_access_tokens": [
//!     { "secret": "glpat-demo", "id": 1, "user_id": 1, "scopes": ["api"] }
//!   ],
//!   "feature_flags": { "deploy_tokens_api": false }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use apigate_core::{DeployTokenRecord, Group, Project, User, UserId, UserTokenRecord};
use serde::Deserialize;

use super::memory::InMemoryStore;

#[derive(Debug, Clone, Deserialize)]
pub struct UserTokenFixture {
    pub secret: String,
    #[serde(flatten)]
    pub record: UserTokenRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployTokenFixture {
    pub secret: String,
    #[serde(flatten)]
    pub record: DeployTokenRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionFixture {
    pub id: String,
    pub user_id: UserId,
}

/// Everything a fixture file may seed. All sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    pub users: Vec<User>,
    pub projects: Vec<Project>,
    pub groups: Vec<Group>,
    pub personal_access_tokens: Vec<UserTokenFixture>,
    pub oauth_tokens: Vec<UserTokenFixture>,
    pub deploy_tokens: Vec<DeployTokenFixture>,
    pub sessions: Vec<SessionFixture>,
    pub feature_flags: BTreeMap<String, bool>,
}

impl Fixtures {
    /// # Errors
    ///
    /// Returns an error if the text is not a valid fixture document.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("invalid fixture document")
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixtures from {}", path.display()))?;
        Self::from_json(&text)
    }

    /// Loads every record into `store`. Feature flags are left on `self`
    /// for the caller to merge into the server configuration.
    pub fn seed(&self, store: &InMemoryStore) {
        for user in &self.users {
            store.insert_user(user.clone());
        }
        for project in &self.projects {
            store.insert_project(project.clone());
        }
        for group in &self.groups {
            store.insert_group(group.clone());
        }
        for token in &self.personal_access_tokens {
            store.insert_personal_access_token(&token.secret, token.record.clone());
        }
        for token in &self.oauth_tokens {
            store.insert_oauth_token(&token.secret, token.record.clone());
        }
        for token in &self.deploy_tokens {
            store.insert_deploy_token(&token.secret, token.record.clone());
        }
        for session in &self.sessions {
            store.insert_session(session.id.clone(), session.user_id);
        }
        tracing::info!(
            users = self.users.len(),
            projects = self.projects.len(),
            groups = self.groups.len(),
            tokens = self.personal_access_tokens.len()
                + self.oauth_tokens.len()
                + self.deploy_tokens.len(),
            "fixtures loaded"
        );
    }
}
