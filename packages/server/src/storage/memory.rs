//! In-memory implementation of [`TokenStore`], [`EntityStore`] and
//! [`ActivityStore`] backed by [`DashMap`].
//!
//! Token secrets are never held in plaintext: records are keyed by the
//! hex-encoded SHA-256 digest of the secret.

use std::sync::atomic::{AtomicU64, Ordering};

use apigate_core::{
    ActivityStore, DeployTokenRecord, EntityStore, Group, Project, TokenStore, User, UserId,
    UserTokenRecord,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest used as the lookup key for token secrets.
#[must_use]
pub fn token_digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Decodes the `%2F` separators of a URL-encoded full path.
fn decode_full_path(id_or_path: &str) -> String {
    id_or_path.replace("%2F", "/").replace("%2f", "/")
}

/// Concurrent in-memory store for the demo server and tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    users: DashMap<UserId, User>,
    projects: DashMap<u64, Project>,
    project_paths: DashMap<String, u64>,
    groups: DashMap<u64, Group>,
    group_paths: DashMap<String, u64>,
    personal_tokens: DashMap<String, UserTokenRecord>,
    oauth_tokens: DashMap<String, UserTokenRecord>,
    deploy_tokens: DashMap<String, DeployTokenRecord>,
    sessions: DashMap<String, UserId>,
    last_activity: DashMap<UserId, NaiveDate>,
    activity_writes: AtomicU64,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn insert_project(&self, project: Project) {
        self.project_paths
            .insert(project.full_path.clone(), project.id);
        self.projects.insert(project.id, project);
    }

    pub fn insert_group(&self, group: Group) {
        self.group_paths.insert(group.full_path.clone(), group.id);
        self.groups.insert(group.id, group);
    }

    pub fn insert_personal_access_token(&self, secret: &str, record: UserTokenRecord) {
        self.personal_tokens.insert(token_digest(secret), record);
    }

    pub fn insert_oauth_token(&self, secret: &str, record: UserTokenRecord) {
        self.oauth_tokens.insert(token_digest(secret), record);
    }

    pub fn insert_deploy_token(&self, secret: &str, record: DeployTokenRecord) {
        self.deploy_tokens.insert(token_digest(secret), record);
    }

    pub fn insert_session(&self, session_id: impl Into<String>, user: UserId) {
        self.sessions.insert(session_id.into(), user);
    }

    /// Marks a stored personal access token revoked. Returns whether it existed.
    pub fn revoke_personal_access_token(&self, secret: &str) -> bool {
        self.personal_tokens
            .get_mut(&token_digest(secret))
            .map(|mut record| record.revoked = true)
            .is_some()
    }

    #[must_use]
    pub fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.clone()).collect();
        users.sort_by_key(|u| u.id);
        users
    }

    #[must_use]
    pub fn list_groups(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = self.groups.iter().map(|g| g.clone()).collect();
        groups.sort_by_key(|g| g.id);
        groups
    }

    /// Next free group id.
    #[must_use]
    pub fn next_group_id(&self) -> u64 {
        self.groups.iter().map(|g| *g.key()).max().unwrap_or(0) + 1
    }

    pub fn remove_group(&self, id: u64) -> Option<Group> {
        let (_, group) = self.groups.remove(&id)?;
        self.group_paths.remove(&group.full_path);
        Some(group)
    }

    /// Deploy token records without their secrets.
    #[must_use]
    pub fn list_deploy_tokens(&self) -> Vec<DeployTokenRecord> {
        let mut tokens: Vec<DeployTokenRecord> =
            self.deploy_tokens.iter().map(|t| t.clone()).collect();
        tokens.sort_by_key(|t| t.id);
        tokens
    }

    /// Number of activity upserts performed so far.
    #[must_use]
    pub fn activity_writes(&self) -> u64 {
        self.activity_writes.load(Ordering::Relaxed)
    }

    fn find_project(&self, id_or_path: &str) -> Option<Project> {
        let id = match id_or_path.parse::<u64>() {
            Ok(id) => id,
            Err(_) => *self.project_paths.get(&decode_full_path(id_or_path))?,
        };
        self.projects.get(&id).map(|p| p.clone())
    }

    fn find_group(&self, id_or_path: &str) -> Option<Group> {
        let id = match id_or_path.parse::<u64>() {
            Ok(id) => id,
            Err(_) => *self.group_paths.get(&decode_full_path(id_or_path))?,
        };
        self.groups.get(&id).map(|g| g.clone())
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn personal_access_token(
        &self,
        secret: &str,
    ) -> anyhow::Result<Option<UserTokenRecord>> {
        Ok(self
            .personal_tokens
            .get(&token_digest(secret))
            .map(|r| r.clone()))
    }

    async fn oauth_token(&self, secret: &str) -> anyhow::Result<Option<UserTokenRecord>> {
        Ok(self.oauth_tokens.get(&token_digest(secret)).map(|r| r.clone()))
    }

    async fn deploy_token(&self, secret: &str) -> anyhow::Result<Option<DeployTokenRecord>> {
        Ok(self
            .deploy_tokens
            .get(&token_digest(secret))
            .map(|r| r.clone()))
    }

    async fn session_user(&self, session_id: &str) -> anyhow::Result<Option<UserId>> {
        Ok(self.sessions.get(session_id).map(|id| *id))
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn user(&self, id: UserId) -> anyhow::Result<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn project(&self, id_or_path: &str) -> anyhow::Result<Option<Project>> {
        Ok(self.find_project(id_or_path))
    }

    async fn group(&self, id_or_path: &str) -> anyhow::Result<Option<Group>> {
        Ok(self.find_group(id_or_path))
    }
}

#[async_trait]
impl ActivityStore for InMemoryStore {
    async fn last_activity_on(&self, user: UserId) -> anyhow::Result<Option<NaiveDate>> {
        Ok(self.last_activity.get(&user).map(|d| *d))
    }

    async fn set_last_activity_on(&self, user: UserId, date: NaiveDate) -> anyhow::Result<()> {
        self.last_activity.insert(user, date);
        self.activity_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
