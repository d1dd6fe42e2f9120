//! Collaborator seams: the stores and predicates the pipeline consults but
//! does not own.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::{DeployTokenRecord, Group, Project, User, UserId, UserTokenRecord};

/// Token lookup by presented secret.
/// Implementations: in-memory (tests, demo server); a database-backed store
/// lives outside this workspace.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Look up a personal access token by its plaintext secret.
    async fn personal_access_token(&self, secret: &str)
        -> anyhow::Result<Option<UserTokenRecord>>;

    /// Look up an OAuth access token by its plaintext secret.
    async fn oauth_token(&self, secret: &str) -> anyhow::Result<Option<UserTokenRecord>>;

    /// Look up a deploy token by its plaintext secret.
    async fn deploy_token(&self, secret: &str) -> anyhow::Result<Option<DeployTokenRecord>>;

    /// Resolve a session cookie value to the signed-in user.
    async fn session_user(&self, session_id: &str) -> anyhow::Result<Option<UserId>>;
}

/// Read-only entity lookups used for authentication and context enrichment.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn user(&self, id: UserId) -> anyhow::Result<Option<User>>;

    /// Find a project by numeric id or URL-encoded full path.
    async fn project(&self, id_or_path: &str) -> anyhow::Result<Option<Project>>;

    /// Find a group by numeric id or URL-encoded full path.
    async fn group(&self, id_or_path: &str) -> anyhow::Result<Option<Group>>;
}

/// Day-granularity last-activity storage.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn last_activity_on(&self, user: UserId) -> anyhow::Result<Option<NaiveDate>>;

    /// Upsert keyed by user id; last write wins.
    async fn set_last_activity_on(&self, user: UserId, date: NaiveDate) -> anyhow::Result<()>;
}

/// Feature-flag predicate injected into the scope authorizer.
pub trait FeatureGate: Send + Sync {
    fn is_enabled(&self, flag: &str) -> bool;
}

impl<F> FeatureGate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_enabled(&self, flag: &str) -> bool {
        self(flag)
    }
}
