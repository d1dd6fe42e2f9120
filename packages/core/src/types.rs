use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::scope::ScopeSet;

/// Numeric identifier of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric identifier of a deploy token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeployTokenId(pub u64);

impl fmt::Display for DeployTokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account state. Blocked users cannot authenticate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    #[default]
    Active,
    Blocked,
}

/// A user account as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub state: UserState,
    #[serde(default)]
    pub admin: bool,
}

impl User {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == UserState::Active
    }
}

/// Returns the top-level namespace of a `/`-separated full path.
///
/// `"gitlab-org/security/app"` has root namespace `"gitlab-org"`.
#[must_use]
pub fn root_namespace_of(full_path: &str) -> &str {
    full_path.split('/').next().unwrap_or(full_path)
}

/// A project, addressed by numeric id or by its full path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    /// Namespace-qualified path, e.g. `"group/subgroup/project"`.
    pub full_path: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub member_ids: BTreeSet<UserId>,
}

impl Project {
    #[must_use]
    pub fn root_namespace(&self) -> &str {
        root_namespace_of(&self.full_path)
    }

    /// Read access: public projects are readable by anyone, private ones by members.
    #[must_use]
    pub fn readable_by(&self, user: Option<UserId>) -> bool {
        self.public || user.is_some_and(|id| self.member_ids.contains(&id))
    }
}

/// A group (namespace), addressed by numeric id or by its full path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: u64,
    pub full_path: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub member_ids: BTreeSet<UserId>,
}

impl Group {
    #[must_use]
    pub fn root_namespace(&self) -> &str {
        root_namespace_of(&self.full_path)
    }

    #[must_use]
    pub fn readable_by(&self, user: Option<UserId>) -> bool {
        self.public || user.is_some_and(|id| self.member_ids.contains(&id))
    }
}

/// Stored personal access token or OAuth token belonging to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTokenRecord {
    pub id: u64,
    pub user_id: UserId,
    pub scopes: ScopeSet,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub expires_at: Option<NaiveDate>,
}

impl UserTokenRecord {
    /// A token expiring today is still valid today.
    #[must_use]
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expires_at.is_some_and(|date| date < today)
    }
}

/// Stored deploy token. Deploy tokens are not bound to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployTokenRecord {
    pub id: DeployTokenId,
    pub username: String,
    pub scopes: ScopeSet,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub expires_at: Option<NaiveDate>,
}

impl DeployTokenRecord {
    #[must_use]
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expires_at.is_some_and(|date| date < today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn root_namespace_is_first_path_component() {
        assert_eq!(root_namespace_of("gitlab-org/security/app"), "gitlab-org");
        assert_eq!(root_namespace_of("solo"), "solo");
    }

    #[test]
    fn private_project_readable_only_by_members() {
        let project = Project {
            id: 1,
            full_path: "acme/app".to_string(),
            public: false,
            member_ids: BTreeSet::from([UserId(7)]),
        };
        assert!(project.readable_by(Some(UserId(7))));
        assert!(!project.readable_by(Some(UserId(8))));
        assert!(!project.readable_by(None));
    }

    #[test]
    fn token_expiring_today_is_still_valid() {
        let token = UserTokenRecord {
            id: 1,
            user_id: UserId(1),
            scopes: ScopeSet::from([Scope::API]),
            revoked: false,
            expires_at: Some(date(2026, 10, 18)),
        };
        assert!(!token.is_expired(date(2026, 10, 18)));
        assert!(token.is_expired(date(2026, 10, 19)));
    }

    #[test]
    fn user_defaults_to_active_when_state_omitted() {
        let user: User = serde_json::from_str(r#"{"id": 3, "username": "root"}"#).unwrap();
        assert!(user.is_active());
        assert!(!user.admin);
    }
}
