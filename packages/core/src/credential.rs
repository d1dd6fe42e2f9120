//! Resolved caller identity.
//!
//! A [`Credential`] is produced once per request by the credential resolver
//! and is immutable afterwards. Rejected credentials never become a
//! `Credential`; they surface as [`AuthFailure`] inside
//! [`ApiError::Unauthenticated`](crate::ApiError::Unauthenticated).

use serde::Serialize;

use crate::scope::ScopeSet;
use crate::types::{DeployTokenId, UserId};

/// How a user credential was presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    PersonalAccessToken,
    OAuth,
    Session,
}

impl AuthMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PersonalAccessToken => "personal_access_token",
            Self::OAuth => "oauth",
            Self::Session => "session",
        }
    }
}

/// A caller authenticated as a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredential {
    pub user_id: UserId,
    pub username: String,
    pub method: AuthMethod,
    /// Token id for token-based methods, `None` for sessions.
    pub token_id: Option<u64>,
    pub scopes: ScopeSet,
}

/// A caller authenticated with a deploy token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployCredential {
    pub token_id: DeployTokenId,
    pub username: String,
    pub scopes: ScopeSet,
}

/// Caller identity for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Anonymous,
    User(UserCredential),
    DeployToken(DeployCredential),
}

impl Credential {
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// The user id, only for user credentials.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User(user) => Some(user.user_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::User(user) => Some(&user.username),
            _ => None,
        }
    }

    #[must_use]
    pub fn scopes(&self) -> Option<&ScopeSet> {
        match self {
            Self::Anonymous => None,
            Self::User(user) => Some(&user.scopes),
            Self::DeployToken(token) => Some(&token.scopes),
        }
    }

    /// Short label used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::User(user) => user.method.as_str(),
            Self::DeployToken(_) => "deploy_token",
        }
    }
}

/// Why a presented credential was rejected.
///
/// Retained for logs only; clients always see a plain 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("no credential supplied")]
    Missing,
    #[error("token not recognised")]
    UnknownToken,
    #[error("token revoked")]
    Revoked,
    #[error("token expired")]
    Expired,
    #[error("token has no scopes")]
    EmptyScopes,
    #[error("token owner not found")]
    UserMissing,
    #[error("user is blocked")]
    UserBlocked,
    #[error("credential not accepted for this route")]
    NotAccepted,
}

impl AuthFailure {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::UnknownToken => "unknown_token",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::EmptyScopes => "empty_scopes",
            Self::UserMissing => "user_missing",
            Self::UserBlocked => "user_blocked",
            Self::NotAccepted => "not_accepted",
        }
    }
}
