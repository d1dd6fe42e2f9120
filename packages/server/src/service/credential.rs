//! Credential resolution: turns request headers and params into exactly one
//! [`Credential`] or an `Unauthenticated` error.
//!
//! Precedence: deploy-token header, then personal access token
//! (`private_token` param or `Private-Token` header), then bearer token
//! (`Authorization: Bearer` or `access_token` param), then session cookie,
//! then anonymous.

use std::sync::Arc;

use apigate_core::{
    ApiError, AuthFailure, AuthMethod, Credential, DeployCredential, EntityStore, Scope, ScopeSet,
    TokenStore, UserCredential, UserTokenRecord,
};
use axum::http::header::{AUTHORIZATION, COOKIE};
use chrono::NaiveDate;
use serde_json::Value;

use super::config::ServerConfig;
use super::request::{ApiParams, ApiRequest};

const PRIVATE_TOKEN_PARAM: &str = "private_token";
const PRIVATE_TOKEN_HEADER: &str = "private-token";
const ACCESS_TOKEN_PARAM: &str = "access_token";

fn unauthenticated(reason: AuthFailure) -> ApiError {
    ApiError::Unauthenticated { reason }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn string_param<'a>(params: &'a ApiParams, name: &str) -> Option<&'a str> {
    match params.get(name) {
        Some(Value::String(value)) => non_empty(value),
        _ => None,
    }
}

fn bearer_token(request: &ApiRequest) -> Option<&str> {
    let header = request.header(AUTHORIZATION.as_str())?;
    let (scheme, token) = header.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        non_empty(token)
    } else {
        None
    }
}

fn cookie<'a>(request: &'a ApiRequest, name: &str) -> Option<&'a str> {
    request
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| non_empty(value))
}

/// A token that was found, together with how it was presented.
struct PresentedUserToken {
    record: UserTokenRecord,
    method: AuthMethod,
}

/// Resolves the caller of a request against the token and entity stores.
///
/// Lookups are read-only. Store errors surface as `InternalFault`, never as
/// a 401.
#[derive(Clone)]
pub struct CredentialResolver {
    tokens: Arc<dyn TokenStore>,
    entities: Arc<dyn EntityStore>,
    deploy_token_header: String,
    session_cookie: String,
}

impl CredentialResolver {
    #[must_use]
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        entities: Arc<dyn EntityStore>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            tokens,
            entities,
            deploy_token_header: config.deploy_token_header.to_ascii_lowercase(),
            session_cookie: config.session_cookie.clone(),
        }
    }

    /// Resolve the request's credential as of `today`.
    ///
    /// # Errors
    ///
    /// `ApiError::Unauthenticated` when a credential was presented but
    /// rejected; `ApiError::InternalFault` when a store lookup fails.
    pub async fn resolve(
        &self,
        request: &ApiRequest,
        params: &ApiParams,
        today: NaiveDate,
    ) -> Result<Credential, ApiError> {
        if let Some(secret) = request.header(&self.deploy_token_header).and_then(non_empty) {
            return self.resolve_deploy_token(secret, today).await;
        }

        if let Some(secret) = string_param(params, PRIVATE_TOKEN_PARAM)
            .or_else(|| request.header(PRIVATE_TOKEN_HEADER).and_then(non_empty))
        {
            let record = self
                .tokens
                .personal_access_token(secret)
                .await?
                .ok_or(unauthenticated(AuthFailure::UnknownToken))?;
            let presented = PresentedUserToken {
                record,
                method: AuthMethod::PersonalAccessToken,
            };
            return self.resolve_user_token(presented, today).await;
        }

        if let Some(secret) =
            bearer_token(request).or_else(|| string_param(params, ACCESS_TOKEN_PARAM))
        {
            let presented = self.lookup_bearer(secret).await?;
            return self.resolve_user_token(presented, today).await;
        }

        if let Some(session_id) = cookie(request, &self.session_cookie) {
            return self.resolve_session(session_id).await;
        }

        Ok(Credential::Anonymous)
    }

    async fn resolve_deploy_token(
        &self,
        secret: &str,
        today: NaiveDate,
    ) -> Result<Credential, ApiError> {
        let record = self
            .tokens
            .deploy_token(secret)
            .await?
            .ok_or(unauthenticated(AuthFailure::UnknownToken))?;
        if record.revoked {
            return Err(unauthenticated(AuthFailure::Revoked));
        }
        if record.is_expired(today) {
            return Err(unauthenticated(AuthFailure::Expired));
        }
        if record.scopes.is_empty() {
            return Err(unauthenticated(AuthFailure::EmptyScopes));
        }
        Ok(Credential::DeployToken(DeployCredential {
            token_id: record.id,
            username: record.username,
            scopes: record.scopes,
        }))
    }

    /// Bearer tokens are OAuth tokens first, personal access tokens second.
    async fn lookup_bearer(&self, secret: &str) -> Result<PresentedUserToken, ApiError> {
        if let Some(record) = self.tokens.oauth_token(secret).await? {
            return Ok(PresentedUserToken {
                record,
                method: AuthMethod::OAuth,
            });
        }
        let record = self
            .tokens
            .personal_access_token(secret)
            .await?
            .ok_or(unauthenticated(AuthFailure::UnknownToken))?;
        Ok(PresentedUserToken {
            record,
            method: AuthMethod::PersonalAccessToken,
        })
    }

    async fn resolve_user_token(
        &self,
        presented: PresentedUserToken,
        today: NaiveDate,
    ) -> Result<Credential, ApiError> {
        let PresentedUserToken { record, method } = presented;
        if record.revoked {
            return Err(unauthenticated(AuthFailure::Revoked));
        }
        if record.is_expired(today) {
            return Err(unauthenticated(AuthFailure::Expired));
        }
        if record.scopes.is_empty() {
            return Err(unauthenticated(AuthFailure::EmptyScopes));
        }
        let user = self
            .entities
            .user(record.user_id)
            .await?
            .ok_or(unauthenticated(AuthFailure::UserMissing))?;
        if !user.is_active() {
            return Err(unauthenticated(AuthFailure::UserBlocked));
        }
        Ok(Credential::User(UserCredential {
            user_id: user.id,
            username: user.username,
            method,
            token_id: Some(record.id),
            scopes: record.scopes,
        }))
    }

    /// Unknown session ids fall back to anonymous: stale cookies are normal.
    async fn resolve_session(&self, session_id: &str) -> Result<Credential, ApiError> {
        let Some(user_id) = self.tokens.session_user(session_id).await? else {
            return Ok(Credential::Anonymous);
        };
        let user = self
            .entities
            .user(user_id)
            .await?
            .ok_or(unauthenticated(AuthFailure::UserMissing))?;
        if !user.is_active() {
            return Err(unauthenticated(AuthFailure::UserBlocked));
        }
        Ok(Credential::User(UserCredential {
            user_id: user.id,
            username: user.username,
            method: AuthMethod::Session,
            token_id: None,
            scopes: ScopeSet::from([Scope::API]),
        }))
    }
}

#[cfg(test)]
mod tests {
    use apigate_core::{DeployTokenId, DeployTokenRecord, User, UserId, UserState};
    use axum::http::{HeaderValue, Method};

    use super::*;
    use crate::storage::InMemoryStore;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn token(id: u64, user: u64, scopes: &[Scope]) -> UserTokenRecord {
        UserTokenRecord {
            id,
            user_id: UserId(user),
            scopes: scopes.iter().cloned().collect(),
            revoked: false,
            expires_at: None,
        }
    }

    fn store() -> Arc<InMemoryStore> {
        let store = InMemoryStore::new();
        store.insert_user(User {
            id: UserId(1),
            username: "maria".to_string(),
            state: UserState::Active,
            admin: false,
        });
        store.insert_user(User {
            id: UserId(2),
            username: "blocked".to_string(),
            state: UserState::Blocked,
            admin: false,
        });
        store.insert_personal_access_token("pat-api", token(10, 1, &[Scope::API]));
        store.insert_personal_access_token("pat-read", token(11, 1, &[Scope::READ_API]));
        store.insert_personal_access_token("pat-blocked", token(12, 2, &[Scope::API]));
        store.insert_personal_access_token("pat-orphan", token(13, 99, &[Scope::API]));
        store.insert_personal_access_token("pat-empty", token(14, 1, &[]));
        store.insert_personal_access_token(
            "pat-revoked",
            UserTokenRecord {
                revoked: true,
                ..token(15, 1, &[Scope::API])
            },
        );
        store.insert_personal_access_token(
            "pat-expired",
            UserTokenRecord {
                expires_at: NaiveDate::from_ymd_opt(2024, 6, 14),
                ..token(16, 1, &[Scope::API])
            },
        );
        store.insert_personal_access_token(
            "pat-expires-today",
            UserTokenRecord {
                expires_at: Some(today()),
                ..token(17, 1, &[Scope::API])
            },
        );
        store.insert_oauth_token("oauth-api", token(20, 1, &[Scope::API]));
        store.insert_deploy_token(
            "deploy",
            DeployTokenRecord {
                id: DeployTokenId(4),
                username: "deploy-token-4".to_string(),
                scopes: ScopeSet::from([Scope::READ_PACKAGE_REGISTRY]),
                revoked: false,
                expires_at: None,
            },
        );
        store.insert_deploy_token(
            "deploy-revoked",
            DeployTokenRecord {
                id: DeployTokenId(5),
                username: "deploy-token-5".to_string(),
                scopes: ScopeSet::from([Scope::READ_PACKAGE_REGISTRY]),
                revoked: true,
                expires_at: None,
            },
        );
        store.insert_session("s3ss10n", UserId(1));
        Arc::new(store)
    }

    fn resolver() -> CredentialResolver {
        let store = store();
        CredentialResolver::new(store.clone(), store, &ServerConfig::default())
    }

    fn request(headers: &[(&'static str, &str)]) -> ApiRequest {
        let mut req = ApiRequest::new(Method::GET, "/api/v4/users".parse().unwrap(), "127.0.0.1");
        for (name, value) in headers {
            req.headers
                .append(*name, HeaderValue::from_str(value).unwrap());
        }
        req
    }

    fn params(pairs: &[(&str, &str)]) -> ApiParams {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
            .collect()
    }

    async fn resolve(
        headers: &[(&'static str, &str)],
        query: &[(&str, &str)],
    ) -> Result<Credential, ApiError> {
        resolver()
            .resolve(&request(headers), &params(query), today())
            .await
    }

    fn reason(result: Result<Credential, ApiError>) -> AuthFailure {
        match result {
            Err(ApiError::Unauthenticated { reason }) => reason,
            other => panic!("expected unauthenticated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_credential_is_anonymous() {
        assert_eq!(resolve(&[], &[]).await.unwrap(), Credential::Anonymous);
    }

    #[tokio::test]
    async fn private_token_param_and_header_resolve_user() {
        let from_param = resolve(&[], &[("private_token", "pat-api")]).await.unwrap();
        let from_header = resolve(&[("private-token", "pat-api")], &[]).await.unwrap();
        assert_eq!(from_param, from_header);
        assert_eq!(from_param.user_id(), Some(UserId(1)));
        assert_eq!(from_param.kind(), "personal_access_token");
    }

    #[tokio::test]
    async fn bearer_prefers_oauth_then_falls_back_to_pat() {
        let oauth = resolve(&[("authorization", "Bearer oauth-api")], &[]).await.unwrap();
        assert_eq!(oauth.kind(), "oauth");

        let pat = resolve(&[("authorization", "bearer pat-read")], &[]).await.unwrap();
        assert_eq!(pat.kind(), "personal_access_token");
        assert!(pat.scopes().unwrap().contains(&Scope::READ_API));

        let param = resolve(&[], &[("access_token", "oauth-api")]).await.unwrap();
        assert_eq!(param.kind(), "oauth");
    }

    #[tokio::test]
    async fn deploy_token_header_wins() {
        let cred = resolve(&[("deploy-token", "deploy"), ("private-token", "pat-api")], &[])
            .await
            .unwrap();
        assert!(matches!(cred, Credential::DeployToken(ref d) if d.token_id == DeployTokenId(4)));
    }

    #[tokio::test]
    async fn private_token_beats_bearer_and_session() {
        let cred = resolve(
            &[
                ("authorization", "Bearer oauth-api"),
                ("cookie", "_apigate_session=s3ss10n"),
            ],
            &[("private_token", "pat-read")],
        )
        .await
        .unwrap();
        assert_eq!(cred.kind(), "personal_access_token");
    }

    #[tokio::test]
    async fn session_cookie_resolves_user_with_api_scope() {
        let cred = resolve(&[("cookie", "theme=dark; _apigate_session=s3ss10n")], &[])
            .await
            .unwrap();
        assert_eq!(cred.kind(), "session");
        assert!(cred.scopes().unwrap().contains(&Scope::API));

        let stale = resolve(&[("cookie", "_apigate_session=gone")], &[]).await.unwrap();
        assert!(stale.is_anonymous());
    }

    #[tokio::test]
    async fn rejected_tokens_keep_their_reason() {
        let cases: [(&[(&'static str, &str)], &[(&str, &str)], AuthFailure); 8] = [
            (&[], &[("private_token", "nope")], AuthFailure::UnknownToken),
            (&[], &[("private_token", "pat-revoked")], AuthFailure::Revoked),
            (&[], &[("private_token", "pat-expired")], AuthFailure::Expired),
            (&[], &[("private_token", "pat-empty")], AuthFailure::EmptyScopes),
            (&[], &[("private_token", "pat-blocked")], AuthFailure::UserBlocked),
            (&[], &[("private_token", "pat-orphan")], AuthFailure::UserMissing),
            (&[("authorization", "Bearer nope")], &[], AuthFailure::UnknownToken),
            (&[("deploy-token", "deploy-revoked")], &[], AuthFailure::Revoked),
        ];
        for (headers, query, expected) in cases {
            assert_eq!(reason(resolve(headers, query).await), expected);
        }
    }

    #[tokio::test]
    async fn token_expiring_today_is_valid() {
        let cred = resolve(&[], &[("private_token", "pat-expires-today")]).await.unwrap();
        assert_eq!(cred.user_id(), Some(UserId(1)));
    }
}
