//! External IdP client and IdP directory collaborators.
//!
//! Per-IdP OAuth/OIDC client bodies (token exchange, userinfo, ID-token
//! parsing) are explicitly out of scope for this crate; only the trait
//! boundary and in-memory test doubles live here.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::directory::User;
use crate::error::AuthError;
use crate::registry::IdpType;

/// One configured identity provider record.
#[derive(Debug, Clone)]
pub struct IdpRecord {
    pub id: String,
    pub idp_type: IdpType,
}

/// External IdP directory: resolves an `idp_id` to its configured type.
#[async_trait]
pub trait IdpService: Send + Sync + std::fmt::Debug {
    async fn get_identity_provider(&self, id: &str) -> Result<IdpRecord, AuthError>;
}

/// Per-type OAuth/OIDC client collaborator. The four IdP variants differ
/// only in whether the subject claim comes from an ID-token or a
/// userinfo endpoint.
#[async_trait]
pub trait IdpClient: Send + Sync + std::fmt::Debug {
    async fn build_authorize_url(&self, idp_id: &str) -> Result<String, AuthError>;

    /// Exchange an authorization `code` for tokens, then resolve `(sub, user)`.
    /// OIDC-family clients extract `sub` from the ID-token; OAuth-family
    /// clients fetch userinfo. Falls back to `id` when `sub` is absent,
    /// converting numeric ids to strings.
    async fn resolve_subject(&self, idp_id: &str, code: &str) -> Result<String, AuthError>;

    async fn get_internal_user(&self, sub: &str) -> Result<User, AuthError>;
}

/// In-memory `IdpService` test double.
#[derive(Debug, Default)]
pub struct InMemoryIdpService {
    records: RwLock<HashMap<String, IdpRecord>>,
}

impl InMemoryIdpService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: impl Into<String>, idp_type: IdpType) {
        let id = id.into();
        self.records
            .write()
            .unwrap()
            .insert(id.clone(), IdpRecord { id, idp_type });
    }
}

#[async_trait]
impl IdpService for InMemoryIdpService {
    async fn get_identity_provider(&self, id: &str) -> Result<IdpRecord, AuthError> {
        self.records
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| AuthError::InvalidRequest(format!("unknown idp '{id}'")))
    }
}

/// In-memory `IdpClient` test double, keyed by a seeded `code -> subject`
/// claims table. Subject extraction always prefers `sub`, falling back to
/// `id`, matching the orchestrator's contract.
#[derive(Debug, Default)]
pub struct InMemoryIdpClient {
    authorize_url: RwLock<Option<String>>,
    code_claims: RwLock<HashMap<String, Value>>,
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryIdpClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_authorize_url(&self, url: impl Into<String>) {
        *self.authorize_url.write().unwrap() = Some(url.into());
    }

    pub fn seed_code(&self, code: impl Into<String>, claims: Value) {
        self.code_claims.write().unwrap().insert(code.into(), claims);
    }

    pub fn seed_user(&self, sub: impl Into<String>, user: User) {
        self.users.write().unwrap().insert(sub.into(), user);
    }
}

fn extract_subject(claims: &Value) -> Result<String, AuthError> {
    if let Some(sub) = claims.get("sub") {
        if let Some(s) = sub.as_str() {
            return Ok(s.to_string());
        }
    }
    match claims.get("id") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(AuthError::InvalidAssertion(
            "id token / userinfo claims missing sub and id".to_string(),
        )),
    }
}

#[async_trait]
impl IdpClient for InMemoryIdpClient {
    async fn build_authorize_url(&self, idp_id: &str) -> Result<String, AuthError> {
        Ok(self
            .authorize_url
            .read()
            .unwrap()
            .clone()
            .unwrap_or_else(|| format!("https://provider/auth?idp={idp_id}")))
    }

    async fn resolve_subject(&self, _idp_id: &str, code: &str) -> Result<String, AuthError> {
        let claims = self
            .code_claims
            .read()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or_else(|| AuthError::InvalidRequest(format!("unknown authorization code '{code}'")))?;
        extract_subject(&claims)
    }

    async fn get_internal_user(&self, sub: &str) -> Result<User, AuthError> {
        self.users
            .read()
            .unwrap()
            .get(sub)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolve_subject_prefers_sub_over_id() {
        let client = InMemoryIdpClient::new();
        client.seed_code("code-1", json!({"sub": "u42", "id": 99}));
        let sub = client.resolve_subject("idp-1", "code-1").await.unwrap();
        assert_eq!(sub, "u42");
    }

    #[tokio::test]
    async fn resolve_subject_falls_back_to_numeric_id() {
        let client = InMemoryIdpClient::new();
        client.seed_code("code-2", json!({"id": 99}));
        let sub = client.resolve_subject("idp-1", "code-2").await.unwrap();
        assert_eq!(sub, "99");
    }

    #[tokio::test]
    async fn get_identity_provider_resolves_registered_type() {
        let svc = InMemoryIdpService::new();
        svc.register("idp-1", IdpType::OAuth);
        let record = svc.get_identity_provider("idp-1").await.unwrap();
        assert_eq!(record.idp_type, IdpType::OAuth);
    }
}
