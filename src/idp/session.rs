//! IdP session token — component F.
//!
//! Short-lived JWT binding `start_idp_authentication` to
//! `finish_idp_authentication`. The server holds no per-flow state; the
//! signed token itself is the only linkage.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AuthError, IdpSessionError};
use crate::jwt::JwtService;
use crate::registry::IdpType;

const SUBJECT: &str = "auth-svc";
const AUDIENCE: &str = "auth-svc";
const TTL_SECONDS: i64 = 600;

/// The `auth_data` payload carried inside the session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpSessionClaims {
    pub idp_id: String,
    pub idp_type: IdpType,
}

/// Issues and validates IdP session tokens on top of a [`JwtService`].
#[derive(Debug, Clone)]
pub struct IdpSessionService {
    jwt: Arc<dyn JwtService>,
    issuer: String,
}

impl IdpSessionService {
    #[must_use]
    pub fn new(jwt: Arc<dyn JwtService>, issuer: impl Into<String>) -> Self {
        Self {
            jwt,
            issuer: issuer.into(),
        }
    }

    pub async fn issue(&self, idp_id: &str, idp_type: IdpType) -> Result<String, AuthError> {
        let claims = json!({
            "auth_data": {
                "idp_id": idp_id,
                "idp_type": idp_type,
            }
        });
        let (token, _exp) = self
            .jwt
            .generate_jwt(SUBJECT, AUDIENCE, &self.issuer, TTL_SECONDS, claims)
            .await?;
        Ok(token)
    }

    /// Verify signature/audience/issuer/expiry, then decode and validate
    /// the `auth_data` claim. All failures map to `InvalidSessionToken`.
    pub async fn verify_and_decode(&self, token: &str) -> Result<IdpSessionClaims, AuthError> {
        self.jwt
            .verify_jwt(token, AUDIENCE, &self.issuer)
            .await
            .map_err(|e| IdpSessionError::InvalidSessionToken(e.to_string()))?;

        let payload = self
            .jwt
            .decode_payload(token)
            .await
            .map_err(|e| IdpSessionError::InvalidSessionToken(e.to_string()))?;

        let auth_data = payload
            .get("auth_data")
            .ok_or_else(|| IdpSessionError::InvalidSessionToken("missing auth_data claim".to_string()))?;

        let claims: IdpSessionClaims = serde_json::from_value(auth_data.clone())
            .map_err(|e| IdpSessionError::InvalidSessionToken(format!("malformed auth_data: {e}")))?;

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::HmacJwtService;
    use secrecy::SecretString;

    fn session_service() -> IdpSessionService {
        let jwt = Arc::new(HmacJwtService::new(SecretString::new(
            "idp-session-secret".to_string(),
        )));
        IdpSessionService::new(jwt, "auth-core")
    }

    #[tokio::test]
    async fn issue_then_verify_round_trips() {
        let svc = session_service();
        let token = svc.issue("idp-1", IdpType::OAuth).await.unwrap();
        let claims = svc.verify_and_decode(&token).await.unwrap();
        assert_eq!(claims.idp_id, "idp-1");
        assert_eq!(claims.idp_type, IdpType::OAuth);
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let svc = session_service();
        let token = svc.issue("idp-1", IdpType::OAuth).await.unwrap();
        let tampered = format!("{token}x");
        assert!(svc.verify_and_decode(&tampered).await.is_err());
    }
}
