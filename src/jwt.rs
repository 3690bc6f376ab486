//! JWT service — signs and verifies the two JWTs this crate owns: the
//! external authentication assertion and the internal IdP session token.
//!
//! Claims are a plain serde struct, keys are built from a shared secret via
//! `DecodingKey`/`EncodingKey`. No JWKS/OIDC-discovery machinery, since both
//! tokens here are issued and validated by this same service.

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AuthError;

/// External JWT collaborator. A generic `claims` payload
/// in, a signed compact token out; verification is audience/issuer-scoped.
#[async_trait]
pub trait JwtService: Send + Sync + std::fmt::Debug {
    /// Sign `claims` (merged with `sub`/`aud`/`iss`/`iat`/`exp`) and return
    /// `(token, exp)`.
    async fn generate_jwt(
        &self,
        sub: &str,
        aud: &str,
        iss: &str,
        ttl_seconds: i64,
        claims: Value,
    ) -> Result<(String, i64), AuthError>;

    /// Verify signature, issuer, and audience. Does not decode claims.
    async fn verify_jwt(&self, token: &str, expected_aud: &str, expected_iss: &str) -> Result<(), AuthError>;

    /// Decode the payload without checking the signature.
    async fn decode_payload(&self, token: &str) -> Result<Value, AuthError>;
}

/// HMAC-backed `JwtService` implementation.
#[derive(Debug)]
pub struct HmacJwtService {
    secret: SecretString,
}

impl HmacJwtService {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.secret.expose_secret().as_bytes())
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.secret.expose_secret().as_bytes())
    }
}

#[async_trait]
impl JwtService for HmacJwtService {
    async fn generate_jwt(
        &self,
        sub: &str,
        aud: &str,
        iss: &str,
        ttl_seconds: i64,
        claims: Value,
    ) -> Result<(String, i64), AuthError> {
        let now = chrono::Utc::now().timestamp();
        let exp = now + ttl_seconds;

        let mut payload = match claims {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(AuthError::JwtSign(format!(
                    "claims must be a JSON object, got {other}"
                )))
            }
        };
        payload.insert("sub".to_string(), Value::String(sub.to_string()));
        payload.insert("aud".to_string(), Value::String(aud.to_string()));
        payload.insert("iss".to_string(), Value::String(iss.to_string()));
        payload.insert("iat".to_string(), Value::Number(now.into()));
        payload.insert("exp".to_string(), Value::Number(exp.into()));

        let token = encode(&Header::new(Algorithm::HS256), &payload, &self.encoding_key())
            .map_err(|e| AuthError::JwtSign(e.to_string()))?;
        Ok((token, exp))
    }

    async fn verify_jwt(&self, token: &str, expected_aud: &str, expected_iss: &str) -> Result<(), AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[expected_aud]);
        validation.set_issuer(&[expected_iss]);
        decode::<Value>(token, &self.decoding_key(), &validation)
            .map_err(|e| AuthError::InvalidAssertion(e.to_string()))?;
        Ok(())
    }

    async fn decode_payload(&self, token: &str) -> Result<Value, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        let data = decode::<Value>(token, &self.decoding_key(), &validation)
            .map_err(|e| AuthError::InvalidAssertion(e.to_string()))?;
        Ok(data.claims)
    }
}

/// Shape of the claims this crate attaches to an assertion beyond the
/// standard registered claims, used for (de)serializing the `assurance`
/// sub-object and optional `userType`/`organizationUnit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "userType")]
    pub user_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "organizationUnit")]
    pub organization_unit: Option<String>,
    pub assurance: crate::assurance::AssuranceContext,
}
