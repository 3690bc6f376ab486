//! Authentication orchestrator — component G, the top-level service.
//!
//! Stateless state machine: every public method either delegates to an
//! external collaborator or to one of the other in-crate components, then
//! runs the shared `validate_and_append_assertion` subroutine to chain the
//! assurance context forward.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use crate::assurance::{self, AssuranceContext, AuthenticatorReference};
use crate::directory::{CredentialsAuthService, User};
use crate::error::AuthError;
use crate::idp::{IdpClient, IdpSessionService};
use crate::jwt::{AssertionClaims, JwtService};
use crate::otp::{OtpChannel, OtpService};
use crate::registry::{AuthenticatorRegistry, IdpType};

/// What the caller gets back from every authentication step.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthenticationResponse {
    pub id: String,
    #[serde(rename = "userType")]
    pub user_type: String,
    #[serde(rename = "organizationUnit")]
    pub organization_unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion: Option<String>,
}

/// JWT configuration the orchestrator signs assertions with.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub validity_period_seconds: i64,
}

const ASSERTION_AUDIENCE: &str = "application";

/// The top-level authentication service.
#[derive(Clone)]
pub struct AuthOrchestrator {
    registry: AuthenticatorRegistry,
    credentials: Arc<dyn CredentialsAuthService>,
    otp: Arc<dyn OtpService>,
    jwt: Arc<dyn JwtService>,
    idp_session: IdpSessionService,
    idp_clients: HashMap<IdpType, Arc<dyn IdpClient>>,
    idp_service: Arc<dyn crate::idp::IdpService>,
    jwt_config: JwtConfig,
}

impl std::fmt::Debug for AuthOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthOrchestrator").finish_non_exhaustive()
    }
}

impl AuthOrchestrator {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        registry: AuthenticatorRegistry,
        credentials: Arc<dyn CredentialsAuthService>,
        otp: Arc<dyn OtpService>,
        jwt: Arc<dyn JwtService>,
        idp_session: IdpSessionService,
        idp_clients: HashMap<IdpType, Arc<dyn IdpClient>>,
        idp_service: Arc<dyn crate::idp::IdpService>,
        jwt_config: JwtConfig,
    ) -> Self {
        Self {
            registry,
            credentials,
            otp,
            jwt,
            idp_session,
            idp_clients,
            idp_service,
            jwt_config,
        }
    }

    /// Authenticate with password credentials, then chain the assertion.
    #[instrument(skip(self, attributes, prior_assertion))]
    pub async fn authenticate_with_credentials(
        &self,
        attributes: HashMap<String, String>,
        skip_assertion: bool,
        prior_assertion: Option<&str>,
    ) -> Result<AuthenticationResponse, AuthError> {
        let user = self.credentials.authenticate(&attributes).await?;
        self.finish_with_authenticator(user, "Credentials", skip_assertion, prior_assertion).await
    }

    /// `send_otp` — pass-through to component C.
    #[instrument(skip(self))]
    pub async fn send_otp(&self, sender_id: &str, channel: OtpChannel, recipient: &str) -> Result<String, AuthError> {
        self.otp.send_otp(sender_id, channel, recipient).await.map_err(AuthError::from)
    }

    /// Redeem an OTP session, then chain the assertion.
    #[instrument(skip(self, prior_assertion, code))]
    pub async fn verify_otp(
        &self,
        otp_session: &str,
        skip_assertion: bool,
        prior_assertion: Option<&str>,
        code: &str,
    ) -> Result<AuthenticationResponse, AuthError> {
        let (user, channel) = self.otp.verify_otp(otp_session, code).await?;
        let authenticator_name = channel.authenticator_name();
        self.finish_with_authenticator(user, authenticator_name, skip_assertion, prior_assertion).await
    }

    /// Begin a federated login: validate the requested IdP type, build the
    /// authorize URL, and issue an IdP session token.
    #[instrument(skip(self))]
    pub async fn start_idp_authentication(
        &self,
        requested_type: Option<IdpType>,
        idp_id: &str,
    ) -> Result<(String, String), AuthError> {
        if idp_id.is_empty() {
            return Err(AuthError::InvalidRequest("idp_id is required".to_string()));
        }
        let record = self.idp_service.get_identity_provider(idp_id).await?;
        if let Some(requested) = requested_type {
            if !IdpType::cross_allowed(requested, record.idp_type) {
                return Err(AuthError::InvalidIdpType);
            }
        }

        let client = self.client_for(record.idp_type)?;
        let redirect_url = client.build_authorize_url(idp_id).await?;
        let session_token = self.idp_session.issue(idp_id, record.idp_type).await?;
        Ok((redirect_url, session_token))
    }

    /// Complete a federated login: verify the IdP session token, exchange the
    /// authorization code, resolve the internal user, then chain the assertion.
    #[instrument(skip(self, prior_assertion, code))]
    pub async fn finish_idp_authentication(
        &self,
        requested_type: Option<IdpType>,
        session_token: &str,
        skip_assertion: bool,
        prior_assertion: Option<&str>,
        code: &str,
    ) -> Result<AuthenticationResponse, AuthError> {
        if session_token.is_empty() || code.is_empty() {
            return Err(AuthError::InvalidRequest("session_token and code are required".to_string()));
        }
        let claims = self.idp_session.verify_and_decode(session_token).await?;
        if let Some(requested) = requested_type {
            if !IdpType::cross_allowed(requested, claims.idp_type) {
                return Err(AuthError::InvalidIdpType);
            }
        }

        let client = self.client_for(claims.idp_type)?;
        let sub = client.resolve_subject(&claims.idp_id, code).await?;
        let user = client.get_internal_user(&sub).await?;

        let authenticator_name = self.registry.name_for_idp_type(claims.idp_type)?.to_string();
        self.finish_with_authenticator(user, &authenticator_name, skip_assertion, prior_assertion).await
    }

    fn client_for(&self, idp_type: IdpType) -> Result<Arc<dyn IdpClient>, AuthError> {
        self.idp_clients
            .get(&idp_type)
            .cloned()
            .ok_or(AuthError::InvalidIdpId)
    }

    async fn finish_with_authenticator(
        &self,
        user: User,
        authenticator_name: &str,
        skip_assertion: bool,
        prior_assertion: Option<&str>,
    ) -> Result<AuthenticationResponse, AuthError> {
        if skip_assertion {
            return Ok(AuthenticationResponse {
                id: user.id,
                user_type: user.user_type,
                organization_unit: user.organization_unit,
                assertion: None,
            });
        }

        let assertion = self
            .validate_and_append_assertion(&user, authenticator_name, prior_assertion)
            .await?;

        Ok(AuthenticationResponse {
            id: user.id,
            user_type: user.user_type,
            organization_unit: user.organization_unit,
            assertion: Some(assertion),
        })
    }

    /// The shared assertion-chaining subroutine used by every successful
    /// authentication path.
    async fn validate_and_append_assertion(
        &self,
        user: &User,
        authenticator_name: &str,
        prior_assertion: Option<&str>,
    ) -> Result<String, AuthError> {
        let timestamp = chrono::Utc::now().timestamp();

        let new_ref = AuthenticatorReference {
            authenticator_name: authenticator_name.to_string(),
            step: 0,
            timestamp,
        };

        let assurance = match prior_assertion {
            None => {
                let mut r = new_ref;
                r.step = 1;
                assurance::generate(vec![r], &self.registry)?
            }
            Some(token) => {
                self.jwt
                    .verify_jwt(token, ASSERTION_AUDIENCE, &self.jwt_config.issuer)
                    .await
                    .map_err(|_| AuthError::InvalidAssertion("signature verification failed".to_string()))?;
                let payload = self.jwt.decode_payload(token).await?;

                let sub = payload
                    .get("sub")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| AuthError::InvalidAssertion("missing or empty sub claim".to_string()))?;
                if sub != user.id {
                    return Err(AuthError::AssertionSubjectMismatch);
                }

                let assurance_claim = payload
                    .get("assurance")
                    .ok_or_else(|| AuthError::InvalidAssertion("missing assurance claim".to_string()))?;
                let prior: AssuranceContext = serde_json::from_value(assurance_claim.clone())
                    .map_err(|e| AuthError::InvalidAssertion(format!("malformed assurance claim: {e}")))?;

                assurance::update(&prior, new_ref, &self.registry)?
            }
        };

        let claims = AssertionClaims {
            user_type: non_empty(&user.user_type),
            organization_unit: non_empty(&user.organization_unit),
            assurance,
        };
        let claims_value = serde_json::to_value(claims).map_err(|e| AuthError::JwtSign(e.to_string()))?;

        let (token, _exp) = self
            .jwt
            .generate_jwt(
                &user.id,
                ASSERTION_AUDIENCE,
                &self.jwt_config.issuer,
                self.jwt_config.validity_period_seconds,
                claims_value,
            )
            .await?;

        Ok(token)
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryCredentialsAuthService;
    use crate::idp::client::InMemoryIdpClient;
    use crate::idp::InMemoryIdpService;
    use crate::jwt::HmacJwtService;
    use crate::otp::InMemoryOtpService;
    use crate::registry::{AuthenticatorMetadata, FactorCategory, Ial};
    use secrecy::SecretString;
    use serde_json::json;

    fn registry() -> AuthenticatorRegistry {
        let mut b = AuthenticatorRegistry::builder();
        b.register(AuthenticatorMetadata::new("Credentials", [FactorCategory::Knowledge])).unwrap();
        b.register(AuthenticatorMetadata::new("SMSOTP", [FactorCategory::Possession])).unwrap();
        b.register(AuthenticatorMetadata::new("EmailOTP", [FactorCategory::Possession])).unwrap();
        b.register(
            AuthenticatorMetadata::new("Passkey", [FactorCategory::Possession, FactorCategory::Inherence])
                .with_ial(Ial::Ial2),
        )
        .unwrap();
        b.register(
            AuthenticatorMetadata::new("OAuthIdP", [FactorCategory::Possession]).with_idp_type(IdpType::OAuth),
        )
        .unwrap();
        b.register(
            AuthenticatorMetadata::new("OIDCIdP", [FactorCategory::Possession]).with_idp_type(IdpType::OIDC),
        )
        .unwrap();
        b.register(
            AuthenticatorMetadata::new("GoogleIdP", [FactorCategory::Possession]).with_idp_type(IdpType::Google),
        )
        .unwrap();
        b.register(
            AuthenticatorMetadata::new("GitHubIdP", [FactorCategory::Possession]).with_idp_type(IdpType::GitHub),
        )
        .unwrap();
        b.build()
    }

    fn alice() -> User {
        User { id: "alice".to_string(), user_type: "standard".to_string(), organization_unit: String::new() }
    }

    fn build_orchestrator() -> (AuthOrchestrator, Arc<InMemoryCredentialsAuthService>, Arc<InMemoryOtpService>, Arc<InMemoryIdpClient>, Arc<InMemoryIdpService>) {
        let creds = Arc::new(InMemoryCredentialsAuthService::new());
        creds.seed("alice", "pw", alice());
        let otp = Arc::new(InMemoryOtpService::new());
        let jwt: Arc<dyn JwtService> = Arc::new(HmacJwtService::new(SecretString::new("test-secret-value".to_string())));
        let idp_session = IdpSessionService::new(jwt.clone(), "auth-core");
        let idp_client = Arc::new(InMemoryIdpClient::new());
        let idp_service = Arc::new(InMemoryIdpService::new());

        let mut idp_clients: HashMap<IdpType, Arc<dyn IdpClient>> = HashMap::new();
        idp_clients.insert(IdpType::OAuth, idp_client.clone());
        idp_clients.insert(IdpType::OIDC, idp_client.clone());
        idp_clients.insert(IdpType::Google, idp_client.clone());
        idp_clients.insert(IdpType::GitHub, idp_client.clone());

        let orchestrator = AuthOrchestrator::new(
            registry(),
            creds.clone(),
            otp.clone(),
            jwt,
            idp_session,
            idp_clients,
            idp_service.clone(),
            JwtConfig { issuer: "auth-core".to_string(), validity_period_seconds: 3600 },
        );
        (orchestrator, creds, otp, idp_client, idp_service)
    }

    #[tokio::test]
    async fn credentials_then_otp_step_up_reaches_aal2() {
        let (orchestrator, _creds, otp, _idp, _idp_svc) = build_orchestrator();
        let attrs = HashMap::from([
            ("username".to_string(), "alice".to_string()),
            ("password".to_string(), "pw".to_string()),
        ]);
        let response = orchestrator
            .authenticate_with_credentials(attrs, false, None)
            .await
            .unwrap();
        let assertion = response.assertion.unwrap();

        otp.seed("otp-session-+15550001", "123456", alice(), OtpChannel::Sms);
        let session_token = orchestrator.send_otp("sender-x", OtpChannel::Sms, "+15550001").await.unwrap();

        let response2 = orchestrator
            .verify_otp(&session_token, false, Some(&assertion), "123456")
            .await
            .unwrap();
        let assertion2 = response2.assertion.unwrap();
        assert!(assertion2.len() > 10);
    }

    #[tokio::test]
    async fn skip_assertion_omits_jwt() {
        let (orchestrator, _creds, _otp, _idp, _idp_svc) = build_orchestrator();
        let attrs = HashMap::from([
            ("username".to_string(), "alice".to_string()),
            ("password".to_string(), "pw".to_string()),
        ]);
        let response = orchestrator.authenticate_with_credentials(attrs, true, None).await.unwrap();
        assert!(response.assertion.is_none());
    }

    #[tokio::test]
    async fn federated_oauth_round_trip() {
        let (orchestrator, _creds, _otp, idp_client, idp_service) = build_orchestrator();
        idp_service.register("idp-1", IdpType::OAuth);
        idp_client.seed_code("code-abc", json!({"sub": "u42"}));
        idp_client.seed_user("u42", User { id: "u42".to_string(), user_type: String::new(), organization_unit: String::new() });

        let (redirect_url, session_token) = orchestrator
            .start_idp_authentication(Some(IdpType::OAuth), "idp-1")
            .await
            .unwrap();
        assert!(redirect_url.contains("idp-1") || redirect_url.starts_with("https://"));

        let response = orchestrator
            .finish_idp_authentication(Some(IdpType::OAuth), &session_token, true, None, "code-abc")
            .await
            .unwrap();
        assert_eq!(response.id, "u42");
        assert!(response.assertion.is_none());
    }

    #[tokio::test]
    async fn federated_login_requesting_assertion_reaches_aal1() {
        let (orchestrator, _creds, _otp, idp_client, idp_service) = build_orchestrator();
        idp_service.register("idp-4", IdpType::OAuth);
        idp_client.seed_code("code-xyz", json!({"sub": "u99"}));
        idp_client.seed_user("u99", User { id: "u99".to_string(), user_type: String::new(), organization_unit: String::new() });

        let (_, session_token) = orchestrator
            .start_idp_authentication(Some(IdpType::OAuth), "idp-4")
            .await
            .unwrap();

        let response = orchestrator
            .finish_idp_authentication(Some(IdpType::OAuth), &session_token, false, None, "code-xyz")
            .await
            .unwrap();
        assert_eq!(response.id, "u99");
        assert!(response.assertion.is_some());
    }

    #[tokio::test]
    async fn cross_type_oidc_to_oauth_is_accepted() {
        let (orchestrator, _creds, _otp, idp_client, idp_service) = build_orchestrator();
        idp_service.register("idp-2", IdpType::OIDC);
        idp_client.seed_code("code-2", json!({"sub": "u7"}));
        idp_client.seed_user("u7", User { id: "u7".to_string(), user_type: String::new(), organization_unit: String::new() });

        let (_, session_token) = orchestrator
            .start_idp_authentication(Some(IdpType::OAuth), "idp-2")
            .await
            .unwrap();
        let response = orchestrator
            .finish_idp_authentication(Some(IdpType::OAuth), &session_token, true, None, "code-2")
            .await
            .unwrap();
        assert_eq!(response.id, "u7");
    }

    #[tokio::test]
    async fn type_mismatch_outside_cross_allowed_set_is_rejected() {
        let (orchestrator, _creds, _otp, _idp_client, idp_service) = build_orchestrator();
        idp_service.register("idp-3", IdpType::GitHub);
        let err = orchestrator
            .start_idp_authentication(Some(IdpType::Google), "idp-3")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidIdpType));
    }

    #[tokio::test]
    async fn assertion_subject_mismatch_is_rejected() {
        let (orchestrator, creds, _otp, _idp, _idp_svc) = build_orchestrator();
        creds.seed(
            "bob",
            "pw2",
            User { id: "u1".to_string(), user_type: String::new(), organization_unit: String::new() },
        );
        let attrs1 = HashMap::from([
            ("username".to_string(), "bob".to_string()),
            ("password".to_string(), "pw2".to_string()),
        ]);
        let first = orchestrator.authenticate_with_credentials(attrs1, false, None).await.unwrap();
        let prior = first.assertion.unwrap();

        let attrs2 = HashMap::from([
            ("username".to_string(), "alice".to_string()),
            ("password".to_string(), "pw".to_string()),
        ]);
        let err = orchestrator
            .authenticate_with_credentials(attrs2, false, Some(&prior))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AssertionSubjectMismatch));
    }
}
