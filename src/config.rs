//! Config & registry wiring — component I.
//!
//! The composition root: registers the built-in authenticators exactly
//! once, builds the passkey session store and spawns its evictor, and
//! wires the external-collaborator trait objects the orchestrator depends
//! on, as a plain-struct configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::directory::{CredentialsAuthService, UserDirectory};
use crate::error::AuthError;
use crate::idp::{IdpClient, IdpService, IdpSessionService};
use crate::jwt::{HmacJwtService, JwtService};
use crate::orchestrator::{AuthOrchestrator, JwtConfig};
use crate::otp::OtpService;
use crate::passkey::{PasskeyCeremonyEngine, PasskeySessionStore};
use crate::registry::{AuthenticatorMetadata, AuthenticatorRegistry, FactorCategory, Ial, IdpType};

/// Deployment-level configuration. Session TTL and cleanup
/// interval are build-time constants (see [`crate::passkey::store`]) but
/// may be overridden here for tests.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthCoreConfig {
    pub jwt_issuer: String,
    pub jwt_validity_period_seconds: i64,
    #[serde(default = "default_allowed_origins")]
    pub passkey_allowed_origins: Vec<String>,
    pub server_identifier: String,
    #[serde(default = "default_cleanup_interval")]
    pub passkey_cleanup_interval_seconds: u64,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["https://localhost:8090".to_string()]
}

fn default_cleanup_interval() -> u64 {
    crate::passkey::store::DEFAULT_CLEANUP_INTERVAL_SECONDS
}

impl Default for AuthCoreConfig {
    fn default() -> Self {
        Self {
            jwt_issuer: "auth-core".to_string(),
            jwt_validity_period_seconds: 3600,
            passkey_allowed_origins: default_allowed_origins(),
            server_identifier: "default".to_string(),
            passkey_cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

/// External collaborators the orchestrator and passkey engine depend on.
/// Supplied by the embedding application; this crate ships only in-memory
/// test doubles (see each module's `InMemory*` type).
pub struct Collaborators {
    pub user_directory: Arc<dyn UserDirectory>,
    pub credentials_auth: Arc<dyn CredentialsAuthService>,
    pub otp_service: Arc<dyn OtpService>,
    pub idp_service: Arc<dyn IdpService>,
    pub idp_clients: HashMap<IdpType, Arc<dyn IdpClient>>,
    pub jwt_signing_secret: SecretString,
}

/// Fully wired authentication core: the orchestrator plus the standalone
/// passkey ceremony engine.
pub struct AuthCore {
    pub orchestrator: AuthOrchestrator,
    pub passkey_engine: PasskeyCeremonyEngine,
    pub passkey_store: Arc<PasskeySessionStore>,
}

impl AuthCore {
    /// Build the registry, session store (with evictor spawned), JWT
    /// service, IdP session service, and the orchestrator, in that order.
    pub fn new(config: AuthCoreConfig, collaborators: Collaborators) -> Result<Self, AuthError> {
        let registry = build_default_registry()?;

        let passkey_store = Arc::new(PasskeySessionStore::new());
        passkey_store.spawn_evictor(Duration::from_secs(config.passkey_cleanup_interval_seconds));

        let jwt: Arc<dyn JwtService> = Arc::new(HmacJwtService::new(collaborators.jwt_signing_secret));
        let idp_session = IdpSessionService::new(jwt.clone(), config.jwt_issuer.clone());

        let rp_origin_str = config
            .passkey_allowed_origins
            .first()
            .cloned()
            .unwrap_or_else(|| "https://localhost:8090".to_string());
        let rp_origin = url::Url::parse(&rp_origin_str)
            .map_err(|e| AuthError::Internal(format!("invalid passkey allowed_origin: {e}")))?;
        let rp_id = rp_origin.host_str().unwrap_or("localhost").to_string();

        let passkey_engine = PasskeyCeremonyEngine::new(
            &rp_id,
            &rp_origin,
            Arc::clone(&passkey_store),
            Arc::clone(&collaborators.user_directory),
        )?;

        let orchestrator = AuthOrchestrator::new(
            registry,
            collaborators.credentials_auth,
            collaborators.otp_service,
            jwt,
            idp_session,
            collaborators.idp_clients,
            collaborators.idp_service,
            JwtConfig {
                issuer: config.jwt_issuer,
                validity_period_seconds: config.jwt_validity_period_seconds,
            },
        );

        Ok(Self { orchestrator, passkey_engine, passkey_store })
    }

    /// Signal the passkey evictor to perform one final sweep and stop.
    pub fn shutdown(&self) {
        self.passkey_store.shutdown();
    }
}

/// Register every built-in authenticator exactly once.
/// registration is explicit and total — no lazy/implicit registration.
fn build_default_registry() -> Result<AuthenticatorRegistry, AuthError> {
    let mut builder = AuthenticatorRegistry::builder();
    builder
        .register(AuthenticatorMetadata::new("Credentials", [FactorCategory::Knowledge]))
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    builder
        .register(AuthenticatorMetadata::new("SMSOTP", [FactorCategory::Possession]))
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    builder
        .register(AuthenticatorMetadata::new("EmailOTP", [FactorCategory::Possession]))
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    builder
        .register(
            AuthenticatorMetadata::new("Passkey", [FactorCategory::Possession, FactorCategory::Inherence])
                .with_ial(Ial::Ial2),
        )
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    builder
        .register(
            AuthenticatorMetadata::new("OAuthIdP", [FactorCategory::Possession]).with_idp_type(IdpType::OAuth),
        )
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    builder
        .register(
            AuthenticatorMetadata::new("OIDCIdP", [FactorCategory::Possession]).with_idp_type(IdpType::OIDC),
        )
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    builder
        .register(
            AuthenticatorMetadata::new("GoogleIdP", [FactorCategory::Possession]).with_idp_type(IdpType::Google),
        )
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    builder
        .register(
            AuthenticatorMetadata::new("GitHubIdP", [FactorCategory::Possession]).with_idp_type(IdpType::GitHub),
        )
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    Ok(builder.build())
}
