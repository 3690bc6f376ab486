//! Passkey ceremony engine — component E.
//!
//! Wraps `webauthn-rs`'s `Webauthn` as the ceremony library collaborator,
//! grounded on production WebAuthn handlers (a Redis-backed `PasskeyService`
//! and a Rocket two-factor handler, both built on the same crate). Unlike
//! those handlers, sign-counter regression here is a hard failure rather
//! than a logged warning.

use std::sync::Arc;

use base64::Engine as _;
use chrono::Utc;
use serde_json::Value;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use webauthn_rs::prelude::{
    CreationChallengeResponse, Passkey, PasskeyAuthentication, PasskeyRegistration,
    PublicKeyCredential, RegisterPublicKeyCredential, RequestChallengeResponse, Webauthn,
    WebauthnBuilder,
};

use crate::directory::{Credential, UserDirectory};
use crate::error::{AuthError, PasskeyCeremonyError};
use crate::passkey::credential::{default_display_name, PasskeyCredential};
use crate::passkey::store::{generate_session_key, PasskeySessionStore, DEFAULT_SESSION_TTL_SECONDS};

const CREDENTIAL_TYPE: &str = "passkey";

/// Try RawURLEncoding first, then URLEncoding, then RawStdEncoding, then
/// StdEncoding. Output elsewhere in this module always uses RawURLEncoding.
fn tolerant_base64_decode(input: &str) -> Result<Vec<u8>, PasskeyCeremonyError> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
    URL_SAFE_NO_PAD
        .decode(input)
        .or_else(|_| URL_SAFE.decode(input))
        .or_else(|_| STANDARD_NO_PAD.decode(input))
        .or_else(|_| STANDARD.decode(input))
        .map_err(|e| PasskeyCeremonyError::InvalidAttestationResponse(format!("undecodable base64: {e}")))
}

fn canonical_base64_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Raw, wire-shaped attestation response as received from the client
/// before tolerant base64 normalization.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawAttestationResponse {
    pub credential_id: String,
    #[serde(default = "default_credential_type")]
    pub credential_type: String,
    pub client_data_json: String,
    pub attestation_object: String,
}

/// Raw, wire-shaped assertion response as received from the client before
/// tolerant base64 normalization.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawAssertionResponse {
    pub credential_id: String,
    #[serde(default = "default_credential_type")]
    pub credential_type: String,
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    pub user_handle: Option<String>,
}

fn default_credential_type() -> String {
    "public-key".to_string()
}

/// Outcome of `finish_registration`.
pub struct RegistrationOutcome {
    pub credential_id: String,
    pub display_name: String,
    pub created_at: String,
}

/// `PasskeyCeremonyEngine` ties the session store, the user directory, and
/// `webauthn-rs` together into the four ceremony operations.
pub struct PasskeyCeremonyEngine {
    webauthn: Webauthn,
    store: Arc<PasskeySessionStore>,
    directory: Arc<dyn UserDirectory>,
}

impl std::fmt::Debug for PasskeyCeremonyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasskeyCeremonyEngine").finish_non_exhaustive()
    }
}

impl PasskeyCeremonyEngine {
    pub fn new(
        rp_id: &str,
        rp_origin: &url::Url,
        store: Arc<PasskeySessionStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Result<Self, AuthError> {
        let webauthn = WebauthnBuilder::new(rp_id, rp_origin)
            .map_err(|e| AuthError::Internal(format!("invalid webauthn rp configuration: {e}")))?
            .rp_name(rp_id)
            .build()
            .map_err(|e| AuthError::Internal(format!("webauthn builder failed: {e}")))?;
        Ok(Self { webauthn, store, directory })
    }

    async fn load_credentials(&self, user_id: &str) -> Result<Vec<PasskeyCredential>, AuthError> {
        let creds = self
            .directory
            .get_user_credentials_by_type(user_id, CREDENTIAL_TYPE)
            .await?;
        creds
            .into_iter()
            .map(|c| {
                serde_json::from_value(c.value)
                    .map_err(|e| AuthError::Storage(format!("malformed passkey credential record: {e}")))
            })
            .collect()
    }

    async fn save_credentials(&self, user_id: &str, creds: &[PasskeyCredential]) -> Result<(), AuthError> {
        let wrapped = creds
            .iter()
            .map(|c| {
                serde_json::to_value(c)
                    .map(|value| Credential { credential_type: CREDENTIAL_TYPE.to_string(), value })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        let value = serde_json::to_value(wrapped).map_err(|e| AuthError::Storage(e.to_string()))?;
        self.directory
            .update_user_credentials(user_id, CREDENTIAL_TYPE, value)
            .await
    }

    /// Validate the user, build creation options excluding existing
    /// credentials, and store the ceremony session.
    pub async fn begin_registration(
        &self,
        user_id: &str,
        rp_id: &str,
    ) -> Result<(CreationChallengeResponse, String), AuthError> {
        if user_id.is_empty() || rp_id.is_empty() {
            return Err(AuthError::InvalidRequest("user_id and rp_id are required".to_string()));
        }
        self.directory.get_user(user_id).await?;

        let existing = self.load_credentials(user_id).await?;
        let exclude_credentials: Vec<_> = existing
            .iter()
            .filter_map(|c| tolerant_base64_decode(&c.credential_id).ok())
            .map(|bytes| bytes.into())
            .collect();

        let user_uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, user_id.as_bytes());
        let (ccr, reg_state) = self
            .webauthn
            .start_passkey_registration(
                user_uuid,
                user_id,
                user_id,
                if exclude_credentials.is_empty() {
                    None
                } else {
                    Some(exclude_credentials)
                },
            )
            .map_err(|e| PasskeyCeremonyError::InvalidAttestationResponse(e.to_string()))?;

        let session_key = generate_session_key();
        let payload = serde_json::to_value(&reg_state).map_err(|e| AuthError::Storage(e.to_string()))?;
        let now = Utc::now().timestamp();
        self.store
            .store(
                session_key.clone(),
                user_id.to_string(),
                rp_id.to_string(),
                payload,
                now + DEFAULT_SESSION_TTL_SECONDS,
            )
            .map_err(AuthError::from)?;

        Ok((ccr, session_key))
    }

    /// Consume the ceremony session, verify the attestation response, and
    /// append the new credential to the user's passkey list.
    pub async fn finish_registration(
        &self,
        session_token: &str,
        raw: &RawAttestationResponse,
        display_name: Option<String>,
    ) -> Result<RegistrationOutcome, AuthError> {
        let now = Utc::now().timestamp();
        let session = self
            .store
            .retrieve(session_token, now)
            .map_err(|_| PasskeyCeremonyError::SessionExpired)?;

        let reg_state: PasskeyRegistration = serde_json::from_value(session.session_payload)
            .map_err(|e| PasskeyCeremonyError::InvalidAttestationResponse(format!("corrupt ceremony state: {e}")))?;

        let credential_id_bytes = tolerant_base64_decode(&raw.credential_id)?;
        let client_data_bytes = tolerant_base64_decode(&raw.client_data_json)?;
        let attestation_bytes = tolerant_base64_decode(&raw.attestation_object)?;

        let reg_cred: RegisterPublicKeyCredential = build_register_credential(
            &credential_id_bytes,
            &raw.credential_type,
            &client_data_bytes,
            &attestation_bytes,
        )?;

        let passkey = self
            .webauthn
            .finish_passkey_registration(&reg_cred, &reg_state)
            .map_err(|e| PasskeyCeremonyError::InvalidAttestationResponse(e.to_string()))?;

        self.directory.get_user(&session.user_id).await.map_err(|_| PasskeyCeremonyError::UserNotFound)?;
        let mut credentials = self.load_credentials(&session.user_id).await?;

        let credential_id = canonical_base64_encode(&credential_id_bytes);
        if credentials.iter().any(|c| c.credential_id == credential_id) {
            return Err(PasskeyCeremonyError::InvalidAttestationResponse(
                "credential already registered for this user".to_string(),
            )
            .into());
        }

        let display_name = display_name.unwrap_or_else(default_display_name);
        let serialized_passkey =
            serde_json::to_vec(&passkey).map_err(|e| AuthError::Storage(e.to_string()))?;

        credentials.push(PasskeyCredential {
            credential_id: credential_id.clone(),
            public_key: serialized_passkey,
            attestation_type: raw.credential_type.clone(),
            aaguid: String::new(),
            sign_count: 0,
            display_name: display_name.clone(),
        });
        self.save_credentials(&session.user_id, &credentials).await?;
        self.store.delete(session_token).map_err(AuthError::from)?;

        Ok(RegistrationOutcome {
            credential_id,
            display_name,
            created_at: Utc::now().to_rfc3339(),
        })
    }

    /// Load the user's credentials, build request options with the
    /// allow-list, and store the ceremony session.
    pub async fn begin_authentication(
        &self,
        user_id: &str,
        rp_id: &str,
    ) -> Result<(RequestChallengeResponse, String), AuthError> {
        self.directory.get_user(user_id).await?;
        let credentials = self.load_credentials(user_id).await?;
        if credentials.is_empty() {
            return Err(PasskeyCeremonyError::NoCredentialsFound.into());
        }

        let passkeys: Vec<Passkey> = credentials
            .iter()
            .map(|c| {
                serde_json::from_slice(&c.public_key)
                    .map_err(|e| AuthError::Storage(format!("corrupt passkey record: {e}")))
            })
            .collect::<Result<_, _>>()?;

        let (rcr, auth_state) = self
            .webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(|e| PasskeyCeremonyError::InvalidAttestationResponse(e.to_string()))?;

        let session_key = generate_session_key();
        let payload = serde_json::to_value(&auth_state).map_err(|e| AuthError::Storage(e.to_string()))?;
        let now = Utc::now().timestamp();
        self.store
            .store(session_key.clone(), user_id.to_string(), rp_id.to_string(), payload, now + DEFAULT_SESSION_TTL_SECONDS)
            .map_err(AuthError::from)?;

        Ok((rcr, session_key))
    }

    /// Consume the ceremony session, verify the assertion against the
    /// matching stored credential, and enforce sign-counter monotonicity.
    pub async fn finish_authentication(
        &self,
        session_token: &str,
        raw: &RawAssertionResponse,
    ) -> Result<crate::directory::User, AuthError> {
        let now = Utc::now().timestamp();
        let session = self
            .store
            .retrieve(session_token, now)
            .map_err(|_| PasskeyCeremonyError::SessionExpired)?;

        let auth_state: PasskeyAuthentication = serde_json::from_value(session.session_payload)
            .map_err(|e| PasskeyCeremonyError::InvalidAttestationResponse(format!("corrupt ceremony state: {e}")))?;

        let mut credentials = self.load_credentials(&session.user_id).await?;

        let credential_id_bytes = tolerant_base64_decode(&raw.credential_id)?;
        let presented = canonical_base64_encode(&credential_id_bytes);
        let index = credentials.iter().position(|c| {
            c.credential_id.as_bytes().ct_eq(presented.as_bytes()).into()
        });
        let index = index.ok_or(PasskeyCeremonyError::CredentialNotFound)?;

        let client_data_bytes = tolerant_base64_decode(&raw.client_data_json)?;
        let authenticator_data_bytes = tolerant_base64_decode(&raw.authenticator_data)?;
        let signature_bytes = tolerant_base64_decode(&raw.signature)?;

        let pkc: PublicKeyCredential = build_public_key_credential(
            &credential_id_bytes,
            &raw.credential_type,
            &client_data_bytes,
            &authenticator_data_bytes,
            &signature_bytes,
            raw.user_handle.as_deref(),
        )?;

        let auth_result = self
            .webauthn
            .finish_passkey_authentication(&pkc, &auth_state)
            .map_err(|e| PasskeyCeremonyError::InvalidSignature(e.to_string()))?;

        let new_counter = auth_result.counter();
        let stored = &credentials[index];
        let monotonic = new_counter > stored.sign_count || (new_counter == 0 && stored.sign_count == 0);
        if !monotonic {
            return Err(PasskeyCeremonyError::InvalidSignature(
                "sign counter regression detected; credential may be cloned".to_string(),
            )
            .into());
        }
        credentials[index].sign_count = new_counter;

        self.save_credentials(&session.user_id, &credentials).await?;
        self.store.delete(session_token).map_err(AuthError::from)?;

        self.directory.get_user(&session.user_id).await.map_err(|_| PasskeyCeremonyError::UserNotFound.into())
    }
}

fn build_register_credential(
    _credential_id: &[u8],
    _credential_type: &str,
    client_data_bytes: &[u8],
    attestation_bytes: &[u8],
) -> Result<RegisterPublicKeyCredential, PasskeyCeremonyError> {
    let wire = serde_json::json!({
        "id": canonical_base64_encode(_credential_id),
        "rawId": canonical_base64_encode(_credential_id),
        "type": _credential_type,
        "response": {
            "clientDataJSON": canonical_base64_encode(client_data_bytes),
            "attestationObject": canonical_base64_encode(attestation_bytes),
        },
    });
    serde_json::from_value(wire)
        .map_err(|e| PasskeyCeremonyError::InvalidAttestationResponse(format!("malformed attestation response: {e}")))
}

fn build_public_key_credential(
    credential_id: &[u8],
    credential_type: &str,
    client_data_bytes: &[u8],
    authenticator_data_bytes: &[u8],
    signature_bytes: &[u8],
    user_handle: Option<&str>,
) -> Result<PublicKeyCredential, PasskeyCeremonyError> {
    let mut response: Value = serde_json::json!({
        "clientDataJSON": canonical_base64_encode(client_data_bytes),
        "authenticatorData": canonical_base64_encode(authenticator_data_bytes),
        "signature": canonical_base64_encode(signature_bytes),
    });
    if let Some(handle) = user_handle {
        response["userHandle"] = Value::String(handle.to_string());
    }
    let wire = serde_json::json!({
        "id": canonical_base64_encode(credential_id),
        "rawId": canonical_base64_encode(credential_id),
        "type": credential_type,
        "response": response,
    });
    serde_json::from_value(wire)
        .map_err(|e| PasskeyCeremonyError::InvalidAttestationResponse(format!("malformed assertion response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryUserDirectory;

    fn engine_with_user(user_id: &str) -> (PasskeyCeremonyEngine, Arc<InMemoryUserDirectory>) {
        let directory = Arc::new(InMemoryUserDirectory::new());
        directory.insert_user(crate::directory::User {
            id: user_id.to_string(),
            user_type: "standard".to_string(),
            organization_unit: String::new(),
        });
        let store = Arc::new(PasskeySessionStore::new());
        let rp_origin = url::Url::parse("https://localhost:8090").unwrap();
        let engine = PasskeyCeremonyEngine::new("localhost", &rp_origin, store, directory.clone()).unwrap();
        (engine, directory)
    }

    #[tokio::test]
    async fn save_then_load_credentials_round_trips() {
        let (engine, _directory) = engine_with_user("alice");
        let cred = PasskeyCredential {
            credential_id: "cred-1".to_string(),
            public_key: vec![1, 2, 3, 4],
            attestation_type: "none".to_string(),
            aaguid: "00000000-0000-0000-0000-000000000000".to_string(),
            sign_count: 0,
            display_name: "Passkey 2026-01-01".to_string(),
        };

        engine.save_credentials("alice", std::slice::from_ref(&cred)).await.unwrap();
        let loaded = engine.load_credentials("alice").await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], cred);
    }

    #[tokio::test]
    async fn begin_registration_excludes_existing_credentials_and_stores_session() {
        let (engine, _directory) = engine_with_user("bob");
        let existing = PasskeyCredential {
            credential_id: canonical_base64_encode(b"existing-credential-id"),
            public_key: vec![9, 9, 9],
            attestation_type: "none".to_string(),
            aaguid: "00000000-0000-0000-0000-000000000000".to_string(),
            sign_count: 0,
            display_name: "Passkey 2026-01-01".to_string(),
        };
        engine.save_credentials("bob", std::slice::from_ref(&existing)).await.unwrap();

        let (_ccr, session_token) = engine.begin_registration("bob", "localhost").await.unwrap();
        assert!(!session_token.is_empty());
    }

    #[tokio::test]
    async fn begin_registration_rejects_unknown_user() {
        let (engine, _directory) = engine_with_user("carol");
        let err = engine.begin_registration("dave", "localhost").await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[test]
    fn tolerant_decoder_accepts_all_four_variants() {
        let raw = b"hello passkey world!!";
        let url_no_pad = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw);
        let url_pad = base64::engine::general_purpose::URL_SAFE.encode(raw);
        let std_no_pad = base64::engine::general_purpose::STANDARD_NO_PAD.encode(raw);
        let std_pad = base64::engine::general_purpose::STANDARD.encode(raw);

        for encoded in [url_no_pad, url_pad, std_no_pad, std_pad] {
            assert_eq!(tolerant_base64_decode(&encoded).unwrap(), raw);
        }
    }

    #[test]
    fn undecodable_input_is_rejected() {
        assert!(tolerant_base64_decode("not base64 at all !!").is_err());
    }

    #[test]
    fn canonical_encoding_is_url_safe_no_pad() {
        let encoded = canonical_base64_encode(b"abc");
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.ends_with('='));
    }
}
