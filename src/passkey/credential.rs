//! Passkey credential record — the per-user, per-authenticator persisted
//! entry.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One registered WebAuthn authenticator for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasskeyCredential {
    pub credential_id: String,
    pub public_key: Vec<u8>,
    pub attestation_type: String,
    pub aaguid: String,
    pub sign_count: u32,
    pub display_name: String,
}

/// Derive `Passkey <YYYY-MM-DD>` in UTC when the caller omits a display
/// name at registration finish.
#[must_use]
pub fn default_display_name() -> String {
    format!("Passkey {}", Utc::now().format("%Y-%m-%d"))
}
