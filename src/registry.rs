//! Authenticator registry — component A.
//!
//! A process-wide, write-once mapping of authenticator name to metadata.
//! Registration happens during startup composition (see [`crate::AuthCore`]);
//! after that the map is read-only, so reads never take a lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AssuranceError;

/// One of the three NIST SP 800-63B factor categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorCategory {
    Knowledge,
    Possession,
    Inherence,
}

/// Identity assurance level an authenticator contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ial {
    #[serde(rename = "IAL1")]
    Ial1,
    #[serde(rename = "IAL2")]
    Ial2,
    #[serde(rename = "IAL3")]
    Ial3,
}

impl Default for Ial {
    fn default() -> Self {
        Self::Ial1
    }
}

/// Federated identity provider type. Used both as an authenticator's
/// associated IdP type and as the requested/actual type in the federated
/// flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdpType {
    OAuth,
    OIDC,
    Google,
    GitHub,
}

impl IdpType {
    /// The cross-allowed set: OAuth and OIDC are
    /// protocol-compatible substitutes for one another.
    #[must_use]
    pub fn cross_allowed(requested: Self, actual: Self) -> bool {
        if requested == actual {
            return true;
        }
        matches!(
            (requested, actual),
            (Self::OAuth, Self::OIDC) | (Self::OIDC, Self::OAuth)
        )
    }
}

/// Immutable metadata for one registered authenticator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatorMetadata {
    pub name: String,
    pub factor_categories: HashSet<FactorCategory>,
    pub associated_idp_type: Option<IdpType>,
    #[serde(default)]
    pub ial: Ial,
}

impl AuthenticatorMetadata {
    #[must_use]
    pub fn new(name: impl Into<String>, factor_categories: impl IntoIterator<Item = FactorCategory>) -> Self {
        Self {
            name: name.into(),
            factor_categories: factor_categories.into_iter().collect(),
            associated_idp_type: None,
            ial: Ial::default(),
        }
    }

    #[must_use]
    pub fn with_idp_type(mut self, idp_type: IdpType) -> Self {
        self.associated_idp_type = Some(idp_type);
        self
    }

    #[must_use]
    pub fn with_ial(mut self, ial: Ial) -> Self {
        self.ial = ial;
        self
    }
}

/// Error raised when the same authenticator name is registered twice.
#[derive(Debug, thiserror::Error)]
#[error("authenticator '{0}' is already registered")]
pub struct DuplicateAuthenticator(pub String);

/// Builder used once at startup; see [`AuthenticatorRegistry::builder`].
#[derive(Debug, Default)]
pub struct AuthenticatorRegistryBuilder {
    entries: HashMap<String, AuthenticatorMetadata>,
}

impl AuthenticatorRegistryBuilder {
    /// Register one authenticator. Returns an error — not a silent
    /// overwrite — if the name is already present.
    pub fn register(&mut self, meta: AuthenticatorMetadata) -> Result<&mut Self, DuplicateAuthenticator> {
        if self.entries.contains_key(&meta.name) {
            return Err(DuplicateAuthenticator(meta.name));
        }
        self.entries.insert(meta.name.clone(), meta);
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> AuthenticatorRegistry {
        AuthenticatorRegistry {
            entries: Arc::new(self.entries),
        }
    }
}

/// Read-only, process-wide authenticator registry.
#[derive(Debug, Clone)]
pub struct AuthenticatorRegistry {
    entries: Arc<HashMap<String, AuthenticatorMetadata>>,
}

impl AuthenticatorRegistry {
    #[must_use]
    pub fn builder() -> AuthenticatorRegistryBuilder {
        AuthenticatorRegistryBuilder::default()
    }

    /// Look up metadata by authenticator name.
    pub fn get(&self, name: &str) -> Result<&AuthenticatorMetadata, AssuranceError> {
        self.entries
            .get(name)
            .ok_or_else(|| AssuranceError::UnknownAuthenticator(name.to_string()))
    }

    /// Unique inverse lookup: the authenticator name associated with an IdP
    /// type. Errors if zero or more than one authenticator claims the type.
    pub fn name_for_idp_type(&self, idp_type: IdpType) -> Result<&str, AssuranceError> {
        let mut matches = self
            .entries
            .values()
            .filter(|m| m.associated_idp_type == Some(idp_type));
        let first = matches
            .next()
            .ok_or_else(|| AssuranceError::UnknownAuthenticator(format!("{idp_type:?}")))?;
        if matches.next().is_some() {
            return Err(AssuranceError::UnknownAuthenticator(format!(
                "ambiguous authenticator for idp type {idp_type:?}"
            )));
        }
        Ok(&first.name)
    }
}
