//! User directory and credentials-authentication collaborators.
//!
//! Both traits are external to the authentication core; this
//! module only defines the interfaces the orchestrator depends on, plus
//! in-memory test doubles for exercising them without a real backing store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// A resolved end user, as carried through the assertion and response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(rename = "userType")]
    pub user_type: String,
    #[serde(rename = "organizationUnit")]
    pub organization_unit: String,
}

/// One stored credential entry, opaque outside its `credential_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub credential_type: String,
    pub value: serde_json::Value,
}

/// External user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync + std::fmt::Debug {
    async fn get_user(&self, id: &str) -> Result<User, AuthError>;
    async fn get_user_credentials_by_type(
        &self,
        id: &str,
        credential_type: &str,
    ) -> Result<Vec<Credential>, AuthError>;
    async fn update_user_credentials(
        &self,
        id: &str,
        credential_type: &str,
        credentials_json: serde_json::Value,
    ) -> Result<(), AuthError>;
}

/// External password/credentials authentication service.
#[async_trait]
pub trait CredentialsAuthService: Send + Sync + std::fmt::Debug {
    async fn authenticate(&self, attributes: &HashMap<String, String>) -> Result<User, AuthError>;
}

/// In-memory `UserDirectory` test double.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
    credentials: RwLock<HashMap<(String, String), Vec<Credential>>>,
}

impl InMemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        self.users.write().unwrap().insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, id: &str) -> Result<User, AuthError> {
        self.users
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn get_user_credentials_by_type(
        &self,
        id: &str,
        credential_type: &str,
    ) -> Result<Vec<Credential>, AuthError> {
        Ok(self
            .credentials
            .read()
            .unwrap()
            .get(&(id.to_string(), credential_type.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn update_user_credentials(
        &self,
        id: &str,
        credential_type: &str,
        credentials_json: serde_json::Value,
    ) -> Result<(), AuthError> {
        let entries: Vec<Credential> = serde_json::from_value(credentials_json)
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        self.credentials
            .write()
            .unwrap()
            .insert((id.to_string(), credential_type.to_string()), entries);
        Ok(())
    }
}

/// In-memory `CredentialsAuthService` test double: `username`/`password`
/// attribute pairs checked against a seeded map.
#[derive(Debug, Default)]
pub struct InMemoryCredentialsAuthService {
    passwords: RwLock<HashMap<String, String>>,
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryCredentialsAuthService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, username: impl Into<String>, password: impl Into<String>, user: User) {
        let username = username.into();
        self.passwords.write().unwrap().insert(username.clone(), password.into());
        self.users.write().unwrap().insert(username, user);
    }
}

#[async_trait]
impl CredentialsAuthService for InMemoryCredentialsAuthService {
    async fn authenticate(&self, attributes: &HashMap<String, String>) -> Result<User, AuthError> {
        let username = attributes.get("username").ok_or_else(|| {
            AuthError::InvalidRequest("missing username".to_string())
        })?;
        let password = attributes
            .get("password")
            .ok_or_else(|| AuthError::InvalidRequest("missing password".to_string()))?;
        let expected = self.passwords.read().unwrap().get(username).cloned();
        match expected {
            Some(pw) if &pw == password => self
                .users
                .read()
                .unwrap()
                .get(username)
                .cloned()
                .ok_or(AuthError::UserNotFound),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}
