//! Passkey ceremony session store — component D.
//!
//! TTL-scoped key-value store for WebAuthn ceremony state, backed by
//! `dashmap` for lock-free per-key access. The store spawns its own
//! session-sweep task inline via `tokio::spawn` + `tokio::time::interval`
//! + `retain`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::RngCore;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::PasskeySessionError;

/// Default ceremony session lifetime.
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 120;
/// Default background eviction cadence; must stay greater
/// than the session TTL so at most one TTL window of stale entries exists.
pub const DEFAULT_CLEANUP_INTERVAL_SECONDS: u64 = 300;

/// Per-ceremony server state bridging `begin_*` and `finish_*`.
#[derive(Debug, Clone)]
pub struct CeremonySession {
    pub user_id: String,
    pub relying_party_id: String,
    pub session_payload: Value,
    pub expires_at: i64,
}

/// Generate a fresh session key: ≥32 cryptographically random bytes,
/// `base64url`-without-padding encoded.
#[must_use]
pub fn generate_session_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

use base64::Engine as _;

/// TTL-scoped ceremony session store.
#[derive(Debug)]
pub struct PasskeySessionStore {
    sessions: DashMap<String, CeremonySession>,
    evictor: std::sync::Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

impl Default for PasskeySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PasskeySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            evictor: std::sync::Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `store` a new ceremony session. A pre-existing key is treated as a
    /// storage error (collision probability is negligible by design).
    pub fn store(
        &self,
        session_key: String,
        user_id: String,
        relying_party_id: String,
        session_payload: Value,
        expires_at: i64,
    ) -> Result<(), PasskeySessionError> {
        if self.sessions.contains_key(&session_key) {
            return Err(PasskeySessionError::Storage(format!(
                "session key '{session_key}' already present"
            )));
        }
        self.sessions.insert(
            session_key,
            CeremonySession {
                user_id,
                relying_party_id,
                session_payload,
                expires_at,
            },
        );
        Ok(())
    }

    /// Read exactly once. Expired sessions are treated as `NotFound` by
    /// callers and removed eagerly.
    pub fn retrieve(&self, session_key: &str, now: i64) -> Result<CeremonySession, PasskeySessionError> {
        let session = self
            .sessions
            .get(session_key)
            .map(|entry| entry.value().clone())
            .ok_or(PasskeySessionError::NotFound)?;
        if session.expires_at < now {
            self.sessions.remove(session_key);
            return Err(PasskeySessionError::NotFound);
        }
        Ok(session)
    }

    /// Idempotent: a missing key is not an error.
    pub fn delete(&self, session_key: &str) -> Result<(), PasskeySessionError> {
        self.sessions.remove(session_key);
        Ok(())
    }

    /// Sweep every entry whose `expires_at < now`.
    pub fn delete_expired(&self, now: i64) -> Result<usize, PasskeySessionError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at >= now);
        Ok(before - self.sessions.len())
    }

    /// Spawn the single long-lived eviction task, ticking every
    /// `cleanup_interval`. Survives transient failures by logging and
    /// retrying on the next tick; performs one final sweep after shutdown
    /// is signalled via [`PasskeySessionStore::shutdown`].
    pub fn spawn_evictor(self: &Arc<Self>, cleanup_interval: Duration) {
        let store = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                let now = chrono::Utc::now().timestamp();
                match store.delete_expired(now) {
                    Ok(count) if count > 0 => {
                        tracing::debug!(count, "evicted expired passkey ceremony sessions");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(%err, "passkey ceremony session eviction failed, retrying next tick");
                    }
                }
                if shutdown.load(Ordering::Acquire) {
                    let _ = store.delete_expired(chrono::Utc::now().timestamp());
                    break;
                }
            }
        });
        *self.evictor.lock().unwrap() = Some(handle);
    }

    /// Signal the evictor to perform one final sweep and stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

impl Drop for PasskeySessionStore {
    fn drop(&mut self) {
        if let Some(handle) = self.evictor.lock().unwrap().take() {
            handle.abort();
        }
    }
}
