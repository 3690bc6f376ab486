//! OTP binding — component C.
//!
//! Thin adapter over the external OTP service. Rate-limiting, code
//! generation, and resend policy live entirely in that collaborator; this
//! module only shapes the contract and normalizes its errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::directory::User;
use crate::error::OtpError;

/// Delivery channel for a one-time password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpChannel {
    Sms,
    Email,
}

impl OtpChannel {
    /// Authenticator name the orchestrator attributes a successful verify
    /// to.
    #[must_use]
    pub fn authenticator_name(self) -> &'static str {
        match self {
            Self::Sms => "SMSOTP",
            Self::Email => "EmailOTP",
        }
    }
}

/// External OTP collaborator: send and verify one-time passwords.
#[async_trait]
pub trait OtpService: Send + Sync + std::fmt::Debug {
    /// Issue an OTP to `recipient` over `channel`. Returns an opaque
    /// session token, redeemable exactly once via [`OtpService::verify_otp`].
    async fn send_otp(
        &self,
        sender_id: &str,
        channel: OtpChannel,
        recipient: &str,
    ) -> Result<String, OtpError>;

    /// Redeem `session_token` with the user-supplied `code`.
    async fn verify_otp(&self, session_token: &str, code: &str) -> Result<(User, OtpChannel), OtpError>;
}

/// In-memory test double. Not a production implementation — the real OTP
/// service (rate limiting, code generation, SMS/email transport) is an
/// external collaborator out of scope for this crate.
#[derive(Debug, Default)]
pub struct InMemoryOtpService {
    sessions: dashmap::DashMap<String, StoredOtp>,
}

#[derive(Debug, Clone)]
struct StoredOtp {
    code: String,
    user: User,
    channel: OtpChannel,
    consumed: bool,
}

impl InMemoryOtpService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: seed a pending OTP session directly, bypassing transport.
    pub fn seed(&self, session_token: impl Into<String>, code: impl Into<String>, user: User, channel: OtpChannel) {
        self.sessions.insert(
            session_token.into(),
            StoredOtp {
                code: code.into(),
                user,
                channel,
                consumed: false,
            },
        );
    }
}

#[async_trait]
impl OtpService for InMemoryOtpService {
    async fn send_otp(
        &self,
        _sender_id: &str,
        channel: OtpChannel,
        recipient: &str,
    ) -> Result<String, OtpError> {
        let token = format!("otp-session-{}-{recipient}", channel.authenticator_name());
        Ok(token)
    }

    async fn verify_otp(&self, session_token: &str, code: &str) -> Result<(User, OtpChannel), OtpError> {
        let mut entry = self
            .sessions
            .get_mut(session_token)
            .ok_or(OtpError::UnknownOtpSession)?;
        if entry.consumed {
            return Err(OtpError::UnknownOtpSession);
        }
        if entry.code != code {
            return Err(OtpError::IncorrectOtp);
        }
        entry.consumed = true;
        Ok((entry.user.clone(), entry.channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::User;

    fn user() -> User {
        User {
            id: "u1".to_string(),
            user_type: "standard".to_string(),
            organization_unit: String::new(),
        }
    }

    #[tokio::test]
    async fn verify_otp_succeeds_with_correct_code() {
        let svc = InMemoryOtpService::new();
        svc.seed("S1", "123456", user(), OtpChannel::Sms);
        let (u, channel) = svc.verify_otp("S1", "123456").await.unwrap();
        assert_eq!(u.id, "u1");
        assert_eq!(channel, OtpChannel::Sms);
    }

    #[tokio::test]
    async fn verify_otp_rejects_wrong_code() {
        let svc = InMemoryOtpService::new();
        svc.seed("S1", "123456", user(), OtpChannel::Sms);
        let err = svc.verify_otp("S1", "000000").await.unwrap_err();
        assert!(matches!(err, OtpError::IncorrectOtp));
    }

    #[tokio::test]
    async fn verify_otp_is_single_use() {
        let svc = InMemoryOtpService::new();
        svc.seed("S1", "123456", user(), OtpChannel::Sms);
        svc.verify_otp("S1", "123456").await.unwrap();
        let err = svc.verify_otp("S1", "123456").await.unwrap_err();
        assert!(matches!(err, OtpError::UnknownOtpSession));
    }

    #[tokio::test]
    async fn unknown_session_is_an_error() {
        let svc = InMemoryOtpService::new();
        let err = svc.verify_otp("nope", "123456").await.unwrap_err();
        assert!(matches!(err, OtpError::UnknownOtpSession));
    }
}
