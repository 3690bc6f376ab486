//! Error taxonomy for the authentication core.
//!
//! Every public operation returns [`AuthError`]. Each variant is tagged
//! [`ErrorSeverity::Client`] or [`ErrorSeverity::Server`] and carries a stable
//! string code so the HTTP layer (out of scope here) can translate it per the
//! mapping table this type encodes.

use std::fmt;

use thiserror::Error;

/// Whether an error should surface verbatim to the caller or be logged and
/// replaced with a generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Caller-facing: code and description may be returned as-is.
    Client,
    /// Internal: log in full, return a generic description externally.
    Server,
}

/// Top-level error type returned by every orchestrator and component
/// operation.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user not found")]
    UserNotFound,

    #[error(transparent)]
    Assurance(#[from] AssuranceError),

    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error(transparent)]
    PasskeySession(#[from] PasskeySessionError),

    #[error(transparent)]
    PasskeyCeremony(#[from] PasskeyCeremonyError),

    #[error(transparent)]
    IdpSession(#[from] IdpSessionError),

    #[error("assertion subject mismatch")]
    AssertionSubjectMismatch,

    #[error("invalid assertion: {0}")]
    InvalidAssertion(String),

    #[error("invalid idp type for requested authentication")]
    InvalidIdpType,

    #[error("invalid idp id")]
    InvalidIdpId,

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("jwt signing failed: {0}")]
    JwtSign(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable string code for this error, part of the external contract.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::UserNotFound => "UserNotFound",
            Self::Assurance(e) => e.code(),
            Self::Otp(e) => e.code(),
            Self::PasskeySession(e) => e.code(),
            Self::PasskeyCeremony(e) => e.code(),
            Self::IdpSession(e) => e.code(),
            Self::AssertionSubjectMismatch => "AssertionSubjectMismatch",
            Self::InvalidAssertion(_) => "InvalidAssertion",
            Self::InvalidIdpType => "InvalidIDPType",
            Self::InvalidIdpId => "InvalidIDPID",
            Self::Storage(_) => "Storage",
            Self::JwtSign(_) => "JwtSignFailure",
            Self::Internal(_) => "Internal",
        }
    }

    /// Client (4xx, surfaced verbatim) vs. server (5xx, sanitized internally).
    #[must_use]
    pub fn severity(&self) -> ErrorSeverity {
        use ErrorSeverity::{Client, Server};
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidCredentials
            | Self::UserNotFound
            | Self::AssertionSubjectMismatch
            | Self::InvalidAssertion(_)
            | Self::InvalidIdpType
            | Self::InvalidIdpId => Client,
            Self::Assurance(e) => e.severity(),
            Self::Otp(e) => e.severity(),
            Self::PasskeySession(e) => e.severity(),
            Self::PasskeyCeremony(e) => e.severity(),
            Self::IdpSession(e) => e.severity(),
            Self::Storage(_) | Self::JwtSign(_) | Self::Internal(_) => Server,
        }
    }

    /// The HTTP status a handler layer would map this error to.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) | Self::InvalidAssertion(_) | Self::InvalidIdpType | Self::InvalidIdpId => 400,
            Self::InvalidCredentials => 401,
            Self::UserNotFound => 404,
            Self::AssertionSubjectMismatch => 400,
            Self::Assurance(e) => e.http_status(),
            Self::Otp(e) => e.http_status(),
            Self::PasskeySession(e) => e.http_status(),
            Self::PasskeyCeremony(e) => e.http_status(),
            Self::IdpSession(e) => e.http_status(),
            Self::Storage(_) | Self::JwtSign(_) | Self::Internal(_) => 500,
        }
    }

    /// Description safe to return externally; server errors are replaced
    /// with a generic message, client errors pass through.
    #[must_use]
    pub fn external_description(&self) -> String {
        match self.severity() {
            ErrorSeverity::Client => self.to_string(),
            ErrorSeverity::Server => "an internal error occurred".to_string(),
        }
    }
}

/// Errors from the assertion generator (component B).
#[derive(Debug, Error)]
pub enum AssuranceError {
    #[error("no authenticators supplied")]
    NoAuthenticators,
    #[error("unknown authenticator: {0}")]
    UnknownAuthenticator(String),
    #[error("nil assurance context")]
    NilAssuranceContext,
    #[error("no assurance requirements supplied")]
    NoAssuranceRequirements,
    #[error("assurance context does not meet the required level")]
    InsufficientAssurance,
}

impl AssuranceError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoAuthenticators => "NoAuthenticators",
            Self::UnknownAuthenticator(_) => "UnknownAuthenticator",
            Self::NilAssuranceContext => "NilAssuranceContext",
            Self::NoAssuranceRequirements => "NoAssuranceRequirements",
            Self::InsufficientAssurance => "InsufficientAssurance",
        }
    }
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Client
    }
    fn http_status(&self) -> u16 {
        400
    }
}

/// Errors from the OTP binding (component C).
#[derive(Debug, Error)]
pub enum OtpError {
    #[error("incorrect otp")]
    IncorrectOtp,
    #[error("expired otp")]
    ExpiredOtp,
    #[error("unknown otp session")]
    UnknownOtpSession,
    #[error("otp transport failure: {0}")]
    OtpTransport(String),
}

impl OtpError {
    fn code(&self) -> &'static str {
        match self {
            Self::IncorrectOtp => "IncorrectOTP",
            Self::ExpiredOtp => "ExpiredOTP",
            Self::UnknownOtpSession => "UnknownOTPSession",
            Self::OtpTransport(_) => "OTPTransport",
        }
    }
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::OtpTransport(_) => ErrorSeverity::Server,
            _ => ErrorSeverity::Client,
        }
    }
    fn http_status(&self) -> u16 {
        match self {
            Self::IncorrectOtp => 401,
            Self::ExpiredOtp | Self::UnknownOtpSession => 400,
            Self::OtpTransport(_) => 500,
        }
    }
}

/// Errors from the passkey ceremony session store (component D).
#[derive(Debug, Error)]
pub enum PasskeySessionError {
    #[error("ceremony session not found")]
    NotFound,
    #[error("ceremony session storage failure: {0}")]
    Storage(String),
}

impl PasskeySessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "SessionExpired",
            Self::Storage(_) => "Storage",
        }
    }
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound => ErrorSeverity::Client,
            Self::Storage(_) => ErrorSeverity::Server,
        }
    }
    fn http_status(&self) -> u16 {
        match self {
            Self::NotFound => 400,
            Self::Storage(_) => 500,
        }
    }
}

/// Errors from the passkey ceremony engine (component E).
#[derive(Debug, Error)]
pub enum PasskeyCeremonyError {
    #[error("invalid attestation response: {0}")]
    InvalidAttestationResponse(String),
    #[error("ceremony session expired")]
    SessionExpired,
    #[error("user not found")]
    UserNotFound,
    #[error("no passkey credentials registered")]
    NoCredentialsFound,
    #[error("credential not found")]
    CredentialNotFound,
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl PasskeyCeremonyError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidAttestationResponse(_) => "InvalidAttestationResponse",
            Self::SessionExpired => "SessionExpired",
            Self::UserNotFound => "UserNotFound",
            Self::NoCredentialsFound => "NoCredentialsFound",
            Self::CredentialNotFound => "CredentialNotFound",
            Self::InvalidSignature(_) => "InvalidSignature",
            Self::Storage(_) => "Storage",
        }
    }
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Storage(_) => ErrorSeverity::Server,
            _ => ErrorSeverity::Client,
        }
    }
    fn http_status(&self) -> u16 {
        match self {
            Self::InvalidAttestationResponse(_) => 400,
            Self::SessionExpired => 400,
            Self::UserNotFound => 404,
            Self::NoCredentialsFound => 400,
            Self::CredentialNotFound => 400,
            Self::InvalidSignature(_) => 401,
            Self::Storage(_) => 500,
        }
    }
}

/// Errors validating the IdP session token (component F).
#[derive(Debug, Error)]
pub enum IdpSessionError {
    #[error("invalid session token: {0}")]
    InvalidSessionToken(String),
}

impl IdpSessionError {
    fn code(&self) -> &'static str {
        "InvalidSessionToken"
    }
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Client
    }
    fn http_status(&self) -> u16 {
        400
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_pass_through_description() {
        let err = AuthError::InvalidCredentials;
        assert_eq!(err.severity(), ErrorSeverity::Client);
        assert_eq!(err.external_description(), err.to_string());
        assert_eq!(err.http_status(), 401);
    }

    #[test]
    fn server_errors_are_sanitized_externally() {
        let err = AuthError::Storage("postgres://user:pw@host/db unreachable".into());
        assert_eq!(err.severity(), ErrorSeverity::Server);
        assert_eq!(err.external_description(), "an internal error occurred");
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn component_errors_roundtrip_codes() {
        let err: AuthError = OtpError::IncorrectOtp.into();
        assert_eq!(err.code(), "IncorrectOTP");
        assert_eq!(err.http_status(), 401);
    }
}
