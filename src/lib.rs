//! Authentication core of an identity platform.
//!
//! Authenticates end users through password credentials, SMS/email OTP,
//! federated OAuth/OIDC identity providers, and WebAuthn passkeys, and
//! issues a signed authentication assertion recording which factors were
//! used, in what order, and at what assurance level. Callers pass the
//! assertion back on the next step to build up multi-factor sessions.
//!
//! HTTP routing, wire DTOs, per-IdP OAuth/OIDC client bodies, the user
//! directory, and database drivers are external collaborators — see
//! [`directory`], [`idp`], [`otp`], and [`jwt`] for the trait boundaries.

pub mod assurance;
pub mod config;
pub mod directory;
pub mod error;
pub mod idp;
pub mod jwt;
pub mod orchestrator;
pub mod otp;
pub mod passkey;
pub mod registry;

pub use config::{AuthCore, AuthCoreConfig, Collaborators};
pub use error::AuthError;
pub use orchestrator::{AuthOrchestrator, AuthenticationResponse};
pub use registry::{AuthenticatorRegistry, IdpType};
