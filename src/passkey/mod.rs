//! Passkey (WebAuthn) ceremony core — components D and E.

pub mod ceremony;
pub mod credential;
pub mod store;

pub use ceremony::{PasskeyCeremonyEngine, RawAssertionResponse, RawAttestationResponse, RegistrationOutcome};
pub use credential::PasskeyCredential;
pub use store::{CeremonySession, PasskeySessionStore};
