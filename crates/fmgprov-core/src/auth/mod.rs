//! Authentication against the controller.
//!
//! This module provides:
//! - `CredentialStore`: validated target address and login material
//! - `AuthSession`: the session state machine with coalesced (single-flight) login
//! - `Keychain`: optional OS keychain storage for controller passwords
//!
//! Secrets are wrapped in `Secret` so they never reach logs or serialized output.

pub mod credentials;
pub mod keychain;
pub mod session;

pub use credentials::{AuthMethod, CredentialStore, Secret};
pub use keychain::Keychain;
pub use session::{login, AuthSession, SessionPolicy, SessionStatus, SessionToken};
