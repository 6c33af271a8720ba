//! Session, authentication and transport substrate for FortiManager resource operations.
//!
//! The host builds one [`Config`] per provider instance (through
//! [`provider::provider`] and [`ProviderDescriptor::configure`]) and passes it by
//! reference into every resource operation. Operations call [`Config::call`];
//! login, session reuse and recovery from an expired session happen underneath.
//!
//! - [`auth`]: credentials, the session state machine, keychain storage
//! - [`api`]: JSON-RPC envelope, pooled transport, error taxonomy
//! - [`settings`]: file/environment/explicit configuration layering
//! - [`provider`]: capability descriptor and resource handlers

pub mod api;
pub mod auth;
pub mod config;
pub mod provider;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{
    document_data, AuthError, Document, Error, Method, NetworkError, RequestError, Transport,
    TransportOptions, ValidationError,
};
pub use auth::{AuthSession, CredentialStore, Keychain, Secret, SessionPolicy, SessionStatus};
pub use config::{Config, SharedConfig};
pub use provider::{provider, ObjectResource, ProviderDescriptor, ResourceHandler};
pub use settings::ProviderSettings;
