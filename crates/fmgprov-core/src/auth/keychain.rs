use anyhow::{Context, Result};
use keyring::Entry;

use super::Secret;

const SERVICE_NAME: &str = "fmgprov";

/// Controller passwords kept in the OS keychain, one entry per `username@target`.
pub struct Keychain;

impl Keychain {
    fn entry(target: &str, username: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &account_name(target, username))
            .context("Failed to create keyring entry")
    }

    /// Store a password in the OS keychain
    pub fn store(target: &str, username: &str, password: &Secret) -> Result<()> {
        Self::entry(target, username)?
            .set_password(password.expose())
            .context("Failed to store password in keychain")
    }

    /// Retrieve the password for a controller account from the OS keychain
    pub fn get_password(target: &str, username: &str) -> Result<Secret> {
        Self::entry(target, username)?
            .get_password()
            .map(Secret::new)
            .context("Failed to retrieve password from keychain")
    }

    /// Delete stored credentials for a controller account
    pub fn delete(target: &str, username: &str) -> Result<()> {
        Self::entry(target, username)?
            .delete_credential()
            .context("Failed to delete credential from keychain")
    }
}

fn account_name(target: &str, username: &str) -> String {
    let host = target
        .split("://")
        .last()
        .unwrap_or(target)
        .trim_end_matches('/');
    format!("{}@{}", username, host)
}
