//! Provider settings.
//!
//! Settings come from three layers, later ones winning: a JSON file at
//! `~/.config/fmgprov/config.json`, `FORTIMANAGER_*` environment variables, and
//! values supplied explicitly by the host. Passwords and tokens are never written
//! back to the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::transport::{DEFAULT_MAX_CONNECTIONS, DEFAULT_TIMEOUT_SECS};
use crate::api::{TransportOptions, ValidationError};
use crate::auth::{CredentialStore, Secret, SessionPolicy};
use crate::config::{validate_adom, DEFAULT_ADOM};

/// Application name used for the config directory path
const APP_NAME: &str = "fmgprov";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_HOSTNAME: &str = "FORTIMANAGER_ACCESS_HOSTNAME";
pub const ENV_USERNAME: &str = "FORTIMANAGER_ACCESS_USERNAME";
pub const ENV_PASSWORD: &str = "FORTIMANAGER_ACCESS_PASSWORD";
pub const ENV_TOKEN: &str = "FORTIMANAGER_ACCESS_TOKEN";
pub const ENV_INSECURE: &str = "FORTIMANAGER_INSECURE";
pub const ENV_CA_BUNDLE: &str = "FORTIMANAGER_CA_CABUNDLE";
pub const ENV_TIMEOUT: &str = "FORTIMANAGER_TIMEOUT";
pub const ENV_ADOM: &str = "FORTIMANAGER_ADOM";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub target: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<Secret>,
    #[serde(skip_serializing)]
    pub token: Option<Secret>,
    pub timeout_secs: Option<u64>,
    pub insecure: Option<bool>,
    pub ca_bundle: Option<PathBuf>,
    pub adom: Option<String>,
    pub max_connections: Option<usize>,
    pub session_max_age_secs: Option<u64>,
}

/// Validated pieces needed to build a [`crate::Config`].
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub credentials: CredentialStore,
    pub transport: TransportOptions,
    pub policy: SessionPolicy,
    pub adom: String,
}

impl ProviderSettings {
    /// Load settings from a JSON file. A missing file yields empty settings.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }

    /// Load from the default location, if the platform has a config directory.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Save non-secret settings
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write settings file {}", path.display()))?;
        Ok(())
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Read settings from `FORTIMANAGER_*` variables.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let insecure = match get(ENV_INSECURE) {
            Some(raw) => Some(parse_bool(ENV_INSECURE, &raw)?),
            None => None,
        };
        let timeout_secs = match get(ENV_TIMEOUT) {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                ValidationError::InvalidSetting {
                    name: ENV_TIMEOUT,
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            target: get(ENV_HOSTNAME),
            username: get(ENV_USERNAME),
            password: get(ENV_PASSWORD).map(Secret::new),
            token: get(ENV_TOKEN).map(Secret::new),
            timeout_secs,
            insecure,
            ca_bundle: get(ENV_CA_BUNDLE).map(PathBuf::from),
            adom: get(ENV_ADOM),
            max_connections: None,
            session_max_age_secs: None,
        })
    }

    /// Overlay `other` on top of `self`; values present in `other` win.
    pub fn merge(self, other: ProviderSettings) -> Self {
        Self {
            target: other.target.or(self.target),
            username: other.username.or(self.username),
            password: other.password.or(self.password),
            token: other.token.or(self.token),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
            insecure: other.insecure.or(self.insecure),
            ca_bundle: other.ca_bundle.or(self.ca_bundle),
            adom: other.adom.or(self.adom),
            max_connections: other.max_connections.or(self.max_connections),
            session_max_age_secs: other.session_max_age_secs.or(self.session_max_age_secs),
        }
    }

    /// Apply defaults and validate.
    pub fn resolve(&self) -> Result<ResolvedSettings, ValidationError> {
        let credentials = CredentialStore::new(
            self.target.as_deref().unwrap_or_default(),
            self.username.as_deref().unwrap_or_default(),
            self.password.as_ref().map(Secret::expose).unwrap_or_default(),
            self.token.as_ref().map(Secret::expose).unwrap_or_default(),
        )?;

        let timeout_secs = self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ValidationError::InvalidSetting {
                name: "timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        let transport = TransportOptions {
            timeout: Duration::from_secs(timeout_secs),
            insecure: self.insecure.unwrap_or(false),
            ca_bundle: self.ca_bundle.clone(),
            max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
        };

        let policy = SessionPolicy {
            max_age: self.session_max_age_secs.map(Duration::from_secs),
            ..SessionPolicy::default()
        };

        Ok(ResolvedSettings {
            credentials,
            transport,
            policy,
            adom: validate_adom(self.adom.as_deref().unwrap_or(DEFAULT_ADOM))?.to_string(),
        })
    }
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ValidationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ValidationError::InvalidSetting {
            name,
            reason: format!("expected a boolean, got {:?}", other),
        }),
    }
}
