use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::api::ValidationError;

const REDACTED: &str = "********";

/// A sensitive string. Debug, Display and Serialize print a mask instead of the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the underlying value. Only the wire layer should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", REDACTED)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// `exec /sys/login/user`, then a session id in every envelope.
    Password,
    /// Pre-issued API key sent as a bearer token; no login round trip.
    Token,
}

/// Address of the controller plus the material needed to authenticate against it.
/// Immutable once built.
#[derive(Clone, Serialize)]
pub struct CredentialStore {
    target: String,
    #[serde(skip)]
    endpoint: Url,
    username: String,
    password: Option<Secret>,
    token: Option<Secret>,
}

impl CredentialStore {
    /// Validate and normalize user-supplied credentials.
    ///
    /// Empty strings count as absent. A bare host gets `https://`. Fails when the
    /// target is missing or unparsable, or when neither a password nor a token is
    /// given.
    pub fn new(
        target: &str,
        username: &str,
        password: &str,
        token: &str,
    ) -> Result<Self, ValidationError> {
        let target = normalize_target(target)?;
        let endpoint = Url::parse(&format!("{}/jsonrpc", target))
            .map_err(|e| ValidationError::InvalidTarget(format!("{}: {}", target, e)))?;

        let password = Some(Secret::new(password)).filter(|s| !s.is_empty());
        let token = Some(Secret::new(token.trim())).filter(|s| !s.is_empty());
        let username = username.trim().to_string();

        if password.is_none() && token.is_none() {
            return Err(ValidationError::MissingCredentials);
        }
        if token.is_none() && username.is_empty() {
            return Err(ValidationError::MissingUsername);
        }

        Ok(Self {
            target,
            endpoint,
            username,
            password,
            token,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Full URL of the JSON-RPC endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn auth_method(&self) -> AuthMethod {
        if self.token.is_some() {
            AuthMethod::Token
        } else {
            AuthMethod::Password
        }
    }

    pub(crate) fn password(&self) -> Option<&Secret> {
        self.password.as_ref()
    }

    pub(crate) fn token(&self) -> Option<&Secret> {
        self.token.as_ref()
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("target", &self.target)
            .field("username", &self.username)
            .field("password", &self.password)
            .field("token", &self.token)
            .finish()
    }
}

fn normalize_target(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ValidationError::MissingTarget);
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| ValidationError::InvalidTarget(format!("{}: {}", raw, e)))?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ValidationError::InvalidTarget(format!(
            "{}: unsupported scheme {}",
            raw,
            url.scheme()
        )));
    }
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(ValidationError::InvalidTarget(format!("{}: missing host", raw)));
    }
    Ok(with_scheme)
}
