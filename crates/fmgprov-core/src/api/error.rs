use std::error::Error as StdError;

use thiserror::Error;

/// Malformed or incomplete provider configuration. Fatal at startup, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("target address is required")]
    MissingTarget,

    #[error("target address is not a valid URL: {0}")]
    InvalidTarget(String),

    #[error("either a password or an API token is required")]
    MissingCredentials,

    #[error("a username is required for password authentication")]
    MissingUsername,

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("failed to build HTTP transport: {0}")]
    Transport(String),
}

/// Transport-level failure. Surfaced immediately, never retried by the core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("TLS verification failed: {0}")]
    Tls(String),

    #[error("network error: {0}")]
    Other(String),
}

impl NetworkError {
    /// Classify a reqwest failure by walking its source chain.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let detail = describe_chain(err);
        if err.is_timeout() {
            return NetworkError::Timeout(detail);
        }
        classify(detail, err.source())
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        NetworkError::from_reqwest(&err)
    }
}

/// Sort a failure by its causes. reqwest's own message carries the request URL,
/// so only the causes below it are inspected for text.
fn classify(detail: String, first_cause: Option<&(dyn StdError + 'static)>) -> NetworkError {
    let mut tls = false;
    let mut source = first_cause;
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    return NetworkError::ConnectionRefused(detail)
                }
                std::io::ErrorKind::TimedOut => return NetworkError::Timeout(detail),
                _ => {}
            }
        }

        let text = cause.to_string().to_ascii_lowercase();
        if text.starts_with("dns error") {
            return NetworkError::Other(detail);
        }
        if text.contains("connection refused") {
            return NetworkError::ConnectionRefused(detail);
        }
        tls |= text.contains("certificate") || text.contains("tls") || text.contains("ssl");
        source = cause.source();
    }

    if tls {
        NetworkError::Tls(detail)
    } else {
        NetworkError::Other(detail)
    }
}

fn describe_chain(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Login rejected by the controller, or the controller was unreachable while logging in.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("login rejected by controller (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("controller unreachable during login: {0}")]
    Unreachable(#[from] NetworkError),

    /// Login answered with an HTTP error other than 401 (controller busy or misrouted).
    #[error("login failed with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid login response: {0}")]
    InvalidResponse(String),
}

/// Business-level failure from the controller, or a second consecutive session rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("controller returned code {code} for {url}: {message}")]
    Remote { code: i64, message: String, url: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("session rejected again after re-login (code {code}): {message}")]
    SessionRejected { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl RequestError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        RequestError::Http {
            status: status.as_u16(),
            body: Self::truncate_body(body),
        }
    }

    /// Remote error code, when the controller produced one.
    pub fn code(&self) -> Option<i64> {
        match self {
            RequestError::Remote { code, .. } | RequestError::SessionRejected { code, .. } => {
                Some(*code)
            }
            _ => None,
        }
    }
}

/// Any failure a resource operation can observe.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Request(#[from] RequestError),
}

impl Error {
    /// True when the controller reported that the addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Request(RequestError::Remote { code, .. })
                if *code == crate::api::rpc::CODE_OBJECT_NOT_FOUND
        )
    }
}
