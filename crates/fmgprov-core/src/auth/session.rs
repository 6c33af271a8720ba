//! Controller session lifecycle.
//!
//! `AuthSession` is a small state machine:
//!
//! ```text
//! Unauthenticated --login--> Authenticating --ok--> Authenticated
//!                                  |                     |
//!                               failure         rejected by controller
//!                                  v                     v
//!                           Unauthenticated           Expired --login--> Authenticating
//! ```
//!
//! A login in progress is a shared future stored in the state. Every caller that
//! finds the session unusable either starts that future or awaits the one already
//! in flight, so one invalidation produces exactly one login. Callers holding a
//! valid token only take the read lock long enough to clone it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::{AuthMethod, CredentialStore, Secret};
use crate::api::rpc::{
    self, RpcRequest, RpcResponse, RpcStatus, CODE_NO_PERMISSION, CODE_OK, LOGIN_URL, LOGOUT_URL,
};
use crate::api::{AuthError, Document, Error, Method, RequestError, Transport};

/// Status codes that mean "this session is no longer valid".
pub const DEFAULT_REJECTION_CODES: &[i64] = &[CODE_NO_PERMISSION];

/// Code reported for an HTTP 401 from the controller.
const HTTP_UNAUTHORIZED_CODE: i64 = 401;

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Treat a token older than this as expired before using it.
    /// `None` leaves expiry entirely to the controller.
    pub max_age: Option<Duration>,
    pub rejection_codes: Vec<i64>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_age: None,
            rejection_codes: DEFAULT_REJECTION_CODES.to_vec(),
        }
    }
}

/// An issued session id or API token. The value never appears in Debug or Serialize output.
#[derive(Debug, Clone, Serialize)]
pub struct SessionToken {
    value: Secret,
    method: AuthMethod,
    issued_at: DateTime<Utc>,
    generation: u64,
}

impl SessionToken {
    pub(crate) fn new(value: Secret, method: AuthMethod, issued_at: DateTime<Utc>) -> Self {
        Self {
            value,
            method,
            issued_at,
            generation: 0,
        }
    }

    pub fn method(&self) -> AuthMethod {
        self.method
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Monotonic login counter for the owning session; bumps on every login.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_expired(&self, max_age: Option<Duration>) -> bool {
        let Some(max_age) = max_age else {
            return false;
        };
        chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| self.issued_at.checked_add_signed(age))
            .map(|expiry| Utc::now() > expiry)
            .unwrap_or(false)
    }

    fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }
}

/// Externally visible view of the session state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Unauthenticated,
    Authenticating,
    Authenticated {
        issued_at: DateTime<Utc>,
        generation: u64,
    },
    Expired,
}

type LoginFlight = Shared<BoxFuture<'static, Result<SessionToken, AuthError>>>;

enum State {
    Unauthenticated,
    Authenticating { generation: u64, flight: LoginFlight },
    Authenticated(SessionToken),
    Expired { generation: u64 },
}

enum Outcome {
    Completed(Document),
    Rejected(RpcStatus),
}

/// Log in to the controller once.
///
/// Password credentials go through `exec /sys/login/user`; an API token needs no
/// round trip and is returned as-is.
pub async fn login(
    credentials: &CredentialStore,
    transport: &Transport,
) -> Result<SessionToken, AuthError> {
    if let (AuthMethod::Token, Some(token)) = (credentials.auth_method(), credentials.token()) {
        debug!(controller = credentials.target(), "Using API token, no login round trip");
        return Ok(SessionToken::new(token.clone(), AuthMethod::Token, Utc::now()));
    }

    let password = credentials
        .password()
        .ok_or_else(|| AuthError::InvalidResponse("no password configured".to_string()))?;

    info!(
        controller = credentials.target(),
        user = credentials.username(),
        "Logging in to controller"
    );

    let params = rpc::params(
        LOGIN_URL,
        Some(json!({
            "user": credentials.username(),
            "passwd": password.expose(),
        })),
    );
    let request = RpcRequest {
        id: transport.next_request_id(),
        method: Method::Exec,
        params: [&params],
        session: None,
        verbose: 1,
    };

    let raw = transport.rpc(credentials.endpoint(), &request, None).await?;
    if raw.status == StatusCode::UNAUTHORIZED {
        return Err(AuthError::Rejected {
            code: HTTP_UNAUTHORIZED_CODE,
            message: "HTTP 401 Unauthorized".to_string(),
        });
    }
    if !raw.status.is_success() {
        return Err(match RequestError::from_status(raw.status, &raw.body) {
            RequestError::Http { status, body } => AuthError::Http { status, body },
            other => AuthError::InvalidResponse(other.to_string()),
        });
    }

    let envelope =
        RpcResponse::parse(&raw.body).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
    let session = envelope.session.clone();
    let document = envelope
        .into_first()
        .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
    let status = rpc::status_of(&document).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

    if status.code != CODE_OK {
        return Err(AuthError::Rejected {
            code: status.code,
            message: status.message,
        });
    }

    let session = session
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AuthError::InvalidResponse("login succeeded without a session id".to_string())
        })?;

    Ok(SessionToken::new(
        Secret::new(session),
        AuthMethod::Password,
        Utc::now(),
    ))
}

pub struct AuthSession {
    credentials: Arc<CredentialStore>,
    transport: Transport,
    policy: SessionPolicy,
    state: RwLock<State>,
    generation: AtomicU64,
    login_attempts: Arc<AtomicU64>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("target", &self.credentials.target())
            .field("status", &self.status())
            .field("login_attempts", &self.login_attempts())
            .finish()
    }
}

impl AuthSession {
    /// Starts Unauthenticated; nothing touches the network until the first request.
    pub fn new(
        credentials: Arc<CredentialStore>,
        transport: Transport,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            credentials,
            transport,
            policy,
            state: RwLock::new(State::Unauthenticated),
            generation: AtomicU64::new(0),
            login_attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn status(&self) -> SessionStatus {
        match &*self.state.read() {
            State::Unauthenticated => SessionStatus::Unauthenticated,
            State::Authenticating { .. } => SessionStatus::Authenticating,
            State::Authenticated(token) => SessionStatus::Authenticated {
                issued_at: token.issued_at,
                generation: token.generation,
            },
            State::Expired { .. } => SessionStatus::Expired,
        }
    }

    /// Number of login flights started since construction.
    pub fn login_attempts(&self) -> u64 {
        self.login_attempts.load(Ordering::SeqCst)
    }

    /// Return a usable token, logging in first if there is none.
    /// Joins a login already in flight instead of starting another.
    pub async fn session_token(&self) -> Result<SessionToken, AuthError> {
        {
            let state = self.state.read();
            if let State::Authenticated(token) = &*state {
                if !token.is_expired(self.policy.max_age) {
                    return Ok(token.clone());
                }
            }
        }

        let (generation, flight) = {
            let mut state = self.state.write();
            let joined = match &*state {
                State::Authenticated(token) if !token.is_expired(self.policy.max_age) => {
                    return Ok(token.clone());
                }
                State::Authenticated(token) => {
                    debug!(generation = token.generation, "Session exceeded its maximum age");
                    None
                }
                State::Authenticating { generation, flight } => Some((*generation, flight.clone())),
                State::Unauthenticated | State::Expired { .. } => None,
            };
            match joined {
                Some(in_flight) => in_flight,
                None => self.begin_login(&mut state),
            }
        };

        self.complete_login(generation, flight).await
    }

    /// Log in now, replacing any current token. Joins a login already in flight.
    pub async fn login(&self) -> Result<SessionToken, AuthError> {
        let (generation, flight) = {
            let mut state = self.state.write();
            let joined = match &*state {
                State::Authenticating { generation, flight } => Some((*generation, flight.clone())),
                _ => None,
            };
            match joined {
                Some(in_flight) => in_flight,
                None => self.begin_login(&mut state),
            }
        };

        self.complete_login(generation, flight).await
    }

    /// Mark `rejected` as expired. No-op when a newer token has already replaced it.
    pub fn invalidate(&self, rejected: &SessionToken) {
        let mut state = self.state.write();
        let current = matches!(
            &*state,
            State::Authenticated(token) if token.generation == rejected.generation
        );
        if current {
            debug!(generation = rejected.generation, "Session marked expired");
            *state = State::Expired {
                generation: rejected.generation,
            };
        }
    }

    fn begin_login(&self, state: &mut State) -> (u64, LoginFlight) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = match state {
            State::Expired { generation: expired } => Some(*expired),
            _ => None,
        };
        debug!(generation, ?previous, "Starting login");

        let credentials = Arc::clone(&self.credentials);
        let transport = self.transport.clone();
        let attempts = Arc::clone(&self.login_attempts);
        let flight = async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            login(&credentials, &transport)
                .await
                .map(|token| token.with_generation(generation))
        }
        .boxed()
        .shared();

        *state = State::Authenticating {
            generation,
            flight: flight.clone(),
        };
        (generation, flight)
    }

    /// Await a login flight and publish its outcome if it is still the current one.
    async fn complete_login(
        &self,
        generation: u64,
        flight: LoginFlight,
    ) -> Result<SessionToken, AuthError> {
        let result = flight.await;

        let mut state = self.state.write();
        let current = matches!(
            &*state,
            State::Authenticating { generation: g, .. } if *g == generation
        );
        if current {
            *state = match &result {
                Ok(token) => {
                    info!(generation, "Controller session established");
                    State::Authenticated(token.clone())
                }
                Err(e) => {
                    warn!(generation, error = %e, "Login failed");
                    State::Unauthenticated
                }
            };
        }
        result
    }

    /// Issue one authenticated call.
    ///
    /// A session rejection triggers one re-login and one retry. A second rejection
    /// surfaces as `RequestError::SessionRejected`. Business errors and network
    /// failures are returned as they are, without retry.
    pub async fn signed_request(
        &self,
        method: Method,
        params: &Map<String, Value>,
    ) -> Result<Document, Error> {
        let url = params
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let token = self.session_token().await?;
        let status = match self.send(&token, method, params, &url).await? {
            Outcome::Completed(document) => return Ok(document),
            Outcome::Rejected(status) => status,
        };

        warn!(
            url = %url,
            code = status.code,
            generation = token.generation,
            "Session rejected by controller, logging in again"
        );
        self.invalidate(&token);

        let token = self.session_token().await?;
        match self.send(&token, method, params, &url).await? {
            Outcome::Completed(document) => Ok(document),
            Outcome::Rejected(status) => {
                self.invalidate(&token);
                Err(RequestError::SessionRejected {
                    code: status.code,
                    message: status.message,
                }
                .into())
            }
        }
    }

    async fn send(
        &self,
        token: &SessionToken,
        method: Method,
        params: &Map<String, Value>,
        url: &str,
    ) -> Result<Outcome, Error> {
        let (session, bearer) = match token.method {
            AuthMethod::Password => (Some(token.value.expose()), None),
            AuthMethod::Token => (None, Some(token.value.expose())),
        };
        let request = RpcRequest {
            id: self.transport.next_request_id(),
            method,
            params: [params],
            session,
            verbose: 1,
        };

        let raw = self
            .transport
            .rpc(self.credentials.endpoint(), &request, bearer)
            .await?;

        if raw.status == StatusCode::UNAUTHORIZED {
            return Ok(Outcome::Rejected(RpcStatus {
                code: HTTP_UNAUTHORIZED_CODE,
                message: "HTTP 401 Unauthorized".to_string(),
            }));
        }
        if !raw.status.is_success() {
            return Err(RequestError::from_status(raw.status, &raw.body).into());
        }

        let document = RpcResponse::parse(&raw.body)?.into_first()?;
        let status = rpc::status_of(&document)?;
        debug!(url, %method, code = status.code, "Controller replied");

        if status.code == CODE_OK {
            Ok(Outcome::Completed(document))
        } else if self.policy.rejection_codes.contains(&status.code) {
            Ok(Outcome::Rejected(status))
        } else {
            Err(RequestError::Remote {
                code: status.code,
                message: status.message,
                url: url.to_string(),
            }
            .into())
        }
    }

    /// End the controller session, if one is open. API-token sessions have nothing to close.
    pub async fn logout(&self) -> Result<(), Error> {
        let token = {
            let mut state = self.state.write();
            match std::mem::replace(&mut *state, State::Unauthenticated) {
                State::Authenticated(token) => Some(token),
                other => {
                    *state = other;
                    None
                }
            }
        };

        let Some(token) = token else {
            return Ok(());
        };
        if token.method == AuthMethod::Token {
            return Ok(());
        }

        let params = rpc::params(LOGOUT_URL, None);
        match self.send(&token, Method::Exec, &params, LOGOUT_URL).await? {
            Outcome::Completed(_) => info!(generation = token.generation, "Logged out"),
            Outcome::Rejected(status) => {
                debug!(code = status.code, "Session already gone at logout")
            }
        }
        Ok(())
    }
}
