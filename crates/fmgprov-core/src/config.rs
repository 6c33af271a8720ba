//! The shared handle every resource operation receives.
//!
//! `Config` bundles the credentials, the pooled transport and the auth session.
//! It is built once per provider instance, wrapped in an `Arc`, and passed by
//! reference into every operation. Login is lazy: constructing a `Config` never
//! touches the network, and the first call surfaces any connectivity problem.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::api::rpc;
use crate::api::{Document, Error, Method, Transport, ValidationError};
use crate::auth::{AuthSession, CredentialStore, SessionPolicy, SessionStatus};
use crate::settings::ProviderSettings;

/// Administrative domain used when none is configured.
pub const DEFAULT_ADOM: &str = "root";

/// Placeholder substituted with the configured ADOM in request paths.
const ADOM_PLACEHOLDER: &str = "{adom}";

/// Check that an ADOM name fits in a single path segment.
pub fn validate_adom(adom: &str) -> Result<&str, ValidationError> {
    let adom = adom.trim();
    if adom.is_empty() || adom.contains(|c: char| c == '/' || c == '\\') {
        return Err(ValidationError::InvalidSetting {
            name: "adom",
            reason: format!("{:?} is not a valid ADOM name", adom),
        });
    }
    Ok(adom)
}

pub struct Config {
    credentials: Arc<CredentialStore>,
    transport: Transport,
    session: AuthSession,
    adom: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("credentials", &self.credentials)
            .field("adom", &self.adom)
            .field("session", &self.session)
            .finish()
    }
}

impl Config {
    pub fn new(credentials: CredentialStore, transport: Transport) -> Self {
        Self::with_policy(credentials, transport, SessionPolicy::default(), DEFAULT_ADOM)
    }

    pub fn with_policy(
        credentials: CredentialStore,
        transport: Transport,
        policy: SessionPolicy,
        adom: &str,
    ) -> Self {
        let credentials = Arc::new(credentials);
        let session = AuthSession::new(Arc::clone(&credentials), transport.clone(), policy);
        let adom = Some(adom.trim())
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_ADOM)
            .to_string();
        Self {
            credentials,
            transport,
            session,
            adom,
        }
    }

    /// Validate settings and build the handle. Performs no network I/O.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ValidationError> {
        let resolved = settings.resolve()?;
        let transport = Transport::with_options(&resolved.transport)?;
        Ok(Self::with_policy(
            resolved.credentials,
            transport,
            resolved.policy,
            &resolved.adom,
        ))
    }

    pub fn target(&self) -> &str {
        self.credentials.target()
    }

    pub fn username(&self) -> &str {
        self.credentials.username()
    }

    pub fn adom(&self) -> &str {
        &self.adom
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn session_status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Substitute `{adom}` in a path template.
    pub fn resolve_path(&self, template: &str) -> String {
        template.replace(ADOM_PLACEHOLDER, &self.adom)
    }

    /// Issue one JSON-RPC call and return the first result entry.
    ///
    /// `body`, when present, is sent as `params[0].data`.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Document, Error> {
        let mut extra = Map::new();
        if let Some(body) = body {
            extra.insert("data".to_string(), body);
        }
        self.call_with_params(method, path, extra).await
    }

    /// Like [`Config::call`], with arbitrary extra `params[0]` members
    /// (`filter`, `fields`, `option`, ...).
    pub async fn call_with_params(
        &self,
        method: Method,
        path: &str,
        extra: Map<String, Value>,
    ) -> Result<Document, Error> {
        let url = self.resolve_path(path.trim());
        if !url.starts_with('/') {
            return Err(ValidationError::InvalidSetting {
                name: "path",
                reason: format!("request path must start with '/': {:?}", path),
            }
            .into());
        }

        let mut params = rpc::params(&url, None);
        for (key, value) in extra {
            if key != "url" {
                params.insert(key, value);
            }
        }

        debug!(%method, url = %url, "Calling controller");
        self.session.signed_request(method, &params).await
    }

    /// Log in now rather than on first use.
    pub async fn login(&self) -> Result<(), Error> {
        self.session.session_token().await?;
        Ok(())
    }

    /// Take the workspace lock on an ADOM (the configured one when `adom` is `None`).
    pub async fn lock_adom(&self, adom: Option<&str>) -> Result<Document, Error> {
        self.workspace_action(adom, "lock").await
    }

    pub async fn commit_adom(&self, adom: Option<&str>) -> Result<Document, Error> {
        self.workspace_action(adom, "commit").await
    }

    pub async fn unlock_adom(&self, adom: Option<&str>) -> Result<Document, Error> {
        self.workspace_action(adom, "unlock").await
    }

    async fn workspace_action(&self, adom: Option<&str>, action: &str) -> Result<Document, Error> {
        let adom = validate_adom(adom.unwrap_or(&self.adom))?;
        let path = format!("/dvmdb/adom/{}/workspace/{}", adom, action);
        info!(adom, action, "Workspace operation");
        self.call(Method::Exec, &path, None).await
    }

    /// Close the controller session and stop accepting requests.
    /// Logout failures are logged, not returned: the process is going away regardless.
    pub async fn shutdown(&self) {
        if let Err(e) = self.session.logout().await {
            warn!(error = %e, controller = self.target(), "Logout failed during shutdown");
        }
        self.transport.close();
        info!(controller = self.target(), "Provider connection closed");
    }
}

/// Handle type passed to resource operations.
pub type SharedConfig = Arc<Config>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::rpc::LOGOUT_URL;
    use crate::testing::{self, RpcMethod, RpcSession, RpcUrl};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{any, method};
    use wiremock::{Mock, MockServer};

    fn config_for(server: &MockServer) -> Config {
        let credentials =
            CredentialStore::new(&server.uri(), "admin", "correct-horse", "").unwrap();
        Config::new(credentials, testing::transport(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_construction_is_lazy() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(testing::login_ok("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let config = config_for(&server);
        assert_eq!(config.session_status(), SessionStatus::Unauthenticated);
        assert_eq!(config.session().login_attempts(), 0);
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[test]
    fn test_construction_succeeds_for_unreachable_target() {
        let credentials = CredentialStore::new("https://192.0.2.1", "admin", "pw", "").unwrap();
        let transport = Transport::new(Duration::from_secs(1), false).unwrap();
        let config = Config::new(credentials, transport);
        assert_eq!(config.target(), "https://192.0.2.1");
        assert_eq!(config.adom(), DEFAULT_ADOM);
    }

    #[test]
    fn test_resolve_path_substitutes_adom() {
        let credentials = CredentialStore::new("fmg", "admin", "pw", "").unwrap();
        let transport = Transport::new(Duration::from_secs(1), false).unwrap();
        let config = Config::with_policy(credentials, transport, SessionPolicy::default(), "lab");
        assert_eq!(
            config.resolve_path("/pm/config/adom/{adom}/obj/firewall/address"),
            "/pm/config/adom/lab/obj/firewall/address"
        );
        assert_eq!(config.resolve_path("/sys/status"), "/sys/status");
    }

    #[tokio::test]
    async fn test_call_places_body_in_data() {
        let server = MockServer::start().await;
        testing::mount_login(&server, "sess-1", 1).await;
        Mock::given(method("POST"))
            .and(RpcUrl("/dvmdb/adom"))
            .and(RpcMethod("add"))
            .and(RpcSession("sess-1"))
            .and(wiremock::matchers::body_partial_json(json!({"verbose": 1})))
            .respond_with(testing::ok("/dvmdb/adom", json!({"name": "lab"})))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server);
        let doc = config
            .call(Method::Add, "/dvmdb/adom", Some(json!({"name": "lab"})))
            .await
            .unwrap();
        assert_eq!(rpc::document_data(&doc), Some(&json!({"name": "lab"})));

        let requests = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests.last().unwrap().body).unwrap();
        assert_eq!(sent["params"][0]["data"], json!({"name": "lab"}));
    }

    #[tokio::test]
    async fn test_call_with_params_keeps_url() {
        let server = MockServer::start().await;
        testing::mount_login(&server, "sess-1", 1).await;
        Mock::given(method("POST"))
            .and(RpcUrl("/dvmdb/adom"))
            .respond_with(testing::ok("/dvmdb/adom", json!([])))
            .mount(&server)
            .await;

        let config = config_for(&server);
        let mut extra = Map::new();
        extra.insert("url".to_string(), json!("/elsewhere"));
        extra.insert("fields".to_string(), json!(["name"]));
        config
            .call_with_params(Method::Get, "/dvmdb/adom", extra)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests.last().unwrap().body).unwrap();
        assert_eq!(sent["params"][0]["url"], "/dvmdb/adom");
        assert_eq!(sent["params"][0]["fields"], json!(["name"]));
    }

    #[tokio::test]
    async fn test_repeated_reads_are_structurally_equal() {
        let server = MockServer::start().await;
        testing::mount_login(&server, "sess-1", 1).await;
        Mock::given(method("POST"))
            .and(RpcUrl("/sys/status"))
            .respond_with(testing::ok(
                "/sys/status",
                json!({"Version": "v7.4.3", "Hostname": "fmg"}),
            ))
            .expect(2)
            .mount(&server)
            .await;

        let config = config_for(&server);
        let first = config.call(Method::Get, "/sys/status", None).await.unwrap();
        let second = config.call(Method::Get, "/sys/status", None).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_relative_path_rejected_without_io() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(testing::login_ok("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let config = config_for(&server);
        let err = config.call(Method::Get, "sys/status", None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::InvalidSetting { name: "path", .. })
        ));
    }

    #[tokio::test]
    async fn test_workspace_helpers_target_adom() {
        let server = MockServer::start().await;
        testing::mount_login(&server, "sess-1", 1).await;
        for action in ["lock", "commit", "unlock"] {
            let url: &'static str = match action {
                "lock" => "/dvmdb/adom/root/workspace/lock",
                "commit" => "/dvmdb/adom/root/workspace/commit",
                _ => "/dvmdb/adom/root/workspace/unlock",
            };
            Mock::given(method("POST"))
                .and(RpcUrl(url))
                .and(RpcMethod("exec"))
                .respond_with(testing::ok(url, Value::Null))
                .expect(1)
                .mount(&server)
                .await;
        }

        let config = config_for(&server);
        config.lock_adom(None).await.unwrap();
        config.commit_adom(None).await.unwrap();
        config.unlock_adom(Some("root")).await.unwrap();
    }

    #[test]
    fn test_validate_adom_rejects_path_separators() {
        assert_eq!(validate_adom(" lab ").unwrap(), "lab");
        for bad in ["", "  ", "a/b", "a\\b"] {
            assert!(matches!(
                validate_adom(bad),
                Err(ValidationError::InvalidSetting { name: "adom", .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_workspace_rejects_adom_with_slash_without_io() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(testing::login_ok("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let config = config_for(&server);
        let err = config.lock_adom(Some("root/../other")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::InvalidSetting { name: "adom", .. })
        ));
        assert_eq!(config.session().login_attempts(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_logs_out_and_closes_transport() {
        let server = MockServer::start().await;
        testing::mount_login(&server, "sess-1", 1).await;
        Mock::given(method("POST"))
            .and(RpcUrl(LOGOUT_URL))
            .respond_with(testing::ok(LOGOUT_URL, Value::Null))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server);
        config.login().await.unwrap();
        config.shutdown().await;

        assert_eq!(config.session_status(), SessionStatus::Unauthenticated);
        let err = config.call(Method::Get, "/sys/status", None).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_debug_never_shows_password() {
        let credentials = CredentialStore::new("fmg", "admin", "s3cr3t-value", "").unwrap();
        let transport = Transport::new(Duration::from_secs(1), false).unwrap();
        let config = Config::new(credentials, transport);
        assert!(!format!("{:?}", config).contains("s3cr3t-value"));
    }
}
