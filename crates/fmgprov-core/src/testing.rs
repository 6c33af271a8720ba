//! Mock controller helpers shared by the unit tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use crate::api::rpc::LOGIN_URL;
use crate::api::Transport;
use crate::auth::CredentialStore;

fn body_json(request: &Request) -> Option<Value> {
    serde_json::from_slice(&request.body).ok()
}

/// Matches envelopes whose `params[0].url` equals the given path.
pub struct RpcUrl(pub &'static str);

impl Match for RpcUrl {
    fn matches(&self, request: &Request) -> bool {
        body_json(request)
            .map(|body| body["params"][0]["url"] == self.0)
            .unwrap_or(false)
    }
}

/// Matches envelopes carrying the given session id.
pub struct RpcSession(pub &'static str);

impl Match for RpcSession {
    fn matches(&self, request: &Request) -> bool {
        body_json(request)
            .map(|body| body["session"] == self.0)
            .unwrap_or(false)
    }
}

/// Matches envelopes using the given JSON-RPC verb.
pub struct RpcMethod(pub &'static str);

impl Match for RpcMethod {
    fn matches(&self, request: &Request) -> bool {
        body_json(request)
            .map(|body| body["method"] == self.0)
            .unwrap_or(false)
    }
}

pub fn status(url: &str, code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": 1,
        "result": [{"status": {"code": code, "message": message}, "url": url}]
    }))
}

pub fn ok(url: &str, data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": 1,
        "result": [{"status": {"code": 0, "message": "OK"}, "url": url, "data": data}]
    }))
}

pub fn login_ok(session: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": 1,
        "session": session,
        "result": [{"status": {"code": 0, "message": "OK"}, "url": LOGIN_URL}]
    }))
}

/// Serve `times` successful logins issuing `session`. Mounted logins are consumed in order.
pub async fn mount_login(server: &MockServer, session: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(RpcUrl(LOGIN_URL))
        .respond_with(login_ok(session))
        .up_to_n_times(times)
        .expect(times)
        .mount(server)
        .await;
}

pub fn password_credentials(server: &MockServer) -> Arc<CredentialStore> {
    Arc::new(CredentialStore::new(&server.uri(), "admin", "correct-horse", "").unwrap())
}

pub fn transport(timeout: Duration) -> Transport {
    Transport::new(timeout, false).unwrap()
}
