//! JSON-RPC envelope spoken by the FortiManager `/jsonrpc` endpoint.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::RequestError;

/// Generic response document: the first entry of the envelope's `result` array.
pub type Document = Map<String, Value>;

/// Status code for a successful call.
pub const CODE_OK: i64 = 0;

/// "Object does not exist"
pub const CODE_OBJECT_NOT_FOUND: i64 = -3;

/// "No permission for the resource". The controller answers with this when the
/// session is unknown or has timed out.
pub const CODE_NO_PERMISSION: i64 = -11;

pub const LOGIN_URL: &str = "/sys/login/user";
pub const LOGOUT_URL: &str = "/sys/logout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Set,
    Add,
    Update,
    Delete,
    Exec,
    Clone,
    Move,
    Replace,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Set => "set",
            Method::Add => "add",
            Method::Update => "update",
            Method::Delete => "delete",
            Method::Exec => "exec",
            Method::Clone => "clone",
            Method::Move => "move",
            Method::Replace => "replace",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "set" => Ok(Method::Set),
            "add" => Ok(Method::Add),
            "update" => Ok(Method::Update),
            "delete" => Ok(Method::Delete),
            "exec" => Ok(Method::Exec),
            "clone" => Ok(Method::Clone),
            "move" => Ok(Method::Move),
            "replace" => Ok(Method::Replace),
            other => Err(format!("unknown JSON-RPC method: {}", other)),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a> {
    pub id: u64,
    pub method: Method,
    pub params: [&'a Map<String, Value>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<&'a str>,
    pub verbose: u8,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse {
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub result: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcStatus {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Build the `params[0]` object for a call.
pub fn params(url: &str, data: Option<Value>) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("url".to_string(), Value::String(url.to_string()));
    if let Some(data) = data {
        params.insert("data".to_string(), data);
    }
    params
}

/// Extract the status block of a result document.
pub fn status_of(document: &Document) -> Result<RpcStatus, RequestError> {
    let status = document
        .get("status")
        .ok_or_else(|| RequestError::InvalidResponse("result entry has no status".to_string()))?;
    serde_json::from_value(status.clone())
        .map_err(|e| RequestError::InvalidResponse(format!("malformed status block: {}", e)))
}

/// The `data` member of a result document, if any.
pub fn document_data(document: &Document) -> Option<&Value> {
    document.get("data").filter(|v| !v.is_null())
}

impl RpcResponse {
    pub fn parse(body: &str) -> Result<Self, RequestError> {
        serde_json::from_str(body)
            .map_err(|e| RequestError::InvalidResponse(format!("not a JSON-RPC envelope: {}", e)))
    }

    pub fn into_first(self) -> Result<Document, RequestError> {
        self.result
            .into_iter()
            .next()
            .ok_or_else(|| RequestError::InvalidResponse("empty result array".to_string()))
    }
}
