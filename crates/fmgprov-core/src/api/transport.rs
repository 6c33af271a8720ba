//! Shared HTTP transport.
//!
//! One `Transport` is built per provider instance and handed to every request.
//! Clone is cheap: `reqwest::Client` keeps its connection pool behind an `Arc`,
//! and the in-flight limit and request-id counter are shared the same way.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use tokio::sync::Semaphore;
use tracing::debug;

use super::rpc::RpcRequest;
use super::{NetworkError, ValidationError};

/// HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Upper bound on simultaneous requests to one controller.
/// FortiManager admins commonly cap concurrent API sessions well below 32.
pub const DEFAULT_MAX_CONNECTIONS: usize = 16;

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    /// Skip certificate verification. Off unless explicitly requested.
    pub insecure: bool,
    /// PEM bundle of additional trusted roots.
    pub ca_bundle: Option<PathBuf>,
    pub max_connections: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            insecure: false,
            ca_bundle: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Raw HTTP outcome of one JSON-RPC exchange.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Clone)]
pub struct Transport {
    client: Client,
    permits: Arc<Semaphore>,
    next_id: Arc<AtomicU64>,
    timeout: Duration,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("timeout", &self.timeout)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl Transport {
    /// Build a transport with default pool sizing. No connection is opened here.
    pub fn new(timeout: Duration, tls_insecure_allowed: bool) -> Result<Self, ValidationError> {
        Self::with_options(&TransportOptions {
            timeout,
            insecure: tls_insecure_allowed,
            ..TransportOptions::default()
        })
    }

    pub fn with_options(options: &TransportOptions) -> Result<Self, ValidationError> {
        if options.max_connections == 0 {
            return Err(ValidationError::InvalidSetting {
                name: "max_connections",
                reason: "must be at least 1".to_string(),
            });
        }

        let mut builder = Client::builder()
            .timeout(options.timeout)
            .pool_max_idle_per_host(options.max_connections)
            .danger_accept_invalid_certs(options.insecure);

        if let Some(ref path) = options.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| ValidationError::InvalidSetting {
                name: "ca_bundle",
                reason: format!("cannot read {}: {}", path.display(), e),
            })?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
                ValidationError::InvalidSetting {
                    name: "ca_bundle",
                    reason: format!("cannot parse {}: {}", path.display(), e),
                }
            })?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder
            .build()
            .map_err(|e| ValidationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(options.max_connections)),
            next_id: Arc::new(AtomicU64::new(1)),
            timeout: options.timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send one prepared request, holding an in-flight permit until the headers arrive.
    pub async fn execute(
        &self,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, NetworkError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| NetworkError::Other("transport has been shut down".to_string()))?;
        self.client.execute(request).await.map_err(NetworkError::from)
    }

    /// POST a JSON-RPC envelope and read the whole body under one permit.
    pub(crate) async fn rpc(
        &self,
        endpoint: &Url,
        request: &RpcRequest<'_>,
        bearer: Option<&str>,
    ) -> Result<RawResponse, NetworkError> {
        let mut builder = self.client.post(endpoint.clone()).json(request);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        let prepared = builder.build().map_err(NetworkError::from)?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| NetworkError::Other("transport has been shut down".to_string()))?;

        debug!(id = request.id, method = %request.method, "Sending JSON-RPC request");
        let response = self.client.execute(prepared).await.map_err(NetworkError::from)?;
        let status = response.status();
        let body = response.text().await.map_err(NetworkError::from)?;
        Ok(RawResponse { status, body })
    }

    /// Refuse further requests. Idle pooled connections close once the last clone drops.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}
