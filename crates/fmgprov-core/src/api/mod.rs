//! Wire layer for the FortiManager JSON-RPC API.
//!
//! This module provides the pooled `Transport`, the request/response envelope
//! types, and the error taxonomy shared by the whole crate.

pub mod error;
pub mod rpc;
pub mod transport;

pub use error::{AuthError, Error, NetworkError, RequestError, ValidationError};
pub use rpc::{document_data, Document, Method, RpcStatus};
pub use transport::{RawResponse, Transport, TransportOptions};
