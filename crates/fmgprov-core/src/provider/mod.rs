//! Provider entry point.
//!
//! [`provider`] is the zero-argument factory the orchestration host calls. The
//! returned [`ProviderDescriptor`] lists the recognized configuration options and
//! the resource handlers, and turns user settings into the shared [`Config`].

pub mod resource;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::api::ValidationError;
use crate::config::Config;
use crate::settings::{
    ProviderSettings, ENV_ADOM, ENV_CA_BUNDLE, ENV_HOSTNAME, ENV_INSECURE, ENV_PASSWORD,
    ENV_TIMEOUT, ENV_TOKEN, ENV_USERNAME,
};

pub use resource::{ObjectResource, ResourceHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    String,
    Bool,
    Integer,
    Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Required,
    Optional,
    /// At least one option of the named group must be set.
    OneOf(&'static str),
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: OptionKind,
    pub requirement: Requirement,
    pub sensitive: bool,
    pub env: Option<&'static str>,
    pub description: &'static str,
}

const OPTIONS: &[OptionSpec] = &[
    OptionSpec {
        name: "target",
        kind: OptionKind::String,
        requirement: Requirement::Required,
        sensitive: false,
        env: Some(ENV_HOSTNAME),
        description: "Controller address, e.g. https://fmg.example.net",
    },
    OptionSpec {
        name: "username",
        kind: OptionKind::String,
        requirement: Requirement::Optional,
        sensitive: false,
        env: Some(ENV_USERNAME),
        description: "Administrator name for password login",
    },
    OptionSpec {
        name: "password",
        kind: OptionKind::String,
        requirement: Requirement::OneOf("credentials"),
        sensitive: true,
        env: Some(ENV_PASSWORD),
        description: "Administrator password",
    },
    OptionSpec {
        name: "token",
        kind: OptionKind::String,
        requirement: Requirement::OneOf("credentials"),
        sensitive: true,
        env: Some(ENV_TOKEN),
        description: "API key; used instead of username/password when set",
    },
    OptionSpec {
        name: "timeout_secs",
        kind: OptionKind::Integer,
        requirement: Requirement::Optional,
        sensitive: false,
        env: Some(ENV_TIMEOUT),
        description: "Per-request timeout in seconds (default 30)",
    },
    OptionSpec {
        name: "insecure",
        kind: OptionKind::Bool,
        requirement: Requirement::Optional,
        sensitive: false,
        env: Some(ENV_INSECURE),
        description: "Skip TLS certificate verification (default false)",
    },
    OptionSpec {
        name: "ca_bundle",
        kind: OptionKind::Path,
        requirement: Requirement::Optional,
        sensitive: false,
        env: Some(ENV_CA_BUNDLE),
        description: "PEM file with additional trusted CA certificates",
    },
    OptionSpec {
        name: "adom",
        kind: OptionKind::String,
        requirement: Requirement::Optional,
        sensitive: false,
        env: Some(ENV_ADOM),
        description: "Administrative domain for ADOM-scoped paths (default root)",
    },
    OptionSpec {
        name: "max_connections",
        kind: OptionKind::Integer,
        requirement: Requirement::Optional,
        sensitive: false,
        env: None,
        description: "Maximum simultaneous requests to the controller (default 16)",
    },
    OptionSpec {
        name: "session_max_age_secs",
        kind: OptionKind::Integer,
        requirement: Requirement::Optional,
        sensitive: false,
        env: None,
        description: "Log in again once a session is older than this",
    },
];

fn builtin_resources() -> Vec<ObjectResource> {
    vec![
        ObjectResource::new("fortimanager_dvmdb_adom", "/dvmdb/adom", "name"),
        ObjectResource::new("fortimanager_dvmdb_device", "/dvmdb/adom/{adom}/device", "name"),
        ObjectResource::new(
            "fortimanager_system_admin_user",
            "/cli/global/system/admin/user",
            "userid",
        ),
        ObjectResource::new(
            "fortimanager_object_firewall_address",
            "/pm/config/adom/{adom}/obj/firewall/address",
            "name",
        ),
        ObjectResource::new(
            "fortimanager_object_firewall_addrgrp",
            "/pm/config/adom/{adom}/obj/firewall/addrgrp",
            "name",
        ),
    ]
}

/// Capability descriptor handed to the orchestration host.
pub struct ProviderDescriptor {
    pub name: &'static str,
    pub version: &'static str,
    options: &'static [OptionSpec],
    resources: BTreeMap<String, Box<dyn ResourceHandler>>,
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Zero-argument factory called by the host at startup.
pub fn provider() -> ProviderDescriptor {
    let mut descriptor = ProviderDescriptor {
        name: "fortimanager",
        version: env!("CARGO_PKG_VERSION"),
        options: OPTIONS,
        resources: BTreeMap::new(),
    };
    for resource in builtin_resources() {
        descriptor.register(Box::new(resource));
    }
    descriptor
}

impl ProviderDescriptor {
    pub fn options(&self) -> &[OptionSpec] {
        self.options
    }

    /// Add or replace a handler, keyed by its type name.
    pub fn register(&mut self, handler: Box<dyn ResourceHandler>) {
        self.resources.insert(handler.type_name().to_string(), handler);
    }

    pub fn resource(&self, type_name: &str) -> Option<&dyn ResourceHandler> {
        self.resources.get(type_name).map(|h| h.as_ref())
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Validate user settings and build the shared handle. Never touches the network.
    pub fn configure(&self, settings: &ProviderSettings) -> Result<Arc<Config>, ValidationError> {
        let config = Config::from_settings(settings)?;
        info!(
            controller = config.target(),
            adom = config.adom(),
            resources = self.resources.len(),
            "Provider configured"
        );
        Ok(Arc::new(config))
    }
}
