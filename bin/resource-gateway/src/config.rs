//! Gateway configuration

use anyhow::{bail, Context, Result};
use resource_api::{ApiId, Extra, Name};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

/// Path of the configuration file
pub const CONFIG_ENV: &str = "RESOURCE_GATEWAY_CONFIG";
/// Overrides `listen`
pub const LISTEN_ENV: &str = "RESOURCE_GATEWAY_LISTEN";

const DEFAULT_CONFIG_PATH: &str = "resource-gateway.yaml";

/// Models a local resource can be built from
pub const KNOWN_MODELS: &[&str] = &["fake"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// RPC endpoint address
    pub listen: String,
    /// Health and metrics endpoint; disabled when absent
    pub admin_listen: Option<String>,
    pub log: LogConfig,
    pub resources: Vec<ResourceConfig>,
    pub remotes: Vec<RemoteConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            admin_listen: Some("0.0.0.0:9090".to_string()),
            log: LogConfig::default(),
            resources: Vec::new(),
            remotes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// A resource built and served by this process
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_api")]
    pub api: ApiId,
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub attributes: Extra,
}

impl ResourceConfig {
    pub fn resource_name(&self) -> Name {
        Name::new(self.api.clone(), &self.name)
    }
}

fn default_api() -> ApiId {
    service_lerobot::api()
}

/// Another system whose resources are proxied under `name`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteConfig {
    pub name: String,
    /// `host:port` of the remote RPC endpoint
    pub address: String,
    /// Fully-qualified names on the remote, e.g. `rdk:service:lerobot/arm1`
    #[serde(default)]
    pub resources: Vec<Name>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl GatewayConfig {
    /// Load from `RESOURCE_GATEWAY_CONFIG`, applying environment overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        if let Ok(listen) = std::env::var(LISTEN_ENV) {
            config.listen = listen;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Reject anything that would fail while building collections
    pub fn validate(&self) -> Result<()> {
        self.listen
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address {:?}", self.listen))?;
        if let Some(admin) = &self.admin_listen {
            admin
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid admin_listen address {:?}", admin))?;
        }

        let served = [service_lerobot::api()];
        let mut names = HashSet::new();

        for resource in &self.resources {
            if !served.contains(&resource.api) {
                bail!("Resource {}: API {} is not served", resource.name, resource.api);
            }
            let name = Name::parse_short(resource.api.clone(), &resource.name)
                .with_context(|| format!("Invalid resource name {:?}", resource.name))?;
            if name.is_remote() {
                bail!("Local resource {} must not carry a remote prefix", name);
            }
            if !KNOWN_MODELS.contains(&resource.model.as_str()) {
                bail!("Resource {}: unknown model {:?}", name, resource.model);
            }
            if !names.insert(name.clone()) {
                bail!("Duplicate resource {}", name);
            }
        }

        let mut remotes = HashSet::new();
        for remote in &self.remotes {
            if remote.name.is_empty() || remote.name.contains([':', '/']) {
                bail!("Invalid remote name {:?}", remote.name);
            }
            if !remotes.insert(remote.name.as_str()) {
                bail!("Duplicate remote {}", remote.name);
            }
            if remote.address.is_empty() {
                bail!("Remote {} has no address", remote.name);
            }
            for name in &remote.resources {
                if !served.contains(name.api()) {
                    bail!("Remote {}: API {} is not served", remote.name, name.api());
                }
                let proxied = name.prepend_remote(&remote.name);
                if !names.insert(proxied.clone()) {
                    bail!("Duplicate resource {}", proxied);
                }
            }
        }
        Ok(())
    }
}
