use dbridge_core::ConversionPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::bootstrap::BootstrapConfig;
use crate::permissions::PermissionRule;

const ENV_BIND: &str = "DBRIDGE_BIND";
const ENV_PORT: &str = "DBRIDGE_PORT";
const ENV_DEFAULT_URL: &str = "DBRIDGE_DEFAULT_URL";

/// Policy table used when a backend has no table of its own.
pub const DEFAULT_POLICY: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 6745,
        }
    }
}

/// Contents of `dbridge.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub bootstrap: BootstrapConfig,
    /// Conversion policies keyed by backend name (`sqlite`, ...) or `default`.
    pub policies: BTreeMap<String, ConversionPolicy>,
    pub permissions: BTreeMap<String, PermissionRule>,
}

impl Config {
    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        for policy in config.policies.values() {
            policy.zone()?;
        }
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var(ENV_BIND) {
            if !bind.is_empty() {
                self.server.bind = bind;
            }
        }

        if let Ok(port_str) = std::env::var(ENV_PORT) {
            if let Ok(port) = port_str.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(url) = std::env::var(ENV_DEFAULT_URL) {
            if !url.is_empty() {
                self.bootstrap.default_url = Some(url);
            }
        }
    }

    /// Base policy for a backend, before per-connection overrides.
    pub fn policy_for(&self, backend: &str) -> ConversionPolicy {
        self.policies
            .get(backend)
            .or_else(|| self.policies.get(DEFAULT_POLICY))
            .cloned()
            .unwrap_or_default()
    }
}
