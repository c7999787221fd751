pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_ENV: &str = "ROUTEFLOW_CONFIG";
const TOKEN_ENV: &str = "OS_AUTH_TOKEN";

/// Top-level routeflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cluster label embedded in every managed resource name
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Only ingresses of this class are reconciled
    #[serde(default = "default_ingress_class")]
    pub ingress_class: String,

    pub openstack: OpenStackConfig,

    #[serde(default)]
    pub controller: ControllerConfig,
}

/// Endpoints and placement of the cloud resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenStackConfig {
    /// Load-balancer service (Octavia) endpoint, e.g. `https://lb.example.com`
    pub loadbalancer_endpoint: String,
    /// Network service (Neutron) endpoint
    pub network_endpoint: String,
    /// Key-manager service (Barbican) endpoint
    pub key_manager_endpoint: String,
    /// Pre-issued auth token; falls back to `OS_AUTH_TOKEN`
    #[serde(default)]
    pub token: Option<String>,
    /// Subnet the load balancer VIPs are allocated on
    pub subnet_id: String,
    /// External network for floating IPs; routes stay internal when unset
    #[serde(default)]
    pub floating_network_id: Option<String>,
    /// Load balancer provider driver
    #[serde(default)]
    pub provider: Option<String>,
    /// Default for routes that don't carry the security-group annotation
    #[serde(default)]
    pub manage_security_groups: bool,
}

impl OpenStackConfig {
    /// Returns the configured token, or the `OS_AUTH_TOKEN` environment value
    pub fn resolve_token(&self) -> Result<String> {
        if let Some(token) = self.token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(token.clone());
        }
        std::env::var(TOKEN_ENV).map_err(|_| {
            ConfigError::Invalid(format!(
                "openstack.token is not set and {} is not in the environment",
                TOKEN_ENV
            ))
        })
    }
}

/// Reconciliation timing and retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Queue retries before a route is dropped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Interval of the node set refresh loop
    #[serde(default = "default_node_sync_interval")]
    pub node_sync_interval_secs: u64,
    /// First delay of the provisioning status poll
    #[serde(default = "default_poll_initial_delay")]
    pub poll_initial_delay_secs: u64,
    /// Poll delay multiplier
    #[serde(default = "default_poll_factor")]
    pub poll_factor: f64,
    /// Maximum provisioning status polls per wait
    #[serde(default = "default_poll_steps")]
    pub poll_steps: u32,
}

fn default_cluster_name() -> String {
    "kubernetes".to_string()
}
fn default_ingress_class() -> String {
    "openstack".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_node_sync_interval() -> u64 {
    60
}
fn default_poll_initial_delay() -> u64 {
    3
}
fn default_poll_factor() -> f64 {
    1.0
}
fn default_poll_steps() -> u32 {
    240
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            node_sync_interval_secs: default_node_sync_interval(),
            poll_initial_delay_secs: default_poll_initial_delay(),
            poll_factor: default_poll_factor(),
            poll_steps: default_poll_steps(),
        }
    }
}

impl ControllerConfig {
    pub fn node_sync_interval(&self) -> Duration {
        Duration::from_secs(self.node_sync_interval_secs)
    }

    pub fn poll_initial_delay(&self) -> Duration {
        Duration::from_secs(self.poll_initial_delay_secs)
    }
}

impl Config {
    /// Parse a config from YAML text
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the config file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content, path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.is_empty() {
            return Err(ConfigError::Invalid("cluster_name must not be empty".into()));
        }
        if self.openstack.subnet_id.is_empty() {
            return Err(ConfigError::Invalid(
                "openstack.subnet_id must not be empty".into(),
            ));
        }
        if self.controller.poll_steps == 0 {
            return Err(ConfigError::Invalid(
                "controller.poll_steps must be at least 1".into(),
            ));
        }
        if self.controller.poll_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "controller.poll_factor must be >= 1.0".into(),
            ));
        }
        if self.controller.node_sync_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "controller.node_sync_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Locate the routeflow config file
///
/// Search order:
/// 1. `ROUTEFLOW_CONFIG` environment variable (direct path)
/// 2. current directory: routeflow.yaml, .routeflow.yaml
/// 3. ~/.config/routeflow/config.yaml
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    for filename in ["routeflow.yaml", ".routeflow.yaml"] {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("routeflow").join("config.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}
