//! Configuration
//!
//! Loads configuration from YAML files with a cascading priority system:
//! 1. `./weft.yaml` (current directory - highest priority)
//! 2. `~/.config/weft/weft.yaml` (user config directory)
//! 3. `/etc/weft/weft.yaml` (system - lowest priority)
//!
//! Values from higher priority files override those from lower priority
//! files. CLI flags override everything (applied in `main`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{Identity, IdentityError};

/// Default config filename.
const CONFIG_FILENAME: &str = "weft.yaml";

/// Default unicast control bind address.
const DEFAULT_CONTROL_BIND_ADDR: &str = "[::]:8481";

/// Default discovery multicast port.
const DEFAULT_MULTICAST_PORT: u16 = 8481;

/// Default WireGuard listen port.
const DEFAULT_TUNNEL_LISTEN_PORT: u16 = 51820;

/// Default virtual interface name.
const DEFAULT_TUNNEL_INTERFACE: &str = "weft0";

/// Default timeout before a parked tunnel negotiation decays (seconds).
const DEFAULT_NEGOTIATION_TIMEOUT_SECS: u64 = 120;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("node.public_key_file and node.private_key_file are required")]
    MissingKeyFiles,

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
}

/// Control channel configuration (`node.control.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Unicast bind address (`bind_addr`). Defaults to "[::]:8481".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_addr: Option<String>,

    /// Discovery multicast port (`multicast_port`). Defaults to 8481.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multicast_port: Option<u16>,

    /// Advertised control address per interface (`addresses`).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub addresses: HashMap<String, String>,
}

impl ControlConfig {
    /// Get the bind address, using the default if not configured.
    pub fn bind_addr(&self) -> &str {
        self.bind_addr.as_deref().unwrap_or(DEFAULT_CONTROL_BIND_ADDR)
    }

    /// Get the multicast port, using the default if not configured.
    pub fn multicast_port(&self) -> u16 {
        self.multicast_port.unwrap_or(DEFAULT_MULTICAST_PORT)
    }
}

/// Node configuration (`node.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Physical network interface to operate on (`interface`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// Path to the base64 public key file (`public_key_file`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_file: Option<PathBuf>,

    /// Path to the base64 private key file (`private_key_file`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<PathBuf>,

    /// Control channel settings (`control.*`).
    #[serde(default)]
    pub control: ControlConfig,

    /// Seconds before a parked tunnel negotiation decays back to mutual
    /// (`negotiation_timeout_secs`). Defaults to 120.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negotiation_timeout_secs: Option<u64>,
}

impl NodeConfig {
    /// Get the negotiation timeout, using the default if not configured.
    pub fn negotiation_timeout_secs(&self) -> u64 {
        self.negotiation_timeout_secs
            .unwrap_or(DEFAULT_NEGOTIATION_TIMEOUT_SECS)
    }
}

/// Local tunnel identity configuration (`tunnel.*`).
///
/// These are the WireGuard parameters this node offers in tunnel
/// negotiations; generate the keypair with `weft genkeys --tunnel`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Local WireGuard public key, advertised to peers (`public_key`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Local WireGuard private key (`private_key`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// Endpoint peers should connect to, advertised to peers (`endpoint`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Local WireGuard listen port (`listen_port`). Defaults to 51820.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,

    /// Virtual interface name (`interface_name`). Defaults to "weft0".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
}

impl TunnelConfig {
    /// Get the listen port, using the default if not configured.
    pub fn listen_port(&self) -> u16 {
        self.listen_port.unwrap_or(DEFAULT_TUNNEL_LISTEN_PORT)
    }

    /// Get the virtual interface name, using the default if not configured.
    pub fn interface_name(&self) -> &str {
        self.interface_name.as_deref().unwrap_or(DEFAULT_TUNNEL_INTERFACE)
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Node configuration (`node.*`).
    #[serde(default)]
    pub node: NodeConfig,

    /// Tunnel identity configuration (`tunnel.*`).
    #[serde(default)]
    pub tunnel: TunnelConfig,
}

impl Config {
    /// Create a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the standard search paths.
    ///
    /// Returns a tuple of (config, paths_loaded) where paths_loaded
    /// contains the paths that were successfully loaded.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let search_paths = Self::search_paths();
        Self::load_from_paths(&search_paths)
    }

    /// Load configuration from specific paths.
    ///
    /// Paths are processed in order, with later paths overriding earlier
    /// ones.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = Config::default();
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                let file_config = Self::load_file(path)?;
                config.merge(file_config);
                loaded_paths.push(path.clone());
            }
        }

        Ok((config, loaded_paths))
    }

    /// Load configuration from a single file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the standard search paths in priority order (lowest to highest).
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System config (lowest priority)
        paths.push(PathBuf::from("/etc/weft").join(CONFIG_FILENAME));

        // User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("weft").join(CONFIG_FILENAME));
        }

        // Current directory (highest priority)
        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));

        paths
    }

    /// Merge another configuration into this one.
    ///
    /// Values from `other` override values in `self` when present.
    pub fn merge(&mut self, other: Config) {
        if other.node.interface.is_some() {
            self.node.interface = other.node.interface;
        }
        if other.node.public_key_file.is_some() {
            self.node.public_key_file = other.node.public_key_file;
        }
        if other.node.private_key_file.is_some() {
            self.node.private_key_file = other.node.private_key_file;
        }
        if other.node.control.bind_addr.is_some() {
            self.node.control.bind_addr = other.node.control.bind_addr;
        }
        if other.node.control.multicast_port.is_some() {
            self.node.control.multicast_port = other.node.control.multicast_port;
        }
        if !other.node.control.addresses.is_empty() {
            self.node.control.addresses = other.node.control.addresses;
        }
        if other.node.negotiation_timeout_secs.is_some() {
            self.node.negotiation_timeout_secs = other.node.negotiation_timeout_secs;
        }
        if other.tunnel.public_key.is_some() {
            self.tunnel.public_key = other.tunnel.public_key;
        }
        if other.tunnel.private_key.is_some() {
            self.tunnel.private_key = other.tunnel.private_key;
        }
        if other.tunnel.endpoint.is_some() {
            self.tunnel.endpoint = other.tunnel.endpoint;
        }
        if other.tunnel.listen_port.is_some() {
            self.tunnel.listen_port = other.tunnel.listen_port;
        }
        if other.tunnel.interface_name.is_some() {
            self.tunnel.interface_name = other.tunnel.interface_name;
        }
    }

    /// Load the node identity named by this configuration.
    ///
    /// Requires both key files; the advertised control addresses are
    /// attached to the identity.
    pub fn create_identity(&self) -> Result<Identity, ConfigError> {
        let (Some(public), Some(private)) = (
            self.node.public_key_file.as_ref(),
            self.node.private_key_file.as_ref(),
        ) else {
            return Err(ConfigError::MissingKeyFiles);
        };

        let mut identity = Identity::from_key_files(public, private)?;
        for (interface, addr) in &self.node.control.addresses {
            identity.set_control_address(interface, addr);
        }
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::encode_key;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_defaults() {
        let config = Config::new();
        assert_eq!(config.node.control.bind_addr(), "[::]:8481");
        assert_eq!(config.node.control.multicast_port(), 8481);
        assert_eq!(config.node.negotiation_timeout_secs(), 120);
        assert_eq!(config.tunnel.listen_port(), 51820);
        assert_eq!(config.tunnel.interface_name(), "weft0");
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
node:
  interface: eth0
  public_key_file: /etc/weft/key.pub
  private_key_file: /etc/weft/key
  control:
    bind_addr: "[::]:9000"
    multicast_port: 9000
    addresses:
      eth0: "[fe80::1%eth0]:9000"
  negotiation_timeout_secs: 30
tunnel:
  public_key: "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg="
  private_key: "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk="
  endpoint: "192.0.2.1:51820"
  listen_port: 51821
  interface_name: wg-mesh0
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.node.interface.as_deref(), Some("eth0"));
        assert_eq!(config.node.control.bind_addr(), "[::]:9000");
        assert_eq!(config.node.control.multicast_port(), 9000);
        assert_eq!(
            config.node.control.addresses.get("eth0").map(String::as_str),
            Some("[fe80::1%eth0]:9000")
        );
        assert_eq!(config.node.negotiation_timeout_secs(), 30);
        assert_eq!(config.tunnel.listen_port(), 51821);
        assert_eq!(config.tunnel.interface_name(), "wg-mesh0");
    }

    #[test]
    fn test_parse_yaml_empty() {
        let config: Config = serde_yaml::from_str("").unwrap();
        assert!(config.node.interface.is_none());
    }

    #[test]
    fn test_merge_overrides() {
        let mut base: Config = serde_yaml::from_str(
            r#"
node:
  interface: eth0
  negotiation_timeout_secs: 30
"#,
        )
        .unwrap();
        let over: Config = serde_yaml::from_str(
            r#"
node:
  interface: eth1
"#,
        )
        .unwrap();

        base.merge(over);
        assert_eq!(base.node.interface.as_deref(), Some("eth1"));
        // Untouched values survive the merge.
        assert_eq!(base.node.negotiation_timeout_secs(), 30);
    }

    #[test]
    fn test_load_from_paths_merges() {
        let temp_dir = TempDir::new().unwrap();
        let low = temp_dir.path().join("low.yaml");
        let high = temp_dir.path().join("high.yaml");

        fs::write(&low, "node:\n  interface: eth0\n").unwrap();
        fs::write(&high, "node:\n  interface: eth1\n").unwrap();

        let paths = vec![low.clone(), high.clone()];
        let (config, loaded) = Config::load_from_paths(&paths).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(config.node.interface.as_deref(), Some("eth1"));
    }

    #[test]
    fn test_load_skips_missing_files() {
        let temp_dir = TempDir::new().unwrap();
        let existing = temp_dir.path().join("weft.yaml");
        let missing = temp_dir.path().join("missing.yaml");

        fs::write(&existing, "node:\n  interface: eth0\n").unwrap();

        let paths = vec![missing, existing.clone()];
        let (config, loaded) = Config::load_from_paths(&paths).unwrap();

        assert_eq!(loaded, vec![existing]);
        assert_eq!(config.node.interface.as_deref(), Some("eth0"));
    }

    #[test]
    fn test_load_file_bad_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("weft.yaml");
        fs::write(&path, "node: [not, a, mapping\n").unwrap();

        assert!(matches!(
            Config::load_file(&path),
            Err(ConfigError::ParseYaml { .. })
        ));
    }

    #[test]
    fn test_create_identity_requires_key_files() {
        let config = Config::new();
        assert!(matches!(
            config.create_identity(),
            Err(ConfigError::MissingKeyFiles)
        ));
    }

    #[test]
    fn test_create_identity_from_files() {
        let temp_dir = TempDir::new().unwrap();
        let identity = Identity::generate();

        let pub_path = temp_dir.path().join("key.pub");
        let priv_path = temp_dir.path().join("key");
        fs::write(&pub_path, encode_key(identity.public_key().as_bytes())).unwrap();
        fs::write(&priv_path, encode_key(&identity.keypair_bytes())).unwrap();

        let mut config = Config::new();
        config.node.public_key_file = Some(pub_path);
        config.node.private_key_file = Some(priv_path);
        config
            .node
            .control
            .addresses
            .insert("eth0".to_string(), "[fe80::1%eth0]:8481".to_string());

        let loaded = config.create_identity().unwrap();
        assert_eq!(loaded.public_key(), identity.public_key());
        assert_eq!(loaded.control_address("eth0"), Some("[fe80::1%eth0]:8481"));
    }

    #[test]
    fn test_search_paths_includes_expected() {
        let paths = Config::search_paths();
        assert!(paths.iter().any(|p| p.ends_with("weft.yaml")));
        assert!(paths
            .iter()
            .any(|p| p.starts_with("/etc/weft") && p.ends_with("weft.yaml")));
    }
}
