//! On-disk configuration for the `mdht` binary
//!
//! Configuration is plain TOML, loaded once at startup and validated before
//! any socket is bound.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default well-known bootstrap nodes for the Mainline DHT
pub const DEFAULT_BOOTSTRAP_NODES: &[&str] = &[
    "router.bittorrent.com:6881",
    "dht.transmissionbt.com:6881",
    "router.utorrent.com:6881",
    "dht.aelitis.com:6881",
];

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:6881".parse().expect("valid default listen address")
}

fn default_bootstrap_nodes() -> Vec<String> {
    DEFAULT_BOOTSTRAP_NODES.iter().map(|s| (*s).to_string()).collect()
}

const fn default_bucket_refresh_secs() -> u64 {
    60
}

const fn default_announce_interval_secs() -> u64 {
    15 * 60
}

/// The node's persisted configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local address to bind the UDP socket on
    pub listen_addr: SocketAddr,

    /// Hex-encoded 20-byte node id; a random one is generated if absent
    pub node_id: Option<String>,

    /// `host:port` bootstrap endpoints contacted on startup
    pub bootstrap_nodes: Vec<String>,

    /// Interval between bucket-refresh sweeps
    pub bucket_refresh_secs: u64,

    /// Interval between re-announcing tracked info-hashes
    pub announce_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            node_id: None,
            bootstrap_nodes: default_bootstrap_nodes(),
            bucket_refresh_secs: default_bucket_refresh_secs(),
            announce_interval_secs: default_announce_interval_secs(),
        }
    }
}

impl Config {
    /// The conventional config path under the user's config directory
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mdht")
            .join("config.toml")
    }

    /// Load and parse configuration from `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse as
    /// valid TOML matching this schema.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config at {}: {e}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing config at {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from the default path, or fall back to defaults
    /// if no file exists there yet
    ///
    /// # Errors
    ///
    /// Returns an error if the default path exists but fails to parse.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject configurations that cannot produce a running node
    ///
    /// # Errors
    ///
    /// Returns an error if the listen port is `0` and no node id is set, or
    /// if there are no bootstrap nodes and no node id (meaning the table
    /// can never be seeded from a prior run).
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bootstrap_nodes.is_empty() && self.node_id.is_none() {
            anyhow::bail!(
                "no bootstrap nodes configured and no fixed node_id set; this node could never discover the network"
            );
        }
        Ok(())
    }
}
