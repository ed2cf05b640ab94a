//! Configuration structures.
//!
//! The whole surface is one JSON document, loaded once at startup and
//! static for the process lifetime. Sections that are absent fall back to
//! their defaults, so a minimal deployment only names its backend servers.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::balancer::DEFAULT_OCCUPANCY_THRESHOLD;
use crate::error::ProxyError;

/// Root configuration object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the game-protocol listener binds to.
    #[serde(default = "defaults::bind_address")]
    pub bind_address: String,

    /// Server-list description advertised through the protocol status query.
    #[serde(default = "defaults::motd")]
    pub motd: String,

    /// Advertised player capacity.
    #[serde(default = "defaults::max_players")]
    pub max_players: u32,

    /// Group newly accepted connections are routed into.
    #[serde(default = "defaults::default_group")]
    pub default_group: String,

    /// Backend topology: groups and their servers.
    #[serde(default)]
    pub groups: Vec<GroupSettings>,

    #[serde(default)]
    pub whitelist: WhitelistSettings,

    #[serde(default)]
    pub load_balancer: LoadBalancerSettings,

    #[serde(default)]
    pub web: WebSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// One named group of backend servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSettings {
    pub name: String,
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
}

/// One backend server inside a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub address: String,
}

/// Display-name allow list applied at the connection gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhitelistSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub players: Vec<String>,
}

impl WhitelistSettings {
    /// Whether `display_name` may join. Comparison ignores letter case;
    /// with the gate disabled everyone is admitted.
    pub fn permits(&self, display_name: &str) -> bool {
        !self.enabled
            || self
                .players
                .iter()
                .any(|p| p.eq_ignore_ascii_case(display_name))
    }
}

/// Load-balanced transfer handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerSettings {
    /// Server or group names whose transfers get rebalanced. Empty turns
    /// the feature off.
    #[serde(default)]
    pub targets: Vec<String>,

    /// Player count at which a server counts as highly occupied.
    #[serde(default = "defaults::occupancy_threshold")]
    pub occupancy_threshold: u32,
}

impl Default for LoadBalancerSettings {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            occupancy_threshold: DEFAULT_OCCUPANCY_THRESHOLD,
        }
    }
}

/// Status endpoint and peer federation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSettings {
    /// Listen port for the status endpoint, in the `":<port>"` form. A
    /// full `host:port` address is accepted as well.
    #[serde(default = "defaults::web_port")]
    pub port: String,

    /// Status URLs of the other proxy instances in the federation.
    #[serde(default)]
    pub other_servers: Vec<String>,

    /// Seconds between aggregation cycles.
    #[serde(default = "defaults::poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Per-peer request timeout in seconds.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            port: defaults::web_port(),
            other_servers: Vec::new(),
            poll_interval_secs: defaults::poll_interval_secs(),
            request_timeout_secs: defaults::request_timeout_secs(),
        }
    }
}

impl WebSettings {
    /// Resolves the `":<port>"` shorthand to an all-interfaces address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ProxyError> {
        let addr = if self.port.starts_with(':') {
            format!("0.0.0.0{}", self.port)
        } else {
            self.port.clone()
        };
        addr.parse()
            .map_err(|e| ProxyError::Config(format!("invalid web port {:?}: {e}", self.port)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Level filter: "trace", "debug", "info", "warn" or "error".
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Structured JSON output instead of the human-readable format.
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            json_format: false,
        }
    }
}

impl Config {
    pub fn bind_addr(&self) -> Result<SocketAddr, ProxyError> {
        self.bind_address
            .parse()
            .map_err(|e| ProxyError::Config(format!("invalid bind address {:?}: {e}", self.bind_address)))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: defaults::bind_address(),
            motd: defaults::motd(),
            max_players: defaults::max_players(),
            default_group: defaults::default_group(),
            groups: vec![GroupSettings {
                name: defaults::default_group(),
                servers: vec![ServerEntry {
                    name: "lobby-1".to_string(),
                    address: "127.0.0.1:20001".to_string(),
                }],
            }],
            whitelist: WhitelistSettings::default(),
            load_balancer: LoadBalancerSettings::default(),
            web: WebSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

mod defaults {
    use crate::balancer::DEFAULT_OCCUPANCY_THRESHOLD;

    pub fn bind_address() -> String {
        "0.0.0.0:19132".to_string()
    }

    pub fn motd() -> String {
        "Waypoint Proxy".to_string()
    }

    pub fn max_players() -> u32 {
        100
    }

    pub fn default_group() -> String {
        "lobby".to_string()
    }

    pub fn occupancy_threshold() -> u32 {
        DEFAULT_OCCUPANCY_THRESHOLD
    }

    pub fn web_port() -> String {
        ":8080".to_string()
    }

    pub fn poll_interval_secs() -> u64 {
        30
    }

    pub fn request_timeout_secs() -> u64 {
        3
    }

    pub fn log_level() -> String {
        "info".to_string()
    }
}
