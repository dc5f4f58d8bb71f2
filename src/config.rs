//! Configuration types for mc-router-dns-manager.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::ManagerError;
use crate::state::{AddressInfo, AddressKind, Addresses, DEFAULT_GAME_PORT};

/// Prefix of environment variable overrides, e.g. `MRDM__DNS__DOMAIN`.
pub const ENV_PREFIX: &str = "MRDM";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sub-domain of the zone owned by this service (e.g. "mc").
    #[serde(default = "default_managed_sub_domain")]
    pub managed_sub_domain: String,

    /// TTL for every managed DNS record in seconds.
    #[serde(default = "default_dns_ttl")]
    pub dns_ttl: u32,

    /// DNS provider selection and credentials.
    pub dns: DnsProviderConfig,

    /// mc-router API.
    pub router: RouterConfig,

    /// docker-watcher API.
    pub docker_watcher: DockerWatcherConfig,

    /// natmap-monitor API.
    #[serde(default)]
    pub natmap_monitor: NatmapMonitorConfig,

    /// Address definitions keyed by address name ("*" is the primary address).
    #[serde(default)]
    pub addresses: BTreeMap<String, AddressConfig>,

    /// Control loop timing.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS provider, selected by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DnsProviderConfig {
    /// DNSPod (Tencent Cloud).
    Dnspod(DnsPodConfig),
    /// Huawei Cloud DNS.
    Huawei(HuaweiConfig),
}

impl DnsProviderConfig {
    /// Zone apex managed through this provider.
    pub fn domain(&self) -> &str {
        match self {
            DnsProviderConfig::Dnspod(c) => &c.domain,
            DnsProviderConfig::Huawei(c) => &c.domain,
        }
    }
}

/// DNSPod credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsPodConfig {
    /// Zone apex (e.g. "example.com").
    pub domain: String,
    /// Tencent Cloud SecretId.
    pub secret_id: String,
    /// Tencent Cloud SecretKey.
    pub secret_key: String,
    /// API endpoint override.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Huawei Cloud DNS credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuaweiConfig {
    /// Zone apex (e.g. "example.com").
    pub domain: String,
    /// Access key.
    pub ak: String,
    /// Secret key.
    pub sk: String,
    /// Region, defaults to cn-south-1.
    #[serde(default)]
    pub region: Option<String>,
    /// API endpoint override.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// mc-router API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Base URL of the management API.
    pub base_url: String,
}

/// docker-watcher API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerWatcherConfig {
    /// Base URL of the watcher.
    pub base_url: String,
}

/// natmap-monitor API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatmapMonitorConfig {
    /// Whether NAT-mapped addresses are in use.
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of the monitor.
    #[serde(default = "default_natmap_base_url")]
    pub base_url: String,
}

impl Default for NatmapMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_natmap_base_url(),
        }
    }
}

/// One address definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AddressConfig {
    /// Fixed address.
    Manual {
        /// A, AAAA or CNAME.
        record_type: AddressKind,
        /// IP address or hostname.
        value: String,
        /// External port.
        #[serde(default = "default_game_port")]
        port: u16,
    },
    /// Address published by natmap-monitor for an internal port.
    Natmap {
        /// Internal port the mapping is looked up by.
        internal_port: u16,
    },
}

/// Control loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between polling reconciliations.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds to wait after a push before the next attempt may run.
    #[serde(default = "default_propagation_grace_secs")]
    pub propagation_grace_secs: u64,

    /// Milliseconds between pending-event checks.
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,

    /// First backoff delay after a failure, in milliseconds.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Backoff multiplier per consecutive failure.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Backoff cap in seconds.
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

impl MonitorConfig {
    /// Interval of the polling loop.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Sleep held after a push.
    pub fn propagation_grace(&self) -> Duration {
        Duration::from_secs(self.propagation_grace_secs)
    }

    /// Interval of the drain loop.
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// First backoff delay.
    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    /// Backoff cap.
    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            propagation_grace_secs: default_propagation_grace_secs(),
            drain_interval_ms: default_drain_interval_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_factor: default_backoff_factor(),
            backoff_max_secs: default_backoff_max_secs(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "mc_router_dns_manager=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

fn default_managed_sub_domain() -> String {
    "mc".to_string()
}

fn default_dns_ttl() -> u32 {
    600
}

fn default_natmap_base_url() -> String {
    "http://localhost:6062".to_string()
}

fn default_game_port() -> u16 {
    DEFAULT_GAME_PORT
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_propagation_grace_secs() -> u64 {
    60
}

fn default_drain_interval_ms() -> u64 {
    1000
}

fn default_backoff_initial_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    1.5
}

fn default_backoff_max_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load `path`, apply `MRDM__*` environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ManagerError> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without environment overrides.
    pub fn from_toml(source: &str) -> Result<Self, ManagerError> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the reconciliation cannot represent.
    pub fn validate(&self) -> Result<(), ManagerError> {
        let invalid = |msg: String| Err(ManagerError::Config(msg));

        if self.managed_sub_domain.is_empty() {
            return invalid("managed_sub_domain must not be empty".into());
        }
        if self.dns.domain().is_empty() {
            return invalid("dns.domain must not be empty".into());
        }
        if self.dns_ttl == 0 {
            return invalid("dns_ttl must be positive".into());
        }
        for (name, address) in &self.addresses {
            if name.is_empty() || name.contains('.') {
                return invalid(format!("address name {name:?} must be a single non-empty label"));
            }
            if matches!(address, AddressConfig::Natmap { .. }) && !self.natmap_monitor.enabled {
                return invalid(format!(
                    "address {name:?} is natmap but natmap_monitor is not enabled"
                ));
            }
        }
        if self.monitor.poll_interval_secs == 0 {
            return invalid("monitor.poll_interval_secs must be positive".into());
        }
        if self.monitor.backoff_factor.is_nan() || self.monitor.backoff_factor < 1.0 {
            return invalid("monitor.backoff_factor must be at least 1".into());
        }
        Ok(())
    }

    /// Statically configured addresses.
    pub fn manual_addresses(&self) -> Addresses {
        self.addresses
            .iter()
            .filter_map(|(name, address)| match address {
                AddressConfig::Manual {
                    record_type,
                    value,
                    port,
                } => Some((name.clone(), AddressInfo::new(*record_type, value.clone(), *port))),
                AddressConfig::Natmap { .. } => None,
            })
            .collect()
    }

    /// Address name -> internal port of the NAT-mapped addresses.
    pub fn natmap_ports(&self) -> BTreeMap<String, u16> {
        self.addresses
            .iter()
            .filter_map(|(name, address)| match address {
                AddressConfig::Natmap { internal_port } => Some((name.clone(), *internal_port)),
                AddressConfig::Manual { .. } => None,
            })
            .collect()
    }
}
