//! Managed state exchanged between the local collectors, the codecs and the
//! remote systems.
//!
//! A [`ManagedState`] is the pair of externally reachable [`Addresses`] and
//! live [`Servers`]. It is rebuilt from scratch on every pull and never
//! mutated after construction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Reserved address name for the primary address. It is omitted from hostnames.
pub const PRIMARY_ADDRESS: &str = "*";

/// Port the router falls back to when a backend carries no explicit port.
pub const DEFAULT_GAME_PORT: u16 = 25565;

/// DNS record kind used to publish an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressKind {
    /// IPv4 address.
    A,
    /// IPv6 address.
    #[serde(rename = "AAAA")]
    Aaaa,
    /// Canonical name.
    #[serde(rename = "CNAME")]
    Cname,
}

impl AddressKind {
    /// Record type string as used by DNS providers.
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressKind::A => "A",
            AddressKind::Aaaa => "AAAA",
            AddressKind::Cname => "CNAME",
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(AddressKind::A),
            "AAAA" => Ok(AddressKind::Aaaa),
            "CNAME" => Ok(AddressKind::Cname),
            other => Err(format!("not an address record type: {other}")),
        }
    }
}

/// One externally reachable endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressInfo {
    /// Record kind used to publish `host`.
    pub kind: AddressKind,
    /// IP address or hostname.
    pub host: String,
    /// External port advertised through SRV.
    pub port: u16,
}

impl AddressInfo {
    /// Convenience constructor.
    pub fn new(kind: AddressKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
        }
    }
}

/// address name -> endpoint
pub type Addresses = BTreeMap<String, AddressInfo>;

/// server name -> internal game port
pub type Servers = BTreeMap<String, u16>;

/// The unit exchanged between Local, Remote and the codecs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedState {
    /// Externally reachable addresses keyed by address name.
    pub addresses: Addresses,
    /// Live servers keyed by server name.
    pub servers: Servers,
}

impl ManagedState {
    /// Build a state from its two halves.
    pub fn new(addresses: Addresses, servers: Servers) -> Self {
        Self { addresses, servers }
    }
}

impl fmt::Display for ManagedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addresses: Vec<String> = self
            .addresses
            .iter()
            .map(|(name, info)| format!("{name}={} {}:{}", info.kind, info.host, info.port))
            .collect();
        let servers: Vec<String> = self
            .servers
            .iter()
            .map(|(name, port)| format!("{name}:{port}"))
            .collect();
        write!(
            f,
            "addresses [{}] servers [{}]",
            addresses.join(", "),
            servers.join(", ")
        )
    }
}

/// Sub-domain (relative to the zone) under which an address publishes its records.
///
/// `*` maps to the managed sub-domain itself, any other name to
/// `{name}.{managed_sub_domain}`.
pub fn sub_domain_base(address_name: &str, managed_sub_domain: &str) -> String {
    if address_name == PRIMARY_ADDRESS {
        managed_sub_domain.to_string()
    } else {
        format!("{address_name}.{managed_sub_domain}")
    }
}
