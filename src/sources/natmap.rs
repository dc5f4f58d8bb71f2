//! natmap-monitor client: NAT-mapped addresses and their change feed.
//!
//! The monitor publishes every mapping it knows about as
//! `{"tcp:{internal_port}": {"ip": ..., "port": ...}}`. Only the internal
//! ports configured as NAT-mapped addresses are of interest.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    listen_websocket, websocket_url, AddressSource, ChangeFeed, PendingEvents, REQUEST_TIMEOUT,
};
use crate::error::ManagerError;
use crate::router::client::{ensure_success, parse_base_url};
use crate::state::{AddressInfo, AddressKind, Addresses};

/// One public mapping of an internal port.
#[derive(Debug, Clone, Deserialize)]
pub struct Mapping {
    /// Public IPv4 address.
    pub ip: String,
    /// Public port.
    pub port: u16,
}

/// Client for a natmap-monitor instance.
#[derive(Clone)]
pub struct NatmapClient {
    http: reqwest::Client,
    base_url: Url,
    ws_url: Url,
    /// address name -> internal port
    internal_ports: BTreeMap<String, u16>,
}

fn mapping_key(internal_port: u16) -> String {
    format!("tcp:{internal_port}")
}

impl NatmapClient {
    /// Create a client providing `internal_ports` (address name -> internal port).
    pub fn new(base_url: &str, internal_ports: BTreeMap<String, u16>) -> Result<Self, ManagerError> {
        let base_url = parse_base_url(base_url)?;
        let ws_url = websocket_url(&base_url)?;
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url,
            ws_url,
            internal_ports,
        })
    }

    /// Every mapping the monitor currently knows.
    pub async fn get_all_mappings(&self) -> Result<HashMap<String, Mapping>, ManagerError> {
        let url = self
            .base_url
            .join("all_mappings")
            .map_err(|e| ManagerError::Config(e.to_string()))?;
        let response = self.http.get(url.clone()).send().await?;
        ensure_success(&url, response.status())?;
        Ok(response.json().await?)
    }

    /// Pick the configured addresses out of a mapping table.
    pub fn filter_addresses(&self, mappings: &HashMap<String, Mapping>) -> Addresses {
        let mut addresses = Addresses::new();
        for (name, internal_port) in &self.internal_ports {
            match mappings.get(&mapping_key(*internal_port)) {
                Some(mapping) => {
                    addresses.insert(
                        name.clone(),
                        AddressInfo::new(AddressKind::A, mapping.ip.clone(), mapping.port),
                    );
                }
                None => warn!(address = %name, internal_port, "no natmap mapping for port"),
            }
        }
        addresses
    }

    /// Whether a feed message mentions any configured internal port.
    pub fn is_relevant_message(&self, text: &str) -> bool {
        let message: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "ignoring non-object natmap message");
                return false;
            }
        };
        self.internal_ports
            .values()
            .any(|port| message.contains_key(&mapping_key(*port)))
    }
}

#[async_trait]
impl AddressSource for NatmapClient {
    async fn get_addresses(&self) -> Result<Addresses, ManagerError> {
        let mappings = self.get_all_mappings().await?;
        Ok(self.filter_addresses(&mappings))
    }
}

#[async_trait]
impl ChangeFeed for NatmapClient {
    fn name(&self) -> &'static str {
        "natmap"
    }

    async fn listen(&self, events: PendingEvents, cancel: CancellationToken) {
        listen_websocket(self.name(), &self.ws_url, &events, &cancel, |text| {
            self.is_relevant_message(text)
        })
        .await;
    }
}
