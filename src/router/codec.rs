//! Encoding of a managed state into router routes and back.
//!
//! Every server is routed under every address:
//!
//! ```text
//! vanilla.mc.example.com         -> localhost:25565
//! vanilla.backup.mc.example.com  -> localhost:25565
//! ```
//!
//! The router always dispatches to a local port. External ports only live in DNS.

use std::collections::BTreeSet;
use tracing::debug;

use super::Routes;
use crate::state::{sub_domain_base, Servers, DEFAULT_GAME_PORT, PRIMARY_ADDRESS};

const BACKEND_HOST: &str = "localhost";

/// Encodes and decodes managed state for the router.
#[derive(Debug, Clone)]
pub struct RouterCodec {
    managed_sub_domain: String,
    domain: String,
}

impl RouterCodec {
    /// Create a codec for `managed_sub_domain` inside `domain`.
    pub fn new(managed_sub_domain: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            managed_sub_domain: managed_sub_domain.into(),
            domain: domain.into(),
        }
    }

    /// Encode every `(server, address)` pair into one route.
    pub fn encode<'a, I>(&self, address_names: I, servers: &Servers) -> Routes
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut routes = Routes::new();
        for address_name in address_names {
            let base = sub_domain_base(address_name, &self.managed_sub_domain);
            for (server_name, port) in servers {
                routes.insert(
                    format!("{server_name}.{base}.{}", self.domain),
                    format!("{BACKEND_HOST}:{port}"),
                );
            }
        }
        routes
    }

    /// Recover the address names and servers a routing table describes.
    ///
    /// Routes outside the managed sub-domain are ignored.
    pub fn decode(&self, routes: &Routes) -> (BTreeSet<String>, Servers) {
        let suffix = format!(".{}.{}", self.managed_sub_domain, self.domain);
        let mut address_names = BTreeSet::new();
        let mut servers = Servers::new();

        for (fqdn, backend) in routes {
            let Some(host) = fqdn.strip_suffix(&suffix) else {
                debug!(route = %fqdn, "ignoring route outside managed sub-domain");
                continue;
            };
            let mut labels = host.split('.');
            let server_name = labels.next().unwrap_or_default();
            if server_name.is_empty() {
                continue;
            }
            let address_name = labels.next().unwrap_or(PRIMARY_ADDRESS);

            address_names.insert(address_name.to_string());
            servers
                .entry(server_name.to_string())
                .or_insert_with(|| backend_port(backend));
        }

        (address_names, servers)
    }
}

/// Port of a `host[:port]` backend, defaulting to the standard game port.
fn backend_port(backend: &str) -> u16 {
    match backend.rsplit_once(':') {
        Some((_, port)) => port.parse().unwrap_or_else(|_| {
            debug!(backend, "unparseable backend port, using default");
            DEFAULT_GAME_PORT
        }),
        None => DEFAULT_GAME_PORT,
    }
}
