//! The managed routes of an mc-router instance.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::codec::RouterCodec;
use super::RouterClient;
use crate::error::ManagerError;
use crate::state::Servers;

/// Reads and writes the routing table through a [`RouterClient`].
pub struct ManagedRouter {
    client: Arc<dyn RouterClient>,
    codec: RouterCodec,
}

impl ManagedRouter {
    /// Manage routes under `managed_sub_domain` of `domain`.
    pub fn new(client: Arc<dyn RouterClient>, managed_sub_domain: &str, domain: &str) -> Self {
        Self {
            client,
            codec: RouterCodec::new(managed_sub_domain, domain),
        }
    }

    /// Address names and servers currently routed.
    pub async fn pull(&self) -> Result<(BTreeSet<String>, Servers), ManagerError> {
        let routes = self.client.get_routes().await?;
        debug!(routes = routes.len(), "pulled router routes");
        Ok(self.codec.decode(&routes))
    }

    /// Replace the routing table with routes for `address_names` x `servers`.
    pub async fn push<'a, I>(&self, address_names: I, servers: &Servers) -> Result<(), ManagerError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let routes = self.codec.encode(address_names, servers);
        info!(routes = ?routes, "overriding router routes");
        self.client.override_routes(&routes).await
    }
}
