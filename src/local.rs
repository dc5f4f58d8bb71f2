//! Desired state, collected from the local collaborators.

use std::sync::Arc;
use tracing::debug;

use crate::error::ManagerError;
use crate::sources::{AddressSource, ServerSource};
use crate::state::{Addresses, ManagedState};

/// Merges NAT-mapped addresses, manual addresses and live servers.
pub struct Local {
    servers: Arc<dyn ServerSource>,
    natmap: Option<Arc<dyn AddressSource>>,
    manual: Addresses,
}

impl Local {
    /// `natmap` is `None` when the natmap monitor is disabled.
    pub fn new(
        servers: Arc<dyn ServerSource>,
        natmap: Option<Arc<dyn AddressSource>>,
        manual: Addresses,
    ) -> Self {
        Self {
            servers,
            natmap,
            manual,
        }
    }

    async fn addresses(&self) -> Result<Addresses, ManagerError> {
        let mut addresses = match &self.natmap {
            Some(source) => source.get_addresses().await?,
            None => Addresses::new(),
        };
        // Manual definitions win over NAT-mapped ones of the same name.
        addresses.extend(self.manual.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(addresses)
    }

    /// Build the desired state.
    pub async fn pull(&self) -> Result<ManagedState, ManagerError> {
        let (addresses, servers) = tokio::try_join!(self.addresses(), self.servers.get_servers())?;
        let state = ManagedState::new(addresses, servers);
        debug!(desired = %state, "pulled local state");
        Ok(state)
    }
}
