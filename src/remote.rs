//! Observed state, read from and written to the router and DNS together.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::dns::{DnsProvider, ManagedDns};
use crate::error::ManagerError;
use crate::metrics::{self, InconsistencyReason};
use crate::router::{ManagedRouter, RouterClient};
use crate::state::ManagedState;

/// The router and the DNS zone, viewed as one system.
pub struct Remote {
    dns: ManagedDns,
    router: ManagedRouter,
}

impl Remote {
    /// Manage `managed_sub_domain` of the provider's zone on both systems.
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        router: Arc<dyn RouterClient>,
        managed_sub_domain: &str,
        dns_ttl: u32,
    ) -> Self {
        let router = ManagedRouter::new(router, managed_sub_domain, provider.domain());
        let dns = ManagedDns::new(provider, managed_sub_domain, dns_ttl);
        Self { dns, router }
    }

    /// Read both systems.
    ///
    /// `None` means the two systems do not describe one consistent state
    /// right now. Callers must treat it as "differs from anything".
    pub async fn pull(&self) -> Result<Option<ManagedState>, ManagerError> {
        let ((router_addresses, servers), dns) = tokio::try_join!(self.router.pull(), self.dns.pull())?;

        let Some(dns) = dns else {
            info!("DNS records are inconsistent");
            metrics::record_inconsistent(InconsistencyReason::DnsRecords);
            return Ok(None);
        };

        if !router_addresses.iter().eq(dns.addresses.keys()) {
            info!(
                router = ?router_addresses,
                dns = ?dns.addresses.keys().collect::<Vec<_>>(),
                "router and DNS disagree on address names"
            );
            metrics::record_inconsistent(InconsistencyReason::AddressNames);
            return Ok(None);
        }

        if !servers.keys().eq(dns.server_names.iter()) {
            info!(
                router = ?servers.keys().collect::<Vec<_>>(),
                dns = ?dns.server_names,
                "router and DNS disagree on server names"
            );
            metrics::record_inconsistent(InconsistencyReason::ServerNames);
            return Ok(None);
        }

        Ok(Some(ManagedState::new(dns.addresses, servers)))
    }

    /// Write `state` to both systems. Fails if either write fails.
    pub async fn push(&self, state: &ManagedState) -> Result<(), ManagerError> {
        let server_names: BTreeSet<String> = state.servers.keys().cloned().collect();
        tokio::try_join!(
            self.router.push(state.addresses.keys(), &state.servers),
            self.dns.push(&state.addresses, &server_names),
        )?;
        Ok(())
    }
}
