//! The managed sub-domain of one DNS provider zone.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::codec::{DnsCodec, DnsDecode, ObservedDnsState};
use super::diff::{diff_records, RecordDiff};
use super::{DnsProvider, ObservedRecord};
use crate::error::ManagerError;
use crate::metrics;
use crate::state::Addresses;

/// Reads and writes the managed records of a zone through a [`DnsProvider`].
pub struct ManagedDns {
    provider: Arc<dyn DnsProvider>,
    codec: DnsCodec,
    /// At most one push in flight.
    update_lock: Mutex<()>,
}

impl ManagedDns {
    /// Manage `managed_sub_domain` of the provider's zone with records of `ttl`.
    pub fn new(provider: Arc<dyn DnsProvider>, managed_sub_domain: &str, ttl: u32) -> Self {
        let codec = DnsCodec::new(managed_sub_domain, provider.domain(), ttl);
        Self {
            provider,
            codec,
            update_lock: Mutex::new(()),
        }
    }

    async fn ensure_initialized(&self) -> Result<(), ManagerError> {
        if !self.provider.is_initialized() {
            info!(domain = %self.provider.domain(), "initializing DNS provider");
            self.provider.init().await?;
        }
        Ok(())
    }

    async fn relevant_records(&self) -> Result<Vec<ObservedRecord>, ManagerError> {
        let records = self.provider.list_records().await?;
        Ok(self.codec.relevant_records(&records))
    }

    /// Read the managed records back. `None` means the zone is half-updated.
    pub async fn pull(&self) -> Result<Option<ObservedDnsState>, ManagerError> {
        self.ensure_initialized().await?;
        let records = self.provider.list_records().await?;
        match self.codec.decode(&records) {
            DnsDecode::Consistent(state) => Ok(Some(state)),
            DnsDecode::Inconsistent => Ok(None),
        }
    }

    /// Converge the managed records onto `addresses` x `server_names`.
    pub async fn push(
        &self,
        addresses: &Addresses,
        server_names: &BTreeSet<String>,
    ) -> Result<(), ManagerError> {
        self.ensure_initialized().await?;
        let target = self.codec.encode(addresses, server_names);
        if target.is_empty() {
            info!("no addresses or no servers, vacating managed sub-domain");
        }

        let _guard = self.update_lock.lock().await;

        let current = self.relevant_records().await?;
        let diff = diff_records(&current, &target);
        if diff.is_empty() {
            debug!("DNS records already up to date");
            return Ok(());
        }

        if self.provider.has_update_capability() {
            self.apply_concurrently(diff).await
        } else {
            self.apply_sequentially(diff.into_recreate()).await
        }
    }

    /// Add, remove and update touch disjoint record ids.
    async fn apply_concurrently(&self, diff: RecordDiff) -> Result<(), ManagerError> {
        let add = async {
            if !diff.to_add.is_empty() {
                info!(records = ?diff.to_add, "adding records");
                self.provider.add_records(&diff.to_add).await?;
                metrics::record_dns_changes(metrics::DnsChange::Add, diff.to_add.len());
            }
            Ok::<_, ManagerError>(())
        };
        let remove = async {
            if !diff.to_remove.is_empty() {
                info!(record_ids = ?diff.to_remove, "removing records");
                self.provider.remove_records(&diff.to_remove).await?;
                metrics::record_dns_changes(metrics::DnsChange::Remove, diff.to_remove.len());
            }
            Ok::<_, ManagerError>(())
        };
        let update = async {
            if !diff.to_update.is_empty() {
                info!(records = ?diff.to_update, "updating records");
                self.provider.update_records(&diff.to_update).await?;
                metrics::record_dns_changes(metrics::DnsChange::Update, diff.to_update.len());
            }
            Ok::<_, ManagerError>(())
        };

        tokio::try_join!(add, remove, update)?;
        Ok(())
    }

    /// Removals strictly before additions.
    async fn apply_sequentially(&self, diff: RecordDiff) -> Result<(), ManagerError> {
        if !diff.to_remove.is_empty() {
            info!(record_ids = ?diff.to_remove, "removing records");
            self.provider.remove_records(&diff.to_remove).await?;
            metrics::record_dns_changes(metrics::DnsChange::Remove, diff.to_remove.len());
        }
        if !diff.to_add.is_empty() {
            info!(records = ?diff.to_add, "adding records");
            self.provider.add_records(&diff.to_add).await?;
            metrics::record_dns_changes(metrics::DnsChange::Add, diff.to_add.len());
        }
        Ok(())
    }
}
