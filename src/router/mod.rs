//! Router side of the reconciliation: the mc-router client seam, the route
//! codec and the managed-router wrapper.

pub mod client;
pub mod codec;
pub mod managed;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::ManagerError;

pub use client::McRouterClient;
pub use codec::RouterCodec;
pub use managed::ManagedRouter;

/// Flat routing table: fqdn -> `host:port` backend.
pub type Routes = BTreeMap<String, String>;

/// Access to the router's routing table.
#[async_trait]
pub trait RouterClient: Send + Sync {
    /// Current routing table.
    async fn get_routes(&self) -> Result<Routes, ManagerError>;

    /// Replace the whole routing table with `routes`.
    async fn override_routes(&self, routes: &Routes) -> Result<(), ManagerError>;
}
