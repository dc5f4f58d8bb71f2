//! mc-router-dns-manager - keeps an mc-router routing table and a DNS zone in
//! sync with the game servers that are actually running.
//!
//! Every server is published under every configured address: a wildcard
//! A/AAAA/CNAME record per address, one `_minecraft._tcp` SRV record per
//! (server, address) pair, and one router route per pair pointing at the
//! server's local port. The service owns one sub-domain of the zone
//! (`mc.example.com` by default) and rewrites it whenever what it reads back
//! from the router and DNS differs from what the local collaborators report.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                      mc-router-dns-manager                        │
//! │                                                                   │
//! │  docker-watcher ──┐                      ┌──▶ mc-router (routes)  │
//! │  natmap-monitor ──┼─▶ Local ─┐  ┌─ Remote┤                        │
//! │  manual config  ──┘          ▼  ▼        └──▶ DNS provider (zone) │
//! │                            Monitorer                              │
//! │                     (poll / drain / feeds)                        │
//! │  watcher + natmap WebSockets ──▶ PendingEvents                    │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Records
//!
//! ```text
//! addresses = { "*": A 1.1.1.1:25565 }, servers = { vanilla: 25565 }
//!   → *.mc                         A    1.1.1.1
//!   → _minecraft._tcp.vanilla.mc   SRV  0 5 25565 vanilla.mc.example.com
//!   → vanilla.mc.example.com       -> localhost:25565   (router)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mc_router_dns_manager::{Config, Local, Monitorer, Remote};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = Config::load("mrdm.toml".as_ref())?;
//! let monitor = Arc::new(Monitorer::new(local, remote, feeds, config.monitor));
//! monitor.run(CancellationToken::new()).await;
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod dns;
pub mod error;
pub mod local;
pub mod metrics;
pub mod monitor;
pub mod remote;
pub mod router;
pub mod sources;
pub mod state;
pub mod telemetry;

// Re-export main types
pub use config::{AddressConfig, Config, DnsProviderConfig, MonitorConfig, TelemetryConfig};
pub use dns::{DnsProvider, ManagedDns};
pub use error::ManagerError;
pub use local::Local;
pub use monitor::{Backoff, Monitorer};
pub use remote::Remote;
pub use router::{ManagedRouter, RouterClient};
pub use sources::{AddressSource, ChangeFeed, PendingEvents, ServerSource};
pub use state::{AddressInfo, AddressKind, Addresses, ManagedState, Servers};
