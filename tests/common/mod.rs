//! Shared test infrastructure: in-memory collaborators for the reconciler
//! and the control loop.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mc_router_dns_manager::config::MonitorConfig;
use mc_router_dns_manager::dns::{DesiredRecord, DnsProvider, ObservedRecord, RecordId};
use mc_router_dns_manager::router::{RouterClient, Routes};
use mc_router_dns_manager::sources::{AddressSource, ChangeFeed, PendingEvents, ServerSource};
use mc_router_dns_manager::state::{AddressInfo, AddressKind, Addresses, ManagedState, Servers};
use mc_router_dns_manager::{Local, ManagerError, Remote};

// --- Constants ---

pub const DOMAIN: &str = "example.com";
pub const MANAGED: &str = "mc";
pub const TTL: u32 = 600;

// --- State builders ---

pub fn addresses(items: &[(&str, AddressKind, &str, u16)]) -> Addresses {
    items
        .iter()
        .map(|(name, kind, host, port)| (name.to_string(), AddressInfo::new(*kind, *host, *port)))
        .collect()
}

pub fn servers(items: &[(&str, u16)]) -> Servers {
    items.iter().map(|(name, port)| (name.to_string(), *port)).collect()
}

/// `*` -> A 1.1.1.1:25565, vanilla on 25565.
pub fn simple_state() -> ManagedState {
    ManagedState::new(
        addresses(&[("*", AddressKind::A, "1.1.1.1", 25565)]),
        servers(&[("vanilla", 25565)]),
    )
}

pub fn record(id: &str, sub_domain: &str, record_type: &str, value: &str) -> ObservedRecord {
    ObservedRecord {
        sub_domain: sub_domain.to_string(),
        value: value.to_string(),
        record_id: id.to_string(),
        record_type: record_type.to_string(),
        ttl: TTL,
    }
}

// --- Call overlap ---

/// Tracks how many calls are inside a method at once.
#[derive(Default)]
pub struct Overlap {
    current: AtomicUsize,
    max: AtomicUsize,
    park: Mutex<Duration>,
}

impl Overlap {
    /// Highest number of simultaneous calls seen.
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    /// Keep every call parked for `delay` before it takes effect.
    pub fn park_for(&self, delay: Duration) {
        *self.park.lock().unwrap() = delay;
    }

    async fn enter(&self) -> OverlapGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        let guard = OverlapGuard(self);
        let delay = *self.park.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        guard
    }
}

struct OverlapGuard<'a>(&'a Overlap);

impl Drop for OverlapGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// --- DNS provider ---

/// Mutation seen by [`InMemoryDns`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsOp {
    Add(Vec<DesiredRecord>),
    Remove(Vec<RecordId>),
    Update(Vec<ObservedRecord>),
}

/// Zone held in memory, logging every mutation.
pub struct InMemoryDns {
    records: Mutex<Vec<ObservedRecord>>,
    ops: Mutex<Vec<DnsOp>>,
    next_id: AtomicUsize,
    update_capability: bool,
    initialized: Mutex<bool>,
    /// Number of upcoming `list_records` calls that fail.
    failing_lists: AtomicUsize,
    /// Overlap across add, remove and update calls.
    pub mutations: Overlap,
}

impl InMemoryDns {
    pub fn new(update_capability: bool) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
            ops: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1000),
            update_capability,
            initialized: Mutex::new(false),
            failing_lists: AtomicUsize::new(0),
            mutations: Overlap::default(),
        })
    }

    pub fn with_records(update_capability: bool, records: Vec<ObservedRecord>) -> Arc<Self> {
        let dns = Self::new(update_capability);
        *dns.records.lock().unwrap() = records;
        dns
    }

    pub fn records(&self) -> Vec<ObservedRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Records as sorted `(sub_domain, type, value)` triples.
    pub fn record_set(&self) -> Vec<(String, String, String)> {
        let mut set: Vec<_> = self
            .records()
            .into_iter()
            .map(|r| (r.sub_domain, r.record_type, r.value))
            .collect();
        set.sort();
        set
    }

    pub fn ops(&self) -> Vec<DnsOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    pub fn fail_next_lists(&self, n: usize) {
        self.failing_lists.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl DnsProvider for InMemoryDns {
    fn domain(&self) -> &str {
        DOMAIN
    }

    fn is_initialized(&self) -> bool {
        *self.initialized.lock().unwrap()
    }

    async fn init(&self) -> Result<(), ManagerError> {
        *self.initialized.lock().unwrap() = true;
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<ObservedRecord>, ManagerError> {
        let failing = self
            .failing_lists
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(ManagerError::Provider {
                code: "InternalError".to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(self.records())
    }

    async fn add_records(&self, records: &[DesiredRecord]) -> Result<(), ManagerError> {
        let _call = self.mutations.enter().await;
        self.ops.lock().unwrap().push(DnsOp::Add(records.to_vec()));
        let mut stored = self.records.lock().unwrap();
        for r in records {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            stored.push(ObservedRecord {
                sub_domain: r.sub_domain.clone(),
                value: r.value.clone(),
                record_id: id.to_string(),
                record_type: r.record_type.clone(),
                ttl: r.ttl,
            });
        }
        Ok(())
    }

    async fn remove_records(&self, record_ids: &[RecordId]) -> Result<(), ManagerError> {
        let _call = self.mutations.enter().await;
        self.ops.lock().unwrap().push(DnsOp::Remove(record_ids.to_vec()));
        self.records
            .lock()
            .unwrap()
            .retain(|r| !record_ids.contains(&r.record_id));
        Ok(())
    }

    fn has_update_capability(&self) -> bool {
        self.update_capability
    }

    async fn update_records(&self, records: &[ObservedRecord]) -> Result<(), ManagerError> {
        assert!(self.update_capability, "update called on a provider without update support");
        let _call = self.mutations.enter().await;
        self.ops.lock().unwrap().push(DnsOp::Update(records.to_vec()));
        let mut stored = self.records.lock().unwrap();
        for update in records {
            if let Some(r) = stored.iter_mut().find(|r| r.record_id == update.record_id) {
                r.value = update.value.clone();
                r.ttl = update.ttl;
            }
        }
        Ok(())
    }
}

// --- Router ---

/// Routing table held in memory.
#[derive(Default)]
pub struct InMemoryRouter {
    routes: Mutex<Routes>,
    overrides: AtomicUsize,
    /// Overlap across `override_routes` calls.
    pub override_calls: Overlap,
}

impl InMemoryRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_routes(routes: Routes) -> Arc<Self> {
        let router = Self::default();
        *router.routes.lock().unwrap() = routes;
        Arc::new(router)
    }

    pub fn routes(&self) -> Routes {
        self.routes.lock().unwrap().clone()
    }

    pub fn override_count(&self) -> usize {
        self.overrides.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouterClient for InMemoryRouter {
    async fn get_routes(&self) -> Result<Routes, ManagerError> {
        Ok(self.routes())
    }

    async fn override_routes(&self, routes: &Routes) -> Result<(), ManagerError> {
        let _call = self.override_calls.enter().await;
        self.overrides.fetch_add(1, Ordering::SeqCst);
        *self.routes.lock().unwrap() = routes.clone();
        Ok(())
    }
}

// --- Local sources ---

/// Server list that tests change at will.
#[derive(Default)]
pub struct StaticServers {
    servers: Mutex<Servers>,
}

impl StaticServers {
    pub fn new(servers: Servers) -> Arc<Self> {
        Arc::new(Self {
            servers: Mutex::new(servers),
        })
    }

    pub fn set(&self, servers: Servers) {
        *self.servers.lock().unwrap() = servers;
    }
}

#[async_trait]
impl ServerSource for StaticServers {
    async fn get_servers(&self) -> Result<Servers, ManagerError> {
        Ok(self.servers.lock().unwrap().clone())
    }
}

/// Address list that tests change at will.
#[derive(Default)]
pub struct StaticAddresses {
    addresses: Mutex<Addresses>,
}

impl StaticAddresses {
    pub fn new(addresses: Addresses) -> Arc<Self> {
        Arc::new(Self {
            addresses: Mutex::new(addresses),
        })
    }

    pub fn set(&self, addresses: Addresses) {
        *self.addresses.lock().unwrap() = addresses;
    }
}

#[async_trait]
impl AddressSource for StaticAddresses {
    async fn get_addresses(&self) -> Result<Addresses, ManagerError> {
        Ok(self.addresses.lock().unwrap().clone())
    }
}

/// Change feed driven by a channel: every `()` sent is one notification.
pub struct ScriptedFeed {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<()>>,
}

impl ScriptedFeed {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedSender<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                rx: tokio::sync::Mutex::new(rx),
            }),
            tx,
        )
    }
}

#[async_trait]
impl ChangeFeed for ScriptedFeed {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn listen(&self, events: PendingEvents, cancel: CancellationToken) {
        let mut rx = self.rx.lock().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                msg = rx.recv() => match msg {
                    Some(()) => events.notify(),
                    None => return,
                },
            }
        }
    }
}

// --- Wiring ---

pub fn remote(dns: &Arc<InMemoryDns>, router: &Arc<InMemoryRouter>) -> Remote {
    Remote::new(dns.clone(), router.clone(), MANAGED, TTL)
}

pub fn local(servers: &Arc<StaticServers>, manual: Addresses) -> Local {
    Local::new(servers.clone(), None, manual)
}

/// Fast timings for virtual-time control loop tests.
pub fn test_monitor_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval_secs: 15,
        propagation_grace_secs: 60,
        drain_interval_ms: 1000,
        backoff_initial_ms: 1000,
        backoff_factor: 1.5,
        backoff_max_secs: 60,
    }
}
