//! Local collaborators: where servers and addresses come from, and the
//! change feeds that tell us when to look again.

pub mod docker_watcher;
pub mod natmap;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ManagerError;
use crate::metrics;
use crate::state::{Addresses, Servers};

pub use docker_watcher::DockerWatcherClient;
pub use natmap::NatmapClient;

/// Timeout of every HTTP call to a local collaborator.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Live servers and their internal ports.
#[async_trait]
pub trait ServerSource: Send + Sync {
    /// Fetch the current server set.
    async fn get_servers(&self) -> Result<Servers, ManagerError>;
}

/// Dynamically discovered addresses.
#[async_trait]
pub trait AddressSource: Send + Sync {
    /// Fetch the addresses this source is configured to provide.
    async fn get_addresses(&self) -> Result<Addresses, ManagerError>;
}

/// Push channel signalling that a source may have changed.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Bump `events` once per notification until `cancel` fires.
    async fn listen(&self, events: PendingEvents, cancel: CancellationToken);
}

/// Coalescing counter of change notifications awaiting a reconciliation.
#[derive(Debug, Clone, Default)]
pub struct PendingEvents {
    count: Arc<AtomicUsize>,
}

impl PendingEvents {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one notification.
    pub fn notify(&self) {
        let pending = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_pending_events(pending);
    }

    /// Consume one notification if any is pending.
    pub fn take_one(&self) -> bool {
        let taken = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match taken {
            Ok(previous) => {
                metrics::record_pending_events(previous - 1);
                true
            }
            Err(_) => false,
        }
    }

    /// Number of notifications not yet consumed.
    pub fn pending(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// `http://host/base/` -> `ws://host/base/ws`
pub(crate) fn websocket_url(base_url: &Url) -> Result<Url, ManagerError> {
    let mut url = base_url.clone();
    let scheme = match base_url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| ManagerError::Config(format!("cannot derive websocket url from {base_url}")))?;
    url.join("ws")
        .map_err(|e| ManagerError::Config(format!("invalid websocket url: {e}")))
}

/// Follow the WebSocket at `url`, reconnecting after a fixed delay on any
/// error or disconnect, until `cancel` fires. Every text frame accepted by
/// `is_change` bumps `events`.
pub(crate) async fn listen_websocket<F>(
    source: &'static str,
    url: &Url,
    events: &PendingEvents,
    cancel: &CancellationToken,
    is_change: F,
) where
    F: Fn(&str) -> bool + Send + Sync,
{
    loop {
        if cancel.is_cancelled() {
            return;
        }

        match follow(source, url, events, cancel, &is_change).await {
            Ok(()) if cancel.is_cancelled() => {
                info!(source, "change feed shutting down");
                return;
            }
            Ok(()) => info!(source, "change feed closed, reconnecting"),
            Err(e) => warn!(source, error = %e, "change feed failed, reconnecting"),
        }
        metrics::record_feed_reconnect(source);

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(RECONNECT_DELAY) => {}
        }
    }
}

async fn follow<F>(
    source: &'static str,
    url: &Url,
    events: &PendingEvents,
    cancel: &CancellationToken,
    is_change: &F,
) -> Result<(), ManagerError>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    let (mut stream, _) = timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url.as_str()))
        .await
        .map_err(|_| {
            ManagerError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connecting to {url} timed out"),
            ))
        })??;
    info!(source, %url, "connected to change feed");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return Ok(()),

            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if is_change(&text) {
                        debug!(source, "change notification received");
                        metrics::record_change_event(source);
                        events.notify();
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}
