//! The control loop.
//!
//! ```text
//!            ┌──────────── poll every 15s ────────────┐
//!            │                                         ▼
//!  feeds ──▶ PendingEvents ──▶ drain loop ──▶ attempt (reconcile lock)
//!                                                     │
//!                         Local.pull ⇄ Remote.pull ───┤ equal: done
//!                                                     ▼
//!                                   Remote.push, then propagation grace
//! ```
//!
//! Every attempt, whatever triggered it, runs under one lock. Failures are
//! logged and delay the next attempt through [`Backoff`].

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::error::ManagerError;
use crate::local::Local;
use crate::metrics::{self, ReconcileOutcome, Timer};
use crate::remote::Remote;
use crate::sources::{ChangeFeed, PendingEvents};

/// Exponential delay inserted before attempts following a failure.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    factor: f64,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Start with no delay.
    pub fn new(initial: Duration, factor: f64, max: Duration) -> Self {
        Self {
            initial,
            factor,
            max,
            current: Duration::ZERO,
        }
    }

    /// Build from monitor settings.
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(
            config.backoff_initial(),
            config.backoff_factor,
            config.backoff_max(),
        )
    }

    /// Delay to wait before the next attempt.
    pub fn delay(&self) -> Duration {
        self.current
    }

    /// Grow the delay after a failed attempt.
    pub fn fail(&mut self) {
        let next = if self.current.is_zero() {
            self.initial
        } else {
            self.current.mul_f64(self.factor)
        };
        self.current = next.min(self.max);
    }

    /// Drop back to no delay after a successful attempt.
    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
    }
}

/// Drives reconciliation from polling and change notifications.
pub struct Monitorer {
    local: Local,
    remote: Remote,
    feeds: Vec<Arc<dyn ChangeFeed>>,
    config: MonitorConfig,
    events: PendingEvents,
    backoff: Mutex<Backoff>,
    reconcile_lock: tokio::sync::Mutex<()>,
}

impl Monitorer {
    /// Create a monitor over the given collaborators.
    pub fn new(
        local: Local,
        remote: Remote,
        feeds: Vec<Arc<dyn ChangeFeed>>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            local,
            remote,
            feeds,
            backoff: Mutex::new(Backoff::from_config(&config)),
            config,
            events: PendingEvents::new(),
            reconcile_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Counter the change feeds bump.
    pub fn pending_events(&self) -> PendingEvents {
        self.events.clone()
    }

    /// Current backoff delay.
    pub fn backoff_delay(&self) -> Duration {
        self.backoff.lock().delay()
    }

    /// Reconcile until the first success, then poll, drain notifications and
    /// follow the change feeds until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("running initial reconciliation");
        loop {
            if cancel.is_cancelled() {
                return;
            }
            if self.attempt(&cancel).await {
                break;
            }
        }
        info!("initial reconciliation done, entering steady state");

        let feeds: Vec<_> = self
            .feeds
            .iter()
            .map(|feed| {
                let feed = Arc::clone(feed);
                let events = self.events.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { feed.listen(events, cancel).await })
            })
            .collect();

        tokio::join!(self.poll_loop(&cancel), self.drain_loop(&cancel));

        for handle in feeds {
            if let Err(e) = handle.await {
                error!("change feed task panicked: {}", e);
            }
        }
        info!("monitor stopped");
    }

    async fn poll_loop(&self, cancel: &CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(self.config.poll_interval()) => {}
            }
            debug!("polling remote state");
            self.attempt(cancel).await;
        }
    }

    async fn drain_loop(&self, cancel: &CancellationToken) {
        loop {
            if self.events.take_one() {
                debug!(remaining = self.events.pending(), "handling change notification");
                self.attempt(cancel).await;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(self.config.drain_interval()) => {}
            }
        }
    }

    /// One serialized reconciliation attempt. Errors are logged and swallowed;
    /// returns whether the attempt succeeded.
    pub async fn attempt(&self, cancel: &CancellationToken) -> bool {
        let delay = self.backoff.lock().delay();
        if !delay.is_zero() {
            debug!(?delay, "backing off");
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = sleep(delay) => {}
            }
        }

        let _guard = self.reconcile_lock.lock().await;
        let timer = Timer::start();
        let result = self.reconcile(cancel).await;

        let mut backoff = self.backoff.lock();
        let succeeded = match result {
            Ok(outcome) => {
                backoff.reset();
                metrics::record_reconcile(outcome, timer.elapsed());
                true
            }
            Err(e) => {
                backoff.fail();
                warn!(error = %e, next_delay = ?backoff.delay(), "reconciliation failed");
                metrics::record_reconcile(ReconcileOutcome::Error, timer.elapsed());
                false
            }
        };
        metrics::record_backoff(backoff.delay());
        succeeded
    }

    async fn reconcile(&self, cancel: &CancellationToken) -> Result<ReconcileOutcome, ManagerError> {
        let (desired, observed) = tokio::try_join!(self.local.pull(), self.remote.pull())?;

        if observed.as_ref() == Some(&desired) {
            debug!("remote state is up to date");
            return Ok(ReconcileOutcome::Unchanged);
        }

        match &observed {
            Some(observed) => info!(%observed, %desired, "remote state differs, pushing"),
            None => info!(%desired, "remote state unknown, pushing"),
        }
        self.remote.push(&desired).await?;
        info!(state = %desired, "pushed");

        let grace = self.config.propagation_grace();
        debug!(?grace, "waiting for DNS propagation");
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = sleep(grace) => {}
        }
        Ok(ReconcileOutcome::Pushed)
    }
}
