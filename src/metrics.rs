//! Metrics instrumentation for mc-router-dns-manager.
//!
//! All metrics are prefixed with `mrdm.`

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Outcome of one reconciliation attempt.
#[derive(Debug, Clone, Copy)]
pub enum ReconcileOutcome {
    /// Remote state already matched.
    Unchanged,
    /// A corrected state was pushed.
    Pushed,
    /// The attempt failed and was swallowed.
    Error,
}

/// Record a reconciliation attempt.
pub fn record_reconcile(outcome: ReconcileOutcome, duration: Duration) {
    let outcome_str = match outcome {
        ReconcileOutcome::Unchanged => "unchanged",
        ReconcileOutcome::Pushed => "pushed",
        ReconcileOutcome::Error => "error",
    };

    counter!("mrdm.reconcile.count", "outcome" => outcome_str).increment(1);
    histogram!("mrdm.reconcile.duration.seconds").record(duration.as_secs_f64());
}

/// Kind of DNS record change applied.
#[derive(Debug, Clone, Copy)]
pub enum DnsChange {
    /// Record created.
    Add,
    /// Record deleted.
    Remove,
    /// Record updated in place.
    Update,
}

/// Record applied DNS record changes.
pub fn record_dns_changes(change: DnsChange, count: usize) {
    let kind = match change {
        DnsChange::Add => "add",
        DnsChange::Remove => "remove",
        DnsChange::Update => "update",
    };

    counter!("mrdm.dns.record.changes", "kind" => kind).increment(count as u64);
}

/// Why a remote observation was discarded.
#[derive(Debug, Clone, Copy)]
pub enum InconsistencyReason {
    /// DNS records are half-updated or malformed.
    DnsRecords,
    /// Router and DNS disagree on address names.
    AddressNames,
    /// Router and DNS disagree on server names.
    ServerNames,
}

/// Record a discarded remote observation.
pub fn record_inconsistent(reason: InconsistencyReason) {
    let reason_str = match reason {
        InconsistencyReason::DnsRecords => "dns_records",
        InconsistencyReason::AddressNames => "address_names",
        InconsistencyReason::ServerNames => "server_names",
    };

    counter!("mrdm.remote.inconsistent", "reason" => reason_str).increment(1);
}

/// Record a change notification from a feed.
pub fn record_change_event(source: &'static str) {
    counter!("mrdm.feed.event.count", "source" => source).increment(1);
}

/// Record a change feed reconnect.
pub fn record_feed_reconnect(source: &'static str) {
    counter!("mrdm.feed.reconnect.count", "source" => source).increment(1);
}

/// Record the current backoff delay.
pub fn record_backoff(delay: Duration) {
    gauge!("mrdm.backoff.seconds").set(delay.as_secs_f64());
}

/// Record the pending event counter.
pub fn record_pending_events(pending: usize) {
    gauge!("mrdm.pending_events").set(pending as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
