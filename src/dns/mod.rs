//! DNS side of the reconciliation: provider capability trait, record types,
//! the state codec, the diff engine and the managed-DNS wrapper.

pub mod codec;
pub mod diff;
pub mod dnspod;
pub mod huawei;
pub mod managed;
mod signing;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::ManagerError;

pub use codec::{DnsCodec, DnsDecode, ObservedDnsState};
pub use diff::{diff_records, RecordDiff};
pub use managed::ManagedDns;

/// Provider-assigned opaque record id.
pub type RecordId = String;

/// A record as returned by the DNS provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObservedRecord {
    /// Record name relative to the zone (e.g. `*.backup.mc`).
    pub sub_domain: String,
    /// Record value.
    pub value: String,
    /// Provider id.
    pub record_id: RecordId,
    /// Upper-case record type.
    pub record_type: String,
    /// TTL in seconds.
    pub ttl: u32,
}

/// A record produced by the codec, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DesiredRecord {
    /// Record name relative to the zone.
    pub sub_domain: String,
    /// Record value.
    pub value: String,
    /// Upper-case record type.
    pub record_type: String,
    /// TTL in seconds.
    pub ttl: u32,
}

impl From<&ObservedRecord> for DesiredRecord {
    fn from(record: &ObservedRecord) -> Self {
        Self {
            sub_domain: record.sub_domain.clone(),
            value: record.value.clone(),
            record_type: record.record_type.clone(),
            ttl: record.ttl,
        }
    }
}

/// Identity used to match observed and desired records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// Record name relative to the zone.
    pub sub_domain: String,
    /// Upper-case record type.
    pub record_type: String,
}

impl RecordKey {
    /// Build a key from its parts.
    pub fn new(sub_domain: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            sub_domain: sub_domain.into(),
            record_type: record_type.into(),
        }
    }
}

impl ObservedRecord {
    /// Key for diffing.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.sub_domain, &self.record_type)
    }
}

impl DesiredRecord {
    /// Key for diffing.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.sub_domain, &self.record_type)
    }
}

/// Capability interface over a DNS provider account holding one zone.
///
/// Implementations are selected at startup from configuration.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Zone apex, e.g. `example.com`.
    fn domain(&self) -> &str;

    /// Whether [`init`](Self::init) has resolved the zone.
    fn is_initialized(&self) -> bool;

    /// Resolve the zone id. Must succeed before any record call.
    async fn init(&self) -> Result<(), ManagerError>;

    /// List every record in the zone.
    async fn list_records(&self) -> Result<Vec<ObservedRecord>, ManagerError>;

    /// Create records.
    async fn add_records(&self, records: &[DesiredRecord]) -> Result<(), ManagerError>;

    /// Delete records by id.
    async fn remove_records(&self, record_ids: &[RecordId]) -> Result<(), ManagerError>;

    /// Whether [`update_records`](Self::update_records) is supported.
    fn has_update_capability(&self) -> bool {
        false
    }

    /// Update value/ttl of existing records in place.
    async fn update_records(&self, records: &[ObservedRecord]) -> Result<(), ManagerError> {
        let _ = records;
        Err(ManagerError::InvalidResponse(
            "provider does not support record updates".to_string(),
        ))
    }
}

/// Attempts made for a single provider call.
pub(crate) const RETRY_ATTEMPTS: u32 = 3;

/// Fixed delay between attempts.
pub(crate) const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Run `op` up to [`RETRY_ATTEMPTS`] times, sleeping [`RETRY_DELAY`] between
/// attempts, as long as the error is retryable.
pub(crate) async fn with_retries<T, F, Fut>(name: &str, mut op: F) -> Result<T, ManagerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ManagerError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < RETRY_ATTEMPTS => {
                debug!(call = name, attempt, error = %e, "provider call failed, retrying");
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_with_retries_gives_up_after_bounded_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ManagerError::Provider {
                code: "InternalError".into(),
                message: "boom".into(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), RETRY_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retries_does_not_retry_fatal_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ManagerError::ZoneNotFound("example.com".into()))
        })
        .await;

        assert!(matches!(result, Err(ManagerError::ZoneNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retries_returns_first_success() {
        let calls = AtomicU32::new(0);
        let result = with_retries("test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(ManagerError::Status {
                    url: "https://dns.example".into(),
                    status: 502,
                })
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
    }
}
