//! Huawei Cloud DNS provider.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use parking_lot::RwLock;
use reqwest::{Method, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::signing::{canonical_query_string, ApigSigner, JSON_CONTENT_TYPE};
use super::{with_retries, DesiredRecord, DnsProvider, ObservedRecord, RecordId};
use crate::config::HuaweiConfig;
use crate::error::ManagerError;

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "cn-south-1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
const PAGE_SIZE: u64 = 500;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "code")]
    error_code: String,
    #[serde(alias = "message")]
    error_msg: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct PageMetadata {
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct ListZonesResponse {
    #[serde(default)]
    zones: Vec<Zone>,
    metadata: PageMetadata,
}

#[derive(Debug, Deserialize)]
struct RecordSet {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    ttl: u32,
    #[serde(default)]
    records: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ListRecordSetsResponse {
    #[serde(default)]
    recordsets: Vec<RecordSet>,
    metadata: PageMetadata,
}

#[derive(Debug, Serialize)]
struct CreateRecordSet<'a> {
    name: String,
    #[serde(rename = "type")]
    record_type: &'a str,
    ttl: u32,
    records: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct DeleteRecordSets<'a> {
    recordset_ids: &'a [RecordId],
}

#[derive(Debug, Serialize)]
struct UpdateRecordSet<'a> {
    id: &'a str,
    records: [&'a str; 1],
    ttl: u32,
}

#[derive(Debug, Serialize)]
struct UpdateRecordSets<'a> {
    recordsets: Vec<UpdateRecordSet<'a>>,
}

/// Huawei Cloud DNS client for one public zone.
pub struct HuaweiDnsClient {
    http: reqwest::Client,
    endpoint: Url,
    host: String,
    domain: String,
    signer: ApigSigner,
    zone_id: RwLock<Option<String>>,
}

impl HuaweiDnsClient {
    /// Create a client from configuration.
    pub fn new(config: &HuaweiConfig) -> Result<Self, ManagerError> {
        let region = config.region.as_deref().unwrap_or(DEFAULT_REGION);
        let endpoint_str = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://dns.{region}.myhuaweicloud.com"));
        let endpoint = Url::parse(&endpoint_str)
            .map_err(|e| ManagerError::Config(format!("invalid Huawei DNS endpoint: {e}")))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ManagerError::Config(format!(
                    "Huawei DNS endpoint has no host: {endpoint_str}"
                )))
            }
        };

        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http,
            endpoint,
            host,
            domain: config.domain.clone(),
            signer: ApigSigner::new(&config.ak, &config.sk),
            zone_id: RwLock::new(None),
        })
    }

    /// Fully-qualified name of the zone as Huawei reports it.
    fn zone_name(&self) -> String {
        format!("{}.", self.domain)
    }

    fn zone_id(&self) -> Result<String, ManagerError> {
        self.zone_id.read().clone().ok_or(ManagerError::NotInitialized)
    }

    async fn send<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &BTreeMap<String, String>,
        payload: &str,
    ) -> Result<R, ManagerError> {
        let headers = self.signer.sign(
            method.as_str(),
            &self.host,
            path,
            query,
            payload,
            Utc::now(),
        );

        let mut url = self.endpoint.clone();
        url.set_path(path);
        let query_string = canonical_query_string(query);
        url.set_query((!query_string.is_empty()).then_some(query_string.as_str()));

        let response = self
            .http
            .request(method, url.clone())
            .header("Content-Type", JSON_CONTENT_TYPE)
            .header("X-Sdk-Date", headers.sdk_date)
            .header("Authorization", headers.authorization)
            .body(payload.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorBody>(&body) {
                Ok(error) if !status.is_server_error() => ManagerError::Provider {
                    code: error.error_code,
                    message: error.error_msg,
                },
                _ => ManagerError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                },
            });
        }

        Ok(response.json().await?)
    }

    async fn call<B, R>(
        &self,
        method: Method,
        path: &str,
        query: BTreeMap<String, String>,
        body: Option<&B>,
    ) -> Result<R, ManagerError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let payload = match body {
            Some(body) => serde_json::to_string(body)?,
            None => String::new(),
        };
        let name = format!("{method} {path}");
        with_retries(&name, || self.send(method.clone(), path, &query, &payload)).await
    }

    async fn add_record(&self, zone_id: &str, record: &DesiredRecord) -> Result<(), ManagerError> {
        let body = CreateRecordSet {
            name: format!("{}.{}", record.sub_domain, self.zone_name()),
            record_type: &record.record_type,
            ttl: record.ttl,
            records: [record.value.as_str()],
        };
        let path = format!("/v2/zones/{zone_id}/recordsets");
        let _: IgnoredAny = self.call(Method::POST, &path, BTreeMap::new(), Some(&body)).await?;
        Ok(())
    }
}

fn page_query(offset: u64, extra: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut query: BTreeMap<String, String> = extra
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    query.insert("limit".to_string(), PAGE_SIZE.to_string());
    query.insert("offset".to_string(), offset.to_string());
    query
}

/// Strip `.{zone}` from a fully-qualified record name. `None` for records
/// outside the zone or at its apex.
fn relative_name<'a>(name: &'a str, zone_name: &str) -> Option<&'a str> {
    name.strip_suffix(zone_name)?.strip_suffix('.')
}

#[async_trait]
impl DnsProvider for HuaweiDnsClient {
    fn domain(&self) -> &str {
        &self.domain
    }

    fn is_initialized(&self) -> bool {
        self.zone_id.read().is_some()
    }

    async fn init(&self) -> Result<(), ManagerError> {
        let zone_name = self.zone_name();
        let mut offset = 0;
        loop {
            let page: ListZonesResponse = self
                .call::<(), _>(
                    Method::GET,
                    "/v2/zones",
                    page_query(offset, &[("type", "public")]),
                    None,
                )
                .await?;

            let fetched = page.zones.len() as u64;
            if let Some(zone) = page.zones.into_iter().find(|z| z.name == zone_name) {
                debug!(domain = %self.domain, zone_id = %zone.id, "resolved Huawei zone");
                *self.zone_id.write() = Some(zone.id);
                return Ok(());
            }

            offset += fetched;
            if fetched == 0 || offset >= page.metadata.total_count {
                return Err(ManagerError::ZoneNotFound(self.domain.clone()));
            }
        }
    }

    async fn list_records(&self) -> Result<Vec<ObservedRecord>, ManagerError> {
        let zone_id = self.zone_id()?;
        let zone_name = self.zone_name();
        let path = format!("/v2/zones/{zone_id}/recordsets");

        let mut records = Vec::new();
        let mut offset = 0;
        loop {
            let page: ListRecordSetsResponse = self
                .call::<(), _>(Method::GET, &path, page_query(offset, &[]), None)
                .await?;
            let fetched = page.recordsets.len() as u64;

            for set in page.recordsets {
                let Some(sub_domain) = relative_name(&set.name, &zone_name) else {
                    continue;
                };
                let Some(value) = set.records.into_iter().next() else {
                    continue;
                };
                records.push(ObservedRecord {
                    sub_domain: sub_domain.to_string(),
                    value,
                    record_id: set.id,
                    record_type: set.record_type,
                    ttl: set.ttl,
                });
            }

            offset += fetched;
            if fetched == 0 || offset >= page.metadata.total_count {
                break;
            }
        }
        Ok(records)
    }

    async fn add_records(&self, records: &[DesiredRecord]) -> Result<(), ManagerError> {
        if records.is_empty() {
            return Ok(());
        }
        let zone_id = self.zone_id()?;
        try_join_all(records.iter().map(|r| self.add_record(&zone_id, r))).await?;
        Ok(())
    }

    async fn remove_records(&self, record_ids: &[RecordId]) -> Result<(), ManagerError> {
        if record_ids.is_empty() {
            return Ok(());
        }
        let path = format!("/v2.1/zones/{}/recordsets", self.zone_id()?);
        let body = DeleteRecordSets {
            recordset_ids: record_ids,
        };
        let _: IgnoredAny = self
            .call(Method::DELETE, &path, BTreeMap::new(), Some(&body))
            .await?;
        Ok(())
    }

    fn has_update_capability(&self) -> bool {
        true
    }

    async fn update_records(&self, records: &[ObservedRecord]) -> Result<(), ManagerError> {
        if records.is_empty() {
            return Ok(());
        }
        let path = format!("/v2.1/zones/{}/recordsets", self.zone_id()?);
        let body = UpdateRecordSets {
            recordsets: records
                .iter()
                .map(|r| UpdateRecordSet {
                    id: &r.record_id,
                    records: [r.value.as_str()],
                    ttl: r.ttl,
                })
                .collect(),
        };
        let _: IgnoredAny = self
            .call(Method::PUT, &path, BTreeMap::new(), Some(&body))
            .await?;
        Ok(())
    }
}
