//! DNSPod (Tencent Cloud API 3.0) provider.
//!
//! DNSPod has no batch update call usable for our records, so updates go
//! through delete + recreate.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::signing::{Tc3Signer, JSON_CONTENT_TYPE};
use super::{with_retries, DesiredRecord, DnsProvider, ObservedRecord, RecordId};
use crate::config::DnsPodConfig;
use crate::error::ManagerError;

/// Public API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://dnspod.tencentcloudapi.com";

const API_VERSION: &str = "2021-03-23";
const SERVICE: &str = "dnspod";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
const PAGE_SIZE: u64 = 3000;
/// Records deleted in a batch linger briefly; adding right away can conflict.
const DELETE_SETTLE: Duration = Duration::from_secs(2);

const NO_RECORDS: &str = "ResourceNotFound.NoDataOfRecord";
const NO_DOMAINS: &str = "ResourceNotFound.NoDataOfDomain";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Response")]
    response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DomainInfo {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "DomainId")]
    domain_id: u64,
}

#[derive(Debug, Deserialize)]
struct DescribeDomainListResponse {
    #[serde(rename = "DomainList", default)]
    domain_list: Vec<DomainInfo>,
}

#[derive(Debug, Deserialize)]
struct RecordInfo {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "RecordId")]
    record_id: u64,
    #[serde(rename = "Type")]
    record_type: String,
    #[serde(rename = "TTL")]
    ttl: u32,
    #[serde(rename = "Value")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct RecordCountInfo {
    #[serde(rename = "TotalCount")]
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct DescribeRecordListResponse {
    #[serde(rename = "RecordCountInfo")]
    record_count_info: RecordCountInfo,
    #[serde(rename = "RecordList", default)]
    record_list: Vec<RecordInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeRecordListRequest<'a> {
    domain: &'a str,
    offset: u64,
    limit: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeDomainListRequest<'a> {
    keyword: &'a str,
}

#[derive(Debug, Serialize)]
struct AddRecord<'a> {
    #[serde(rename = "SubDomain")]
    sub_domain: &'a str,
    #[serde(rename = "RecordType")]
    record_type: &'a str,
    #[serde(rename = "Value")]
    value: &'a str,
    #[serde(rename = "TTL")]
    ttl: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateRecordBatchRequest<'a> {
    domain_id_list: Vec<String>,
    record_list: Vec<AddRecord<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteRecordBatchRequest {
    record_id_list: Vec<u64>,
}

/// DNSPod client for one domain.
pub struct DnsPodClient {
    http: reqwest::Client,
    endpoint: Url,
    host: String,
    domain: String,
    signer: Tc3Signer,
    domain_id: RwLock<Option<u64>>,
}

impl DnsPodClient {
    /// Create a client from configuration.
    pub fn new(config: &DnsPodConfig) -> Result<Self, ManagerError> {
        let endpoint_str = config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let endpoint = Url::parse(endpoint_str)
            .map_err(|e| ManagerError::Config(format!("invalid DNSPod endpoint: {e}")))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ManagerError::Config(format!(
                    "DNSPod endpoint has no host: {endpoint_str}"
                )))
            }
        };

        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http,
            endpoint,
            host,
            domain: config.domain.clone(),
            signer: Tc3Signer::new(&config.secret_id, &config.secret_key, SERVICE),
            domain_id: RwLock::new(None),
        })
    }

    /// Send one signed action and return the raw `Response` object.
    async fn send(&self, action: &str, payload: &str) -> Result<serde_json::Value, ManagerError> {
        let now = Utc::now();
        let authorization = self.signer.authorization(&self.host, action, payload, now);

        let response = self
            .http
            .post(self.endpoint.clone())
            .header("Authorization", authorization)
            .header("Content-Type", JSON_CONTENT_TYPE)
            .header("X-TC-Action", action)
            .header("X-TC-Timestamp", now.timestamp().to_string())
            .header("X-TC-Version", API_VERSION)
            .body(payload.to_string())
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ManagerError::Status {
                url: self.endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let envelope: Envelope = response.json().await?;
        if let Some(error) = envelope.response.get("Error") {
            let error: ApiError = serde_json::from_value(error.clone())?;
            return Err(ManagerError::Provider {
                code: error.code,
                message: error.message,
            });
        }
        Ok(envelope.response)
    }

    /// Call `action` with retries and decode its response.
    async fn call<P, R>(&self, action: &str, params: &P) -> Result<R, ManagerError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_string(params)?;
        let response = with_retries(action, || self.send(action, &payload)).await?;
        Ok(serde_json::from_value(response)?)
    }

    fn domain_id(&self) -> Result<u64, ManagerError> {
        (*self.domain_id.read()).ok_or(ManagerError::NotInitialized)
    }
}

fn is_code(error: &ManagerError, expected: &str) -> bool {
    matches!(error, ManagerError::Provider { code, .. } if code == expected)
}

#[async_trait]
impl DnsProvider for DnsPodClient {
    fn domain(&self) -> &str {
        &self.domain
    }

    fn is_initialized(&self) -> bool {
        self.domain_id.read().is_some()
    }

    async fn init(&self) -> Result<(), ManagerError> {
        let request = DescribeDomainListRequest {
            keyword: &self.domain,
        };
        let response: DescribeDomainListResponse =
            match self.call("DescribeDomainList", &request).await {
                Ok(r) => r,
                Err(e) if is_code(&e, NO_DOMAINS) => {
                    return Err(ManagerError::ZoneNotFound(self.domain.clone()))
                }
                Err(e) => return Err(e),
            };

        let domain = response
            .domain_list
            .into_iter()
            .find(|d| d.name == self.domain)
            .ok_or_else(|| ManagerError::ZoneNotFound(self.domain.clone()))?;

        debug!(domain = %self.domain, domain_id = domain.domain_id, "resolved DNSPod domain");
        *self.domain_id.write() = Some(domain.domain_id);
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<ObservedRecord>, ManagerError> {
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let request = DescribeRecordListRequest {
                domain: &self.domain,
                offset,
                limit: PAGE_SIZE,
            };
            let page: DescribeRecordListResponse =
                match self.call("DescribeRecordList", &request).await {
                    Ok(page) => page,
                    Err(e) if is_code(&e, NO_RECORDS) => break,
                    Err(e) => return Err(e),
                };

            let fetched = page.record_list.len() as u64;
            records.extend(page.record_list.into_iter().map(|r| ObservedRecord {
                sub_domain: r.name,
                value: r.value,
                record_id: r.record_id.to_string(),
                record_type: r.record_type,
                ttl: r.ttl,
            }));

            offset += fetched;
            if fetched == 0 || offset >= page.record_count_info.total_count {
                break;
            }
        }

        Ok(records)
    }

    async fn add_records(&self, records: &[DesiredRecord]) -> Result<(), ManagerError> {
        if records.is_empty() {
            return Ok(());
        }
        let request = CreateRecordBatchRequest {
            domain_id_list: vec![self.domain_id()?.to_string()],
            record_list: records
                .iter()
                .map(|r| AddRecord {
                    sub_domain: &r.sub_domain,
                    record_type: &r.record_type,
                    value: &r.value,
                    ttl: r.ttl,
                })
                .collect(),
        };
        let _: serde_json::Value = self.call("CreateRecordBatch", &request).await?;
        Ok(())
    }

    async fn remove_records(&self, record_ids: &[RecordId]) -> Result<(), ManagerError> {
        if record_ids.is_empty() {
            return Ok(());
        }
        let record_id_list = record_ids
            .iter()
            .map(|id| {
                id.parse::<u64>()
                    .map_err(|_| ManagerError::InvalidResponse(format!("not a DNSPod record id: {id}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let _: serde_json::Value = self
            .call("DeleteRecordBatch", &DeleteRecordBatchRequest { record_id_list })
            .await?;
        tokio::time::sleep(DELETE_SETTLE).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: Option<&str>) -> DnsPodConfig {
        DnsPodConfig {
            domain: "example.com".to_string(),
            secret_id: "id".to_string(),
            secret_key: "key".to_string(),
            endpoint: endpoint.map(String::from),
        }
    }

    #[test]
    fn test_new_derives_signing_host() {
        let client = DnsPodClient::new(&config(None)).unwrap();
        assert_eq!(client.host, "dnspod.tencentcloudapi.com");
        assert!(!client.is_initialized());
        assert!(!client.has_update_capability());

        let client = DnsPodClient::new(&config(Some("http://127.0.0.1:9000"))).unwrap();
        assert_eq!(client.host, "127.0.0.1:9000");
    }

    #[test]
    fn test_request_field_names() {
        let request = DescribeRecordListRequest {
            domain: "example.com",
            offset: 0,
            limit: PAGE_SIZE,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"Domain":"example.com","Offset":0,"Limit":3000}"#
        );

        let request = CreateRecordBatchRequest {
            domain_id_list: vec!["7".into()],
            record_list: vec![AddRecord {
                sub_domain: "*.mc",
                record_type: "A",
                value: "1.1.1.1",
                ttl: 600,
            }],
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"DomainIdList":["7"],"RecordList":[{"SubDomain":"*.mc","RecordType":"A","Value":"1.1.1.1","TTL":600}]}"#
        );
    }

    #[test]
    fn test_record_list_response_parses() {
        let body = serde_json::json!({
            "RecordCountInfo": {"TotalCount": 1, "ListCount": 1, "SubdomainCount": 1},
            "RecordList": [{
                "Name": "_minecraft._tcp.vanilla.mc",
                "RecordId": 123,
                "Type": "SRV",
                "TTL": 600,
                "Value": "0 5 25565 vanilla.mc.example.com.",
                "Line": "默认"
            }],
            "RequestId": "abc"
        });
        let response: DescribeRecordListResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.record_count_info.total_count, 1);
        assert_eq!(response.record_list[0].record_id, 123);
    }
}
