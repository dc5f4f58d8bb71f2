//! HMAC-SHA256 request signing for the DNS provider APIs.
//!
//! - Tencent Cloud API 3.0 (`TC3-HMAC-SHA256`), used by DNSPod.
//! - Huawei Cloud APIG (`SDK-HMAC-SHA256`), used by Huawei Cloud DNS.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Content type of every signed JSON request.
pub(crate) const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Signs Tencent Cloud API 3.0 requests.
#[derive(Clone)]
pub(crate) struct Tc3Signer {
    secret_id: String,
    secret_key: String,
    service: String,
}

impl Tc3Signer {
    pub(crate) fn new(secret_id: &str, secret_key: &str, service: &str) -> Self {
        Self {
            secret_id: secret_id.to_string(),
            secret_key: secret_key.to_string(),
            service: service.to_string(),
        }
    }

    /// `Authorization` header for a `POST /` carrying `payload`.
    pub(crate) fn authorization(
        &self,
        host: &str,
        action: &str,
        payload: &str,
        timestamp: DateTime<Utc>,
    ) -> String {
        let date = timestamp.format("%Y-%m-%d").to_string();
        let signed_headers = "content-type;host;x-tc-action";
        let canonical_headers = format!(
            "content-type:{}\nhost:{}\nx-tc-action:{}\n",
            JSON_CONTENT_TYPE,
            host,
            action.to_ascii_lowercase()
        );
        let canonical_request = format!(
            "POST\n/\n\n{}\n{}\n{}",
            canonical_headers,
            signed_headers,
            hex_sha256(payload.as_bytes())
        );

        let credential_scope = format!("{}/{}/tc3_request", date, self.service);
        let string_to_sign = format!(
            "TC3-HMAC-SHA256\n{}\n{}\n{}",
            timestamp.timestamp(),
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let secret_date = hmac_sha256(format!("TC3{}", self.secret_key).as_bytes(), date.as_bytes());
        let secret_service = hmac_sha256(&secret_date, self.service.as_bytes());
        let secret_signing = hmac_sha256(&secret_service, b"tc3_request");
        let signature = hex::encode(hmac_sha256(&secret_signing, string_to_sign.as_bytes()));

        format!(
            "TC3-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.secret_id, credential_scope, signed_headers, signature
        )
    }
}

/// Signs Huawei Cloud APIG requests.
#[derive(Clone)]
pub(crate) struct ApigSigner {
    access_key: String,
    secret_key: String,
}

/// Headers to attach to a signed APIG request.
pub(crate) struct ApigHeaders {
    pub(crate) sdk_date: String,
    pub(crate) authorization: String,
}

impl ApigSigner {
    pub(crate) fn new(access_key: &str, secret_key: &str) -> Self {
        Self {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    pub(crate) fn sign(
        &self,
        method: &str,
        host: &str,
        path: &str,
        query: &BTreeMap<String, String>,
        payload: &str,
        timestamp: DateTime<Utc>,
    ) -> ApigHeaders {
        let sdk_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        let mut canonical_uri = uri_encode_path(path);
        if !canonical_uri.ends_with('/') {
            canonical_uri.push('/');
        }
        let signed_headers = "content-type;host;x-sdk-date";
        let canonical_headers = format!(
            "content-type:{}\nhost:{}\nx-sdk-date:{}\n",
            JSON_CONTENT_TYPE, host, sdk_date
        );
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method,
            canonical_uri,
            canonical_query_string(query),
            canonical_headers,
            signed_headers,
            hex_sha256(payload.as_bytes())
        );

        let string_to_sign = format!(
            "SDK-HMAC-SHA256\n{}\n{}",
            sdk_date,
            hex_sha256(canonical_request.as_bytes())
        );
        let signature = hex::encode(hmac_sha256(
            self.secret_key.as_bytes(),
            string_to_sign.as_bytes(),
        ));

        ApigHeaders {
            authorization: format!(
                "SDK-HMAC-SHA256 Access={}, SignedHeaders={}, Signature={}",
                self.access_key, signed_headers, signature
            ),
            sdk_date,
        }
    }
}

/// `k=v` pairs sorted by key, joined with `&`.
pub(crate) fn canonical_query_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode_value(k), uri_encode_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn uri_encode_path(path: &str) -> String {
    path.split('/')
        .map(uri_encode_value)
        .collect::<Vec<_>>()
        .join("/")
}

fn uri_encode_value(value: &str) -> String {
    use std::fmt::Write;
    let mut result = String::with_capacity(value.len() * 3);
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(b as char);
            }
            _ => {
                let _ = write!(result, "%{:02X}", b);
            }
        }
    }
    result
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
