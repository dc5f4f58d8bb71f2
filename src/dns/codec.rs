//! Encoding of a managed state into DNS records and back.
//!
//! Layout under the managed sub-domain `mc` of `example.com`:
//!
//! ```text
//! *.mc                          A      1.1.1.1
//! *.backup.mc                   CNAME  backup.example.net
//! _minecraft._tcp.vanilla.mc    SRV    0 5 25565 vanilla.mc.example.com
//! _minecraft._tcp.vanilla.backup.mc
//!                               SRV    0 5 30000 vanilla.backup.mc.example.com
//! ```
//!
//! Every address gets one wildcard record and one SRV record per server, so
//! a zone read back from the provider must advertise every server under
//! every address, each name exactly once. Anything else is a half-applied
//! batch and decodes as [`DnsDecode::Inconsistent`].

use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{info, warn};

use super::{DesiredRecord, ObservedRecord};
use crate::state::{sub_domain_base, AddressInfo, AddressKind, Addresses, PRIMARY_ADDRESS};

/// Service label prefix of every SRV record we own.
pub const SRV_PREFIX: &str = "_minecraft._tcp.";

const SRV_PRIORITY: u16 = 0;
const SRV_WEIGHT: u16 = 5;

/// Addresses and server names read back from DNS.
///
/// DNS carries no internal server ports; those come from the router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedDnsState {
    /// Addresses with the port advertised by their SRV records.
    pub addresses: Addresses,
    /// Servers advertised through SRV.
    pub server_names: BTreeSet<String>,
}

/// Result of decoding a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsDecode {
    /// The managed records describe a complete state.
    Consistent(ObservedDnsState),
    /// The managed records are half-updated or malformed.
    Inconsistent,
}

/// One parsed SRV record.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SrvTarget {
    server_name: String,
    address_name: String,
    port: u16,
}

/// Encodes and decodes managed state for one zone.
#[derive(Debug, Clone)]
pub struct DnsCodec {
    managed_sub_domain: String,
    domain: String,
    ttl: u32,
}

/// Strip exactly one trailing root-zone dot from SRV and CNAME values.
pub fn sanitize_value<'a>(record_type: &str, value: &'a str) -> &'a str {
    match record_type {
        "SRV" | "CNAME" => value.strip_suffix('.').unwrap_or(value),
        _ => value,
    }
}

impl DnsCodec {
    /// Create a codec for `managed_sub_domain` inside `domain`.
    pub fn new(managed_sub_domain: impl Into<String>, domain: impl Into<String>, ttl: u32) -> Self {
        Self {
            managed_sub_domain: managed_sub_domain.into(),
            domain: domain.into(),
            ttl,
        }
    }

    /// Encode addresses and server names into the records the zone should hold.
    ///
    /// Empty addresses or an empty server set encode to no records at all,
    /// which vacates the managed sub-domain once diffed.
    pub fn encode(&self, addresses: &Addresses, server_names: &BTreeSet<String>) -> Vec<DesiredRecord> {
        if addresses.is_empty() || server_names.is_empty() {
            return Vec::new();
        }

        let mut records = Vec::with_capacity(addresses.len() * (server_names.len() + 1));
        for (address_name, address) in addresses {
            let base = sub_domain_base(address_name, &self.managed_sub_domain);
            records.push(DesiredRecord {
                sub_domain: format!("*.{base}"),
                value: address.host.clone(),
                record_type: address.kind.as_str().to_string(),
                ttl: self.ttl,
            });
            for server_name in server_names {
                records.push(DesiredRecord {
                    sub_domain: format!("{SRV_PREFIX}{server_name}.{base}"),
                    value: format!(
                        "{SRV_PRIORITY} {SRV_WEIGHT} {} {server_name}.{base}.{}",
                        address.port, self.domain
                    ),
                    record_type: "SRV".to_string(),
                    ttl: self.ttl,
                });
            }
        }
        records
    }

    /// Whether a provider record lives in the managed sub-domain.
    pub fn is_relevant(&self, record: &ObservedRecord) -> bool {
        let suffix = format!(".{}", self.managed_sub_domain);
        match record.record_type.as_str() {
            "A" | "AAAA" | "CNAME" => {
                record.sub_domain.starts_with('*') && record.sub_domain.ends_with(&suffix)
            }
            "SRV" => {
                record.sub_domain.starts_with(SRV_PREFIX) && record.sub_domain.ends_with(&suffix)
            }
            _ => false,
        }
    }

    /// Filter a zone listing down to the managed records, with sanitized values.
    pub fn relevant_records(&self, records: &[ObservedRecord]) -> Vec<ObservedRecord> {
        records
            .iter()
            .filter(|r| self.is_relevant(r))
            .map(|r| ObservedRecord {
                value: sanitize_value(&r.record_type, &r.value).to_string(),
                ..r.clone()
            })
            .collect()
    }

    /// Decode a full zone listing into the observed state.
    pub fn decode(&self, records: &[ObservedRecord]) -> DnsDecode {
        let mut addresses = Addresses::new();
        let mut advertised: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut ports: BTreeMap<String, u16> = BTreeMap::new();
        let mut seen = HashSet::new();

        for record in self.relevant_records(records) {
            if !seen.insert(record.key()) {
                info!(
                    sub_domain = %record.sub_domain,
                    record_type = %record.record_type,
                    "duplicate record in managed sub-domain"
                );
                return DnsDecode::Inconsistent;
            }
            if record.record_type == "SRV" {
                let Some(srv) = self.parse_srv(&record.value) else {
                    warn!(
                        sub_domain = %record.sub_domain,
                        value = %record.value,
                        "malformed SRV record in managed sub-domain"
                    );
                    return DnsDecode::Inconsistent;
                };
                ports.insert(srv.address_name.clone(), srv.port);
                advertised
                    .entry(srv.server_name)
                    .or_default()
                    .insert(srv.address_name);
            } else {
                let Some(address_name) = self.address_name_of(&record.sub_domain) else {
                    warn!(sub_domain = %record.sub_domain, "unexpected wildcard record name");
                    return DnsDecode::Inconsistent;
                };
                let Ok(kind) = record.record_type.parse::<AddressKind>() else {
                    return DnsDecode::Inconsistent;
                };
                addresses.insert(address_name, AddressInfo::new(kind, record.value, 0));
            }
        }

        for (server_name, address_names) in &advertised {
            if !address_names.iter().eq(addresses.keys()) {
                info!(
                    server = %server_name,
                    advertised = ?address_names,
                    addresses = ?addresses.keys().collect::<Vec<_>>(),
                    "srv records are not consistent"
                );
                return DnsDecode::Inconsistent;
            }
        }

        for (address_name, address) in addresses.iter_mut() {
            match ports.get(address_name) {
                Some(port) => address.port = *port,
                None => {
                    info!(address = %address_name, "address has no SRV record");
                    return DnsDecode::Inconsistent;
                }
            }
        }

        DnsDecode::Consistent(ObservedDnsState {
            addresses,
            server_names: advertised.into_keys().collect(),
        })
    }

    /// `*.mc` -> `*`, `*.hk.mc` -> `hk`.
    fn address_name_of(&self, sub_domain: &str) -> Option<String> {
        let prefix = sub_domain.strip_suffix(&format!(".{}", self.managed_sub_domain))?;
        if prefix == "*" {
            return Some(PRIMARY_ADDRESS.to_string());
        }
        let name = prefix.strip_prefix("*.")?;
        if name.is_empty() || name.contains('.') {
            return None;
        }
        Some(name.to_string())
    }

    /// `0 5 {port} {server}[.{address}].{managed}.{domain}`, already sanitized.
    fn parse_srv(&self, value: &str) -> Option<SrvTarget> {
        let fields: Vec<&str> = value.split_whitespace().collect();
        let [_, _, port, target] = fields.as_slice() else {
            return None;
        };
        let port: u16 = port.parse().ok()?;
        let host = target.strip_suffix(&format!(".{}.{}", self.managed_sub_domain, self.domain))?;

        let (server_name, address_name) = match host.split_once('.') {
            None => (host, PRIMARY_ADDRESS),
            Some((server, address)) if !address.contains('.') => (server, address),
            Some(_) => return None,
        };
        if server_name.is_empty() || address_name.is_empty() {
            return None;
        }

        Some(SrvTarget {
            server_name: server_name.to_string(),
            address_name: address_name.to_string(),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::diff_records;

    fn codec() -> DnsCodec {
        DnsCodec::new("mc", "example.com", 600)
    }

    fn observed(id: u32, sub_domain: &str, record_type: &str, value: &str) -> ObservedRecord {
        ObservedRecord {
            sub_domain: sub_domain.to_string(),
            value: value.to_string(),
            record_id: id.to_string(),
            record_type: record_type.to_string(),
            ttl: 600,
        }
    }

    fn desired(sub_domain: &str, record_type: &str, value: &str) -> DesiredRecord {
        DesiredRecord {
            sub_domain: sub_domain.to_string(),
            value: value.to_string(),
            record_type: record_type.to_string(),
            ttl: 600,
        }
    }

    fn names(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn three_addresses() -> Addresses {
        let mut addresses = Addresses::new();
        addresses.insert("*".into(), AddressInfo::new(AddressKind::A, "1.1.1.1", 11111));
        addresses.insert(
            "backup".into(),
            AddressInfo::new(AddressKind::Cname, "domain2.com", 22222),
        );
        addresses.insert(
            "hk".into(),
            AddressInfo::new(AddressKind::Cname, "domain3.com", 33333),
        );
        addresses
    }

    #[test]
    fn test_encode_single_address_single_server() {
        let mut addresses = Addresses::new();
        addresses.insert("*".into(), AddressInfo::new(AddressKind::A, "1.1.1.1", 25565));

        let records = codec().encode(&addresses, &names(&["vanilla"]));

        assert_eq!(
            records,
            vec![
                desired("*.mc", "A", "1.1.1.1"),
                desired(
                    "_minecraft._tcp.vanilla.mc",
                    "SRV",
                    "0 5 25565 vanilla.mc.example.com"
                ),
            ]
        );
    }

    #[test]
    fn test_encode_every_server_under_every_address() {
        let records = codec().encode(&three_addresses(), &names(&["vanilla", "gtnh"]));

        let mut got: Vec<DesiredRecord> = records;
        got.sort();
        let mut expected = vec![
            desired("*.mc", "A", "1.1.1.1"),
            desired("*.backup.mc", "CNAME", "domain2.com"),
            desired("*.hk.mc", "CNAME", "domain3.com"),
            desired("_minecraft._tcp.vanilla.mc", "SRV", "0 5 11111 vanilla.mc.example.com"),
            desired(
                "_minecraft._tcp.vanilla.backup.mc",
                "SRV",
                "0 5 22222 vanilla.backup.mc.example.com",
            ),
            desired(
                "_minecraft._tcp.vanilla.hk.mc",
                "SRV",
                "0 5 33333 vanilla.hk.mc.example.com",
            ),
            desired("_minecraft._tcp.gtnh.mc", "SRV", "0 5 11111 gtnh.mc.example.com"),
            desired(
                "_minecraft._tcp.gtnh.backup.mc",
                "SRV",
                "0 5 22222 gtnh.backup.mc.example.com",
            ),
            desired(
                "_minecraft._tcp.gtnh.hk.mc",
                "SRV",
                "0 5 33333 gtnh.hk.mc.example.com",
            ),
        ];
        expected.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_encode_empty_side_produces_no_records() {
        assert!(codec().encode(&Addresses::new(), &names(&["vanilla"])).is_empty());
        assert!(codec().encode(&three_addresses(), &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_decode_with_trailing_dots() {
        let records = vec![
            observed(1, "*.mc", "A", "1.1.1.1"),
            observed(2, "*.backup.mc", "CNAME", "domain2.com."),
            observed(3, "_minecraft._tcp.vanilla.mc", "SRV", "0 5 11111 vanilla.mc.example.com."),
            observed(
                4,
                "_minecraft._tcp.vanilla.backup.mc",
                "SRV",
                "0 5 22222 vanilla.backup.mc.example.com.",
            ),
        ];

        let DnsDecode::Consistent(state) = codec().decode(&records) else {
            panic!("expected consistent decode");
        };

        assert_eq!(state.server_names, names(&["vanilla"]));
        assert_eq!(
            state.addresses.get("*"),
            Some(&AddressInfo::new(AddressKind::A, "1.1.1.1", 11111))
        );
        assert_eq!(
            state.addresses.get("backup"),
            Some(&AddressInfo::new(AddressKind::Cname, "domain2.com", 22222))
        );
    }

    #[test]
    fn test_trailing_dot_cname_decodes_like_plain() {
        let srv = observed(2, "_minecraft._tcp.vanilla.mc", "SRV", "0 5 25565 vanilla.mc.example.com");
        let dotted = codec().decode(&[observed(1, "*.mc", "CNAME", "example.com."), srv.clone()]);
        let plain = codec().decode(&[observed(1, "*.mc", "CNAME", "example.com"), srv]);
        assert_eq!(dotted, plain);
    }

    #[test]
    fn test_decode_ignores_unrelated_records() {
        let records = vec![
            observed(1, "*.mc", "A", "1.1.1.1"),
            observed(2, "_minecraft._tcp.vanilla.mc", "SRV", "0 5 25565 vanilla.mc.example.com"),
            observed(3, "*.irrelevant", "CNAME", "example.com."),
            observed(4, "_minecraft._tcp.irrelevant", "SRV", "0 5 25565 irrelevant.example.com."),
            observed(5, "mc", "A", "4.4.4.4"),
            observed(6, "backup.mc", "CNAME", "otherdomain.com."),
            observed(7, "www", "TXT", "hello"),
        ];

        let DnsDecode::Consistent(state) = codec().decode(&records) else {
            panic!("expected consistent decode");
        };
        assert_eq!(state.addresses.len(), 1);
        assert_eq!(state.server_names, names(&["vanilla"]));
    }

    #[test]
    fn test_decode_empty_zone_is_empty_state() {
        assert_eq!(
            codec().decode(&[]),
            DnsDecode::Consistent(ObservedDnsState::default())
        );
    }

    #[test]
    fn test_server_advertised_under_missing_address_is_inconsistent() {
        let records = vec![
            observed(1, "*.mc", "A", "1.1.1.1"),
            observed(2, "_minecraft._tcp.vanilla.mc", "SRV", "0 5 25565 vanilla.mc.example.com"),
            observed(
                3,
                "_minecraft._tcp.vanilla.hk.mc",
                "SRV",
                "0 5 30000 vanilla.hk.mc.example.com",
            ),
        ];
        assert_eq!(codec().decode(&records), DnsDecode::Inconsistent);
    }

    #[test]
    fn test_address_without_srv_port_is_inconsistent() {
        let records = vec![
            observed(1, "*.mc", "A", "1.1.1.1"),
            observed(2, "*.hk.mc", "A", "2.2.2.2"),
        ];
        assert_eq!(codec().decode(&records), DnsDecode::Inconsistent);
    }

    #[test]
    fn test_server_missing_from_one_address_is_inconsistent() {
        let records = vec![
            observed(1, "*.mc", "A", "1.1.1.1"),
            observed(2, "*.hk.mc", "A", "2.2.2.2"),
            observed(3, "_minecraft._tcp.vanilla.mc", "SRV", "0 5 25565 vanilla.mc.example.com"),
            observed(4, "_minecraft._tcp.vanilla.hk.mc", "SRV", "0 5 1 vanilla.hk.mc.example.com"),
            observed(5, "_minecraft._tcp.gtnh.mc", "SRV", "0 5 25565 gtnh.mc.example.com"),
        ];
        assert_eq!(codec().decode(&records), DnsDecode::Inconsistent);
    }

    #[test]
    fn test_duplicate_name_is_inconsistent() {
        let srv = observed(3, "_minecraft._tcp.vanilla.mc", "SRV", "0 5 25565 vanilla.mc.example.com");
        let wildcard = vec![
            observed(1, "*.mc", "A", "1.1.1.1"),
            observed(2, "*.mc", "A", "9.9.9.9"),
            srv.clone(),
        ];
        assert_eq!(codec().decode(&wildcard), DnsDecode::Inconsistent);

        let same_value = vec![
            observed(1, "*.mc", "A", "1.1.1.1"),
            srv.clone(),
            observed(4, "_minecraft._tcp.vanilla.mc", "SRV", "0 5 25565 vanilla.mc.example.com."),
        ];
        assert_eq!(codec().decode(&same_value), DnsDecode::Inconsistent);
    }

    #[test]
    fn test_malformed_srv_is_inconsistent() {
        for value in [
            "0 5 vanilla.mc.example.com",
            "0 5 notaport vanilla.mc.example.com",
            "0 5 25565 vanilla.elsewhere.org",
        ] {
            let records = vec![
                observed(1, "*.mc", "A", "1.1.1.1"),
                observed(2, "_minecraft._tcp.vanilla.mc", "SRV", value),
            ];
            assert_eq!(codec().decode(&records), DnsDecode::Inconsistent, "{value}");
        }
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        let addresses = three_addresses();
        let servers = names(&["vanilla", "gtnh", "skyblock"]);

        let records: Vec<ObservedRecord> = codec
            .encode(&addresses, &servers)
            .into_iter()
            .enumerate()
            .map(|(i, r)| ObservedRecord {
                sub_domain: r.sub_domain,
                value: r.value,
                record_id: i.to_string(),
                record_type: r.record_type,
                ttl: r.ttl,
            })
            .collect();

        let DnsDecode::Consistent(state) = codec.decode(&records) else {
            panic!("expected consistent decode");
        };
        assert_eq!(state.addresses, addresses);
        assert_eq!(state.server_names, servers);
    }

    #[test]
    fn test_reencoding_decoded_zone_yields_empty_diff() {
        let codec = codec();
        let records = vec![
            observed(1, "*.mc", "A", "1.1.1.1"),
            observed(2, "*.backup.mc", "CNAME", "domain2.com."),
            observed(3, "_minecraft._tcp.vanilla.mc", "SRV", "0 5 11111 vanilla.mc.example.com."),
            observed(
                4,
                "_minecraft._tcp.vanilla.backup.mc",
                "SRV",
                "0 5 22222 vanilla.backup.mc.example.com.",
            ),
        ];
        let DnsDecode::Consistent(state) = codec.decode(&records) else {
            panic!("expected consistent decode");
        };

        let target = codec.encode(&state.addresses, &state.server_names);
        let diff = diff_records(&codec.relevant_records(&records), &target);
        assert!(diff.is_empty(), "{diff:?}");
    }

    #[test]
    fn test_sanitize_strips_one_dot_only_for_srv_and_cname() {
        assert_eq!(sanitize_value("CNAME", "example.com."), "example.com");
        assert_eq!(sanitize_value("SRV", "0 5 1 a.example.com.."), "0 5 1 a.example.com.");
        assert_eq!(sanitize_value("A", "1.1.1.1"), "1.1.1.1");
        assert_eq!(sanitize_value("TXT", "text."), "text.");
    }
}
