//! Pluggable DNS resolver backends (spec §4.1).
//!
//! Two backends: `system-lookup` (the OS resolver, via
//! `std::net::ToSocketAddrs`) and `doh` (DNS-over-HTTPS, a plain
//! `reqwest::blocking` GET against a configured resolver URL — the same
//! client-construction idiom the teacher uses in `utils/client.rs`).

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

/// Family preference for a lookup (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FamilyPreference {
    #[default]
    Any,
    /// Move the preferred family to the head, keep the rest.
    Prefer(Family),
    /// Wrong-family addresses are an error.
    Strict(Family),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub addr: IpAddr,
}

impl AddressRecord {
    pub fn family(&self) -> Family {
        match self.addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum ResolveError {
    #[error("transient DNS failure for {host}: {detail}")]
    Transient { host: String, detail: String },
    #[error("permanent DNS failure for {host}: {detail}")]
    Permanent { host: String, detail: String },
    #[error("no addresses of the required family for {host}")]
    FamilyMismatch { host: String },
    #[error("DNS lookup timed out for {host}")]
    Timeout { host: String },
}

/// Timeout value per spec §4.1: 0 = immediate, negative = infinite.
#[derive(Debug, Clone, Copy)]
pub enum TimeoutSpec {
    Immediate,
    Infinite,
    Duration(Duration),
}

impl TimeoutSpec {
    pub fn from_seconds(secs: f64) -> Self {
        if secs == 0.0 {
            TimeoutSpec::Immediate
        } else if secs < 0.0 {
            TimeoutSpec::Infinite
        } else {
            TimeoutSpec::Duration(Duration::from_secs_f64(secs))
        }
    }
}

pub trait ResolverBackend: Send + Sync {
    /// Performs one lookup attempt. Retries/backoff live in `DnsCache`,
    /// not here, so a backend implementation stays a pure lookup.
    fn lookup(&self, host: &str, port: u16, timeout: TimeoutSpec) -> Result<Vec<AddressRecord>, ResolveError>;
}

/// OS resolver backend, via `std::net::ToSocketAddrs`.
pub struct SystemResolver;

impl ResolverBackend for SystemResolver {
    fn lookup(&self, host: &str, port: u16, timeout: TimeoutSpec) -> Result<Vec<AddressRecord>, ResolveError> {
        if matches!(timeout, TimeoutSpec::Immediate) {
            return Err(ResolveError::Timeout { host: host.to_string() });
        }
        let query = format!("{host}:{port}");
        match query.to_socket_addrs() {
            Ok(iter) => {
                let records: Vec<AddressRecord> = iter.map(|sa: SocketAddr| AddressRecord { addr: sa.ip() }).collect();
                if records.is_empty() {
                    Err(ResolveError::Permanent {
                        host: host.to_string(),
                        detail: "no addresses returned".to_string(),
                    })
                } else {
                    Ok(dedup(records))
                }
            }
            Err(e) => {
                // io::ErrorKind::WouldBlock / TimedOut map to transient;
                // everything else (e.g. NXDOMAIN-equivalent) is permanent.
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
                ) {
                    Err(ResolveError::Transient {
                        host: host.to_string(),
                        detail: e.to_string(),
                    })
                } else {
                    Err(ResolveError::Permanent {
                        host: host.to_string(),
                        detail: e.to_string(),
                    })
                }
            }
        }
    }
}

fn dedup(mut records: Vec<AddressRecord>) -> Vec<AddressRecord> {
    let mut seen = std::collections::HashSet::new();
    records.retain(|r| seen.insert(r.addr));
    records
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    rtype: u16,
    data: String,
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(default)]
    #[serde(rename = "Answer")]
    answer: Vec<DohAnswer>,
}

/// DNS-over-HTTPS backend (draft-ietf-doh-dns-over-https), grounded in the
/// teacher's blocking-`reqwest` client construction (`utils/client.rs`).
pub struct DohResolver {
    client: reqwest::blocking::Client,
    resolver_url: String,
}

impl DohResolver {
    pub fn new(resolver_url: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(DohResolver { client, resolver_url })
    }

    fn query_one(&self, host: &str, rtype: &str, timeout: Duration) -> Result<Vec<IpAddr>, ResolveError> {
        let resp = self
            .client
            .get(&self.resolver_url)
            .timeout(timeout)
            .query(&[("name", host), ("type", rtype)])
            .header("Accept", "application/dns-json")
            .send();
        let resp = match resp {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(ResolveError::Timeout { host: host.to_string() }),
            Err(e) => {
                return Err(ResolveError::Transient {
                    host: host.to_string(),
                    detail: e.to_string(),
                })
            }
        };
        if !resp.status().is_success() {
            return Err(ResolveError::Permanent {
                host: host.to_string(),
                detail: format!("DoH resolver returned {}", resp.status()),
            });
        }
        let parsed: DohResponse = resp.json().map_err(|e| ResolveError::Permanent {
            host: host.to_string(),
            detail: format!("invalid DoH response: {e}"),
        })?;
        // Type 1 = A, type 28 = AAAA.
        let want_type = if rtype == "A" { 1 } else { 28 };
        Ok(parsed
            .answer
            .into_iter()
            .filter(|a| a.rtype == want_type)
            .filter_map(|a| a.data.parse::<IpAddr>().ok())
            .collect())
    }
}

impl ResolverBackend for DohResolver {
    fn lookup(&self, host: &str, _port: u16, timeout: TimeoutSpec) -> Result<Vec<AddressRecord>, ResolveError> {
        let duration = match timeout {
            TimeoutSpec::Immediate => return Err(ResolveError::Timeout { host: host.to_string() }),
            TimeoutSpec::Infinite => Duration::from_secs(3600),
            TimeoutSpec::Duration(d) => d,
        };
        debug!(%host, "querying DoH resolver {}", self.resolver_url);
        let mut addrs = self.query_one(host, "A", duration)?;
        addrs.extend(self.query_one(host, "AAAA", duration).unwrap_or_default());
        if addrs.is_empty() {
            return Err(ResolveError::Permanent {
                host: host.to_string(),
                detail: "no A/AAAA records".to_string(),
            });
        }
        Ok(dedup(addrs.into_iter().map(|addr| AddressRecord { addr }).collect()))
    }
}

/// Applies family preference/strictness to an unconstrained lookup result
/// (spec §4.1): preferred family moved to the head preserving relative
/// order, or an error if strict and the wrong family is present.
pub fn apply_family_preference(
    records: Vec<AddressRecord>,
    pref: FamilyPreference,
    host: &str,
) -> Result<Vec<AddressRecord>, ResolveError> {
    match pref {
        FamilyPreference::Any => Ok(records),
        FamilyPreference::Prefer(family) => {
            let (mut head, mut tail) = (Vec::new(), Vec::new());
            for r in records {
                if r.family() == family {
                    head.push(r);
                } else {
                    tail.push(r);
                }
            }
            head.extend(tail);
            Ok(head)
        }
        FamilyPreference::Strict(family) => {
            if records.iter().any(|r| r.family() != family) {
                return Err(ResolveError::FamilyMismatch { host: host.to_string() });
            }
            Ok(records)
        }
    }
}
