//! Host Registry (spec §4.2).
//!
//! Owns per-host state: scheme, port, robots policy, failure counter,
//! blocked flag, earliest-retry timestamp. Does not own pending jobs —
//! those live in the Job Queue (spec §3: "the Job Queue owns pending
//! Jobs"); `HostRegistry` only answers "is this host ready right now".

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::job::JobId;
use crate::robots::RobotsPolicy;
use crate::url_canon::{CanonicalUrl, Scheme};

static NEXT_HOST_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsState {
    /// robots.txt not yet fetched; the registry holds other jobs back.
    Pending,
    /// robots.txt fetch is the one in-flight job for this host.
    InFlight,
    Known,
    /// Robots checking disabled for this run.
    Disabled,
}

pub struct Host {
    pub id: HostId,
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub robots_state: RobotsState,
    pub robots_policy: RobotsPolicy,
    pub robots_job_id: Option<JobId>,
    consecutive_failures: u32,
    blocked: bool,
    earliest_retry: Option<Instant>,
    backoff_base: Duration,
}

const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
const FAILURE_THRESHOLD: u32 = 1;
const MAX_BACKOFF: Duration = Duration::from_secs(120);

impl Host {
    fn new(id: HostId, scheme: Scheme, host: String, port: u16, robots_enabled: bool) -> Self {
        Host {
            id,
            scheme,
            host,
            port,
            robots_state: if robots_enabled { RobotsState::Pending } else { RobotsState::Disabled },
            robots_policy: RobotsPolicy::allow_all(),
            robots_job_id: None,
            consecutive_failures: 0,
            blocked: false,
            earliest_retry: None,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        !self.blocked && self.earliest_retry.map(|t| t <= now).unwrap_or(true)
    }

    pub fn earliest_retry(&self) -> Option<Instant> {
        self.earliest_retry
    }

    pub fn robots_satisfied(&self) -> bool {
        !matches!(self.robots_state, RobotsState::Pending | RobotsState::InFlight)
    }
}

/// Host Registry: `get-or-create`, `record-failure`, `record-success`,
/// `mark-final`, plus robots bookkeeping (spec §4.2 contract).
pub struct HostRegistry {
    hosts: Mutex<HostMap>,
    robots_enabled: bool,
}

struct HostMap {
    by_id: HashMap<HostId, Host>,
    by_key: HashMap<(Scheme, String, u16), HostId>,
}

impl HostRegistry {
    pub fn new(robots_enabled: bool) -> Self {
        HostRegistry {
            hosts: Mutex::new(HostMap { by_id: HashMap::new(), by_key: HashMap::new() }),
            robots_enabled,
        }
    }

    /// Returns the host's id, plus whether this call created it (the
    /// caller uses that to decide whether a robots.txt job still needs
    /// seeding, per spec §4.2 "first job dispatched").
    pub fn get_or_create(&self, url: &CanonicalUrl) -> (HostId, bool) {
        let key = url.authority_key();
        let mut map = self.hosts.lock().unwrap();
        if let Some(id) = map.by_key.get(&key) {
            return (*id, false);
        }
        let id = HostId(NEXT_HOST_ID.fetch_add(1, Ordering::Relaxed));
        let host = Host::new(id, key.0.clone(), key.1.clone(), key.2, self.robots_enabled);
        map.by_key.insert(key, id);
        map.by_id.insert(id, host);
        (id, true)
    }

    pub fn with_host<R>(&self, id: HostId, f: impl FnOnce(&Host) -> R) -> R {
        let map = self.hosts.lock().unwrap();
        let host = map.by_id.get(&id).expect("HostId always refers to a live Host");
        f(host)
    }

    pub fn with_host_mut<R>(&self, id: HostId, f: impl FnOnce(&mut Host) -> R) -> R {
        let mut map = self.hosts.lock().unwrap();
        let host = map.by_id.get_mut(&id).expect("HostId always refers to a live Host");
        f(host)
    }

    /// Records a consecutive connection-class failure; after the
    /// threshold, advances `earliest_retry` by exponential backoff
    /// (spec §4.2).
    pub fn record_failure(&self, id: HostId) {
        self.with_host_mut(id, |host| {
            host.consecutive_failures += 1;
            if host.consecutive_failures >= FAILURE_THRESHOLD {
                let exp = host.consecutive_failures.min(8);
                let backoff = host.backoff_base.saturating_mul(1 << exp.min(7)).min(MAX_BACKOFF);
                host.earliest_retry = Some(Instant::now() + backoff);
                warn!(host = %host.host, failures = host.consecutive_failures, ?backoff, "host backoff");
            }
        });
    }

    pub fn record_success(&self, id: HostId) {
        self.with_host_mut(id, |host| {
            host.consecutive_failures = 0;
            host.earliest_retry = None;
        });
    }

    /// A terminal failure (e.g. strict TLS cert validation) blocks the
    /// host permanently (spec §4.2, §3 invariant: "if blocked, no further
    /// jobs for this host are dispatched, ever").
    pub fn mark_final(&self, id: HostId) {
        self.with_host_mut(id, |host| {
            host.blocked = true;
            info!(host = %host.host, "host permanently blocked");
        });
    }

    pub fn set_robots_policy(&self, id: HostId, policy: RobotsPolicy) {
        self.with_host_mut(id, |host| {
            host.robots_policy = policy;
            host.robots_state = RobotsState::Known;
        });
    }

    pub fn begin_robots_fetch(&self, id: HostId, job_id: JobId) {
        self.with_host_mut(id, |host| {
            host.robots_state = RobotsState::InFlight;
            host.robots_job_id = Some(job_id);
        });
    }

    pub fn is_path_allowed(&self, id: HostId, path: &str) -> bool {
        self.with_host(id, |host| host.robots_policy.is_allowed(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent_per_authority() {
        let registry = HostRegistry::new(true);
        let a = CanonicalUrl::parse("http://example.com/a").unwrap();
        let b = CanonicalUrl::parse("http://example.com/b").unwrap();
        let c = CanonicalUrl::parse("http://other.com/a").unwrap();
        assert_eq!(registry.get_or_create(&a).0, registry.get_or_create(&b).0);
        assert_ne!(registry.get_or_create(&a).0, registry.get_or_create(&c).0);
    }

    #[test]
    fn get_or_create_reports_newness_once() {
        let registry = HostRegistry::new(true);
        let url = CanonicalUrl::parse("http://example.com/a").unwrap();
        assert!(registry.get_or_create(&url).1);
        assert!(!registry.get_or_create(&url).1);
    }

    #[test]
    fn first_job_requires_robots_first() {
        let registry = HostRegistry::new(true);
        let url = CanonicalUrl::parse("http://example.com/a").unwrap();
        let (id, _) = registry.get_or_create(&url);
        assert!(!registry.with_host(id, |h| h.robots_satisfied()));
    }

    #[test]
    fn robots_disabled_is_immediately_satisfied() {
        let registry = HostRegistry::new(false);
        let url = CanonicalUrl::parse("http://example.com/a").unwrap();
        let (id, _) = registry.get_or_create(&url);
        assert!(registry.with_host(id, |h| h.robots_satisfied()));
    }

    #[test]
    fn blocked_host_is_never_ready_again() {
        let registry = HostRegistry::new(false);
        let url = CanonicalUrl::parse("http://example.com/a").unwrap();
        let (id, _) = registry.get_or_create(&url);
        registry.mark_final(id);
        assert!(!registry.with_host(id, |h| h.is_ready(Instant::now())));
    }

    #[test]
    fn failure_backoff_then_success_resets() {
        let registry = HostRegistry::new(false);
        let url = CanonicalUrl::parse("http://example.com/a").unwrap();
        let (id, _) = registry.get_or_create(&url);
        registry.record_failure(id);
        assert!(!registry.with_host(id, |h| h.is_ready(Instant::now())));
        registry.record_success(id);
        assert!(registry.with_host(id, |h| h.is_ready(Instant::now())));
    }
}
