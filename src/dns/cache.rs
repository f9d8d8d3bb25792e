//! Shared, process-wide DNS cache with single-flight deduplication
//! (spec §4.1).
//!
//! Grounded in the teacher's "global state, as a treat" discipline
//! (`utils/client.rs::SKIP_SSL`, a `pub static ...: Mutex<T>`), scaled up
//! to a `Mutex<HashMap<..>>` plus a `Condvar` per in-flight key so that
//! concurrent callers for the same `(host, port)` block on one lookup
//! rather than issuing their own (spec §5: "Single-flight lookups hold
//! the mutex across the network call by design ... contention is bounded
//! by distinct hostnames, not request rate").

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::resolver::{apply_family_preference, AddressRecord, FamilyPreference, ResolveError, ResolverBackend, TimeoutSpec};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    host: String,
    port: u16,
}

enum Slot {
    /// A lookup is in flight; waiters block on the condvar until it
    /// resolves into `Done`.
    InFlight,
    Done(Result<Vec<AddressRecord>, ResolveError>),
}

struct Inner {
    cache: HashMap<CacheKey, Result<Vec<AddressRecord>, ResolveError>>,
    inflight: HashMap<CacheKey, Slot>,
}

/// Process-wide DNS cache. Entries are immutable after insertion: the
/// first result written for a key wins even if a losing single-flight
/// waiter somehow raced ahead (spec §3: "race-winner keeps its value").
pub struct DnsCache {
    backend: Box<dyn ResolverBackend>,
    state: Mutex<Inner>,
    condvar: Condvar,
}

impl DnsCache {
    pub fn new(backend: Box<dyn ResolverBackend>) -> Self {
        DnsCache {
            backend,
            state: Mutex::new(Inner {
                cache: HashMap::new(),
                inflight: HashMap::new(),
            }),
            condvar: Condvar::new(),
        }
    }

    /// `resolve(host, port, family-preference) -> ordered addresses |
    /// ResolveError` (spec §4.1 contract).
    pub fn resolve(
        &self,
        host: &str,
        port: u16,
        pref: FamilyPreference,
        timeout: TimeoutSpec,
    ) -> Result<Vec<AddressRecord>, ResolveError> {
        let key = CacheKey {
            host: host.to_lowercase(),
            port,
        };

        let mut guard = self.state.lock().unwrap();
        if let Some(cached) = guard.cache.get(&key) {
            debug!(%host, port, "DNS cache hit");
            return apply_family_preference(cached.clone()?, pref, host);
        }

        if guard.inflight.contains_key(&key) {
            // Someone else is already resolving this key; wait for them.
            debug!(%host, port, "DNS single-flight: waiting on in-progress lookup");
            loop {
                guard = self.condvar.wait(guard).unwrap();
                if let Some(cached) = guard.cache.get(&key) {
                    return apply_family_preference(cached.clone()?, pref, host);
                }
                if !guard.inflight.contains_key(&key) {
                    // Winner finished but write raced us out of the lock;
                    // loop again, the cache entry will be there shortly.
                    continue;
                }
            }
        }

        // We are the single flight for this key. Hold the lock across
        // the network call by design (spec §5).
        guard.inflight.insert(key.clone(), Slot::InFlight);
        let result = self.lookup_with_retry(host, port, timeout);
        guard.cache.insert(key.clone(), result.clone());
        guard.inflight.remove(&key);
        drop(guard);
        self.condvar.notify_all();

        apply_family_preference(result?, pref, host)
    }

    fn lookup_with_retry(
        &self,
        host: &str,
        port: u16,
        timeout: TimeoutSpec,
    ) -> Result<Vec<AddressRecord>, ResolveError> {
        let mut last_err = None;
        for attempt in 1..=RETRY_ATTEMPTS {
            match self.backend.lookup(host, port, timeout) {
                Ok(records) => return Ok(records),
                Err(ResolveError::Transient { host, detail }) => {
                    warn!(%host, attempt, "transient DNS failure: {detail}");
                    last_err = Some(ResolveError::Transient { host, detail });
                    if attempt < RETRY_ATTEMPTS {
                        thread::sleep(RETRY_BACKOFF);
                    }
                }
                Err(other) => return Err(other),
            }
        }
        Err(last_err.expect("loop always sets last_err before exhausting attempts"))
    }

    pub fn cached_len(&self) -> usize {
        self.state.lock().unwrap().cache.len()
    }
}

#[derive(Clone)]
pub struct SharedDnsCache(pub Arc<DnsCache>);

impl SharedDnsCache {
    pub fn new(backend: Box<dyn ResolverBackend>) -> Self {
        SharedDnsCache(Arc::new(DnsCache::new(backend)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Barrier;

    struct CountingResolver {
        calls: AtomicU32,
    }

    impl ResolverBackend for CountingResolver {
        fn lookup(&self, _host: &str, _port: u16, _timeout: TimeoutSpec) -> Result<Vec<AddressRecord>, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            Ok(vec![AddressRecord { addr: "1.2.3.4".parse().unwrap() }])
        }
    }

    #[test]
    fn cache_hit_skips_backend() {
        let cache = DnsCache::new(Box::new(CountingResolver { calls: AtomicU32::new(0) }));
        cache.resolve("example.com", 80, FamilyPreference::Any, TimeoutSpec::Infinite).unwrap();
        cache.resolve("example.com", 80, FamilyPreference::Any, TimeoutSpec::Infinite).unwrap();
        assert_eq!(cache.cached_len(), 1);
    }

    #[test]
    fn concurrent_lookups_single_flight() {
        let resolver = Arc::new(CountingResolver { calls: AtomicU32::new(0) });
        struct Wrapper(Arc<CountingResolver>);
        impl ResolverBackend for Wrapper {
            fn lookup(&self, h: &str, p: u16, t: TimeoutSpec) -> Result<Vec<AddressRecord>, ResolveError> {
                self.0.lookup(h, p, t)
            }
        }
        let cache = Arc::new(DnsCache::new(Box::new(Wrapper(resolver.clone()))));

        const N: usize = 32;
        let barrier = Arc::new(Barrier::new(N));
        let mut handles = Vec::new();
        for _ in 0..N {
            let cache = cache.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                cache.resolve("cold.example.com", 443, FamilyPreference::Any, TimeoutSpec::Infinite).unwrap()
            }));
        }
        let mut results = Vec::new();
        for h in handles {
            results.push(h.join().unwrap());
        }
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1, "exactly one underlying resolver call");
        for r in &results {
            assert_eq!(r, &results[0]);
        }
    }

    struct FlakyResolver {
        remaining_failures: Mutex<u32>,
    }

    impl ResolverBackend for FlakyResolver {
        fn lookup(&self, host: &str, _port: u16, _timeout: TimeoutSpec) -> Result<Vec<AddressRecord>, ResolveError> {
            let mut remaining = self.remaining_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ResolveError::Transient {
                    host: host.to_string(),
                    detail: "try again".to_string(),
                });
            }
            Ok(vec![AddressRecord { addr: "9.9.9.9".parse().unwrap() }])
        }
    }

    #[test]
    fn transient_failures_retry_up_to_three_times() {
        let cache = DnsCache::new(Box::new(FlakyResolver { remaining_failures: Mutex::new(2) }));
        let result = cache.resolve("flaky.example.com", 80, FamilyPreference::Any, TimeoutSpec::Infinite);
        assert!(result.is_ok());
    }

    #[test]
    fn transient_failures_give_up_after_three_attempts() {
        let cache = DnsCache::new(Box::new(FlakyResolver { remaining_failures: Mutex::new(10) }));
        let result = cache.resolve("always-flaky.example.com", 80, FamilyPreference::Any, TimeoutSpec::Infinite);
        assert!(matches!(result, Err(ResolveError::Transient { .. })));
    }
}
