//! Cookie store trait seam (spec §4.5 point 5, point "record Set-Cookie";
//! SPEC_FULL.md §10: "those stores are modeled only as trait seams the
//! Fetch Pipeline calls into, with an in-memory default").
//!
//! The coordinator does not implement a real cookie jar (expiry,
//! domain/path matching, persistence) — spec §6 "Persisted state"
//! delegates that format to an external store. `InMemoryCookieStore`
//! keeps just enough state (one name=value map per host) for a run to
//! round-trip its own Set-Cookie responses.

use std::collections::HashMap;
use std::sync::Mutex;

/// Called by the Fetch Pipeline on every response (to record `Set-Cookie`)
/// and before building a request (to read back a `Cookie` header).
pub trait CookieStore: Send + Sync {
    fn record(&self, host: &str, set_cookie_header: &str);
    fn header_for(&self, host: &str) -> Option<String>;
}

#[derive(Default)]
pub struct InMemoryCookieStore {
    by_host: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl InMemoryCookieStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStore for InMemoryCookieStore {
    fn record(&self, host: &str, set_cookie_header: &str) {
        let Some((name, value)) = set_cookie_header.split(';').next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let mut by_host = self.by_host.lock().unwrap();
        by_host.entry(host.to_string()).or_default().insert(name.trim().to_string(), value.trim().to_string());
    }

    fn header_for(&self, host: &str) -> Option<String> {
        let by_host = self.by_host.lock().unwrap();
        let jar = by_host.get(host)?;
        if jar.is_empty() {
            return None;
        }
        Some(jar.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("; "))
    }
}

/// No-op store for runs that don't want cookie tracking at all.
#[derive(Default)]
pub struct NoopCookieStore;

impl CookieStore for NoopCookieStore {
    fn record(&self, _host: &str, _set_cookie_header: &str) {}
    fn header_for(&self, _host: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_replays_a_cookie() {
        let store = InMemoryCookieStore::new();
        store.record("example.com", "session=abc123; Path=/; HttpOnly");
        assert_eq!(store.header_for("example.com"), Some("session=abc123".to_string()));
    }

    #[test]
    fn unknown_host_has_no_cookie_header() {
        let store = InMemoryCookieStore::new();
        assert_eq!(store.header_for("example.com"), None);
    }

    #[test]
    fn later_set_cookie_overwrites_same_name() {
        let store = InMemoryCookieStore::new();
        store.record("example.com", "a=1");
        store.record("example.com", "a=2");
        assert_eq!(store.header_for("example.com"), Some("a=2".to_string()));
    }
}
