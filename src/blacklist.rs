//! URL Blacklist (spec §4.3): a protected set enforcing at-most-once
//! processing. Grounded in the teacher's `SKIP_SSL`-style global mutable
//! state discipline (`utils/client.rs`), scaled from a `bool` to a
//! `HashSet<CanonicalUrl>`.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::url_canon::CanonicalUrl;

#[derive(Default)]
pub struct Blacklist {
    seen: Mutex<HashSet<CanonicalUrl>>,
}

impl Blacklist {
    pub fn new() -> Self {
        Blacklist { seen: Mutex::new(HashSet::new()) }
    }

    /// `try-insert(url) -> was-new` (spec §4.3 contract). No removal.
    pub fn try_insert(&self, url: &CanonicalUrl) -> bool {
        self.seen.lock().unwrap().insert(url.clone())
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
