//! Credential store trait seam (spec §4.5 point 5 "conditional auth
//! headers"; SPEC_FULL.md §10). A real netrc/keyring-backed store is out
//! of scope (spec §6 "Persisted state" delegates its format externally);
//! `InMemoryCredentialStore` wraps the single `--user`/`--password` pair
//! spec §6 actually puts on the CLI surface, applied to every host.

pub trait CredentialStore: Send + Sync {
    fn credentials_for(&self, host: &str) -> Option<(String, String)>;
}

pub struct InMemoryCredentialStore {
    pair: Option<(String, String)>,
}

impl InMemoryCredentialStore {
    pub fn new(user: Option<String>, password: Option<String>) -> Self {
        InMemoryCredentialStore { pair: user.zip(password) }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn credentials_for(&self, _host: &str) -> Option<(String, String)> {
        self.pair.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_the_configured_pair_for_any_host() {
        let store = InMemoryCredentialStore::new(Some("alice".into()), Some("hunter2".into()));
        assert_eq!(store.credentials_for("example.com"), Some(("alice".to_string(), "hunter2".to_string())));
        assert_eq!(store.credentials_for("other.example.com"), Some(("alice".to_string(), "hunter2".to_string())));
    }

    #[test]
    fn missing_password_means_no_credentials() {
        let store = InMemoryCredentialStore::new(Some("alice".into()), None);
        assert_eq!(store.credentials_for("example.com"), None);
    }
}
