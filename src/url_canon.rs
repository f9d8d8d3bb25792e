//! Canonical URL identity (spec §3).
//!
//! Two URLs are equal iff their canonical form is byte-equal: scheme
//! restricted to http/https, host lowercased, port made explicit, and the
//! fragment discarded. The query string is part of identity; the fragment
//! is not.

use std::fmt;

use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UrlError {
    #[error("could not parse URL: {0}")]
    Parse(#[from] url::ParseError),
    #[error("unsupported scheme '{0}', only http/https are supported")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical form of a URL: lowercased host, explicit port, fragment
/// discarded. Equality and hashing operate on this tuple only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalUrl {
    scheme: Scheme,
    host: String,
    port: u16,
    path: String,
    query: Option<String>,
}

impl CanonicalUrl {
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        let url = Url::parse(raw).map_err(UrlError::Parse)?;
        Self::from_url(&url)
    }

    pub fn from_url(url: &Url) -> Result<Self, UrlError> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(UrlError::UnsupportedScheme(other.to_string())),
        };
        let host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        let path = if url.path().is_empty() {
            "/".to_string()
        } else {
            url.path().to_string()
        };
        let query = url.query().map(|q| q.to_string());
        Ok(CanonicalUrl {
            scheme,
            host,
            port,
            path,
            query,
        })
    }

    /// Resolve `relative` against `self` as a base, returning the
    /// canonicalized result. Used for redirects and parser-discovered
    /// links, which are always relative to the URL they were found on.
    pub fn join(&self, relative: &str) -> Result<CanonicalUrl, UrlError> {
        let base = self.to_url();
        let joined = base.join(relative).map_err(UrlError::Parse)?;
        Self::from_url(&joined)
    }

    pub fn to_url(&self) -> Url {
        let mut s = format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path);
        if let Some(q) = &self.query {
            s.push('?');
            s.push_str(q);
        }
        Url::parse(&s).expect("canonical form always reparses")
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn host_port(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    /// `host:port` key used to index the Host Registry (spec §4.2) and
    /// per-connection reuse (spec §4.5 point 3).
    pub fn authority_key(&self) -> (Scheme, String, u16) {
        (self.scheme.clone(), self.host.clone(), self.port)
    }

    /// True if `self`'s path is within or below `parent`'s path, used by
    /// the `no_parent` recursion rule (spec §4.5(d)).
    pub fn is_under(&self, parent: &CanonicalUrl) -> bool {
        if self.host != parent.host || self.port != parent.port {
            return false;
        }
        let parent_dir = dirname(&parent.path);
        self.path.starts_with(&parent_dir)
    }
}

fn dirname(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..=idx].to_string(),
        None => "/".to_string(),
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme, self.host, self.port, self.path)?;
        if let Some(q) = &self.query {
            write!(f, "?{q}")?;
        }
        Ok(())
    }
}
