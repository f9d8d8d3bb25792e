//! HTTP client construction, generalizing the teacher's
//! `utils/client.rs::get_client` (a single `reqwest::blocking::Client`
//! behind global config) to the full set of coordinator-level knobs:
//! per-run timeouts, User-Agent, and extra headers (spec §4.5 point 4).
//!
//! Connection reuse (spec §4.5 point 3) is delegated to `reqwest`'s own
//! keep-alive connection pool, keyed by origin: one shared `Client` is
//! built once and handed to every worker, rather than each worker
//! managing raw sockets itself.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::Config;
use crate::dns::resolver::TimeoutSpec;

fn duration_or_max(spec: TimeoutSpec) -> Option<Duration> {
    match spec {
        TimeoutSpec::Immediate => Some(Duration::from_millis(1)),
        TimeoutSpec::Infinite => None,
        TimeoutSpec::Duration(d) => Some(d),
    }
}

pub fn build_client(config: &Config) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Some(referer) = &config.referer {
        headers.insert(reqwest::header::REFERER, HeaderValue::from_str(referer).context("invalid --referer")?);
    }
    for (name, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes()).with_context(|| format!("invalid header name {name:?}"))?;
        let value = HeaderValue::from_str(value).with_context(|| format!("invalid header value {value:?}"))?;
        headers.insert(name, value);
    }

    let mut builder = Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::none()) // redirects are handled by the Fetch Pipeline (spec §4.5 point 5)
        .gzip(true);

    if let Some(d) = duration_or_max(config.connect_timeout) {
        builder = builder.connect_timeout(d);
    }
    if let Some(d) = duration_or_max(config.read_timeout) {
        builder = builder.timeout(d);
    }

    builder.build().context("failed to build HTTP client")
}
