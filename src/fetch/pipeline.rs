//! The Fetch Pipeline proper (spec §4.5): request construction, response
//! classification, Metalink discovery, and link enqueueing for one Job.
//! Grounded in the teacher's `reqwest::blocking` request-building
//! (`api/client.rs`) and its retry/backoff discipline
//! (`sourcemaps/upload.rs::upload_to_s3`).

use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use tracing::{info, warn};

use crate::blacklist::Blacklist;
use crate::config::{ClobberPolicy, Config};
use crate::dns::{FamilyPreference, SharedDnsCache};
use crate::error::{CoordinatorError, ExitStatus};
use crate::fetch::auth;
use crate::fetch::cookies::CookieStore;
use crate::fetch::credentials::CredentialStore;
use crate::fetch::save;
use crate::host::{HostId, HostRegistry};
use crate::job::{Job, JobFlags, JobId};
use crate::parsers::{css, html, metalink, sitemap, LinkKind};
use crate::parts::PartDownload;
use crate::queue::JobQueue;
use crate::robots::RobotsPolicy;
use crate::stats::{ProgressSink, StatsSink};
use crate::url_canon::CanonicalUrl;

/// Everything the pipeline needs, shared read-only (or internally
/// synchronized) across every worker thread. Owned by the Main
/// Controller and handed to every worker by reference (spec §9: no
/// reintroduced global mutable state beyond the §5 atomics).
pub struct FetchContext {
    pub config: Arc<Config>,
    pub client: Client,
    pub dns: SharedDnsCache,
    pub hosts: Arc<HostRegistry>,
    pub blacklist: Arc<Blacklist>,
    pub queue: Arc<JobQueue>,
    pub stats: Arc<dyn StatsSink>,
    pub progress: Arc<dyn ProgressSink>,
    pub exit_status: Arc<ExitStatus>,
    pub bytes_downloaded: Arc<AtomicU64>,
    /// In-flight Part Scheduler state, keyed by parent `JobId` (spec §4.6).
    pub parts: Mutex<HashMap<JobId, Arc<PartDownload>>>,
    pub cookies: Arc<dyn CookieStore>,
    pub credentials: Arc<dyn CredentialStore>,
}

pub enum FetchOutcome {
    Completed,
    Dropped,
    Requeued,
}

/// Resolves `url`'s host, seeding a `robots.txt` job the first time a host
/// is seen so it wins the per-host robots prerequisite (spec §4.2 "the
/// first job dispatched for each host is always its robots.txt fetch").
/// Shared by every place the pipeline discovers a new URL (redirects,
/// Metalink/duplicate links, parsed links) and by the input driver for
/// seed URLs.
pub fn resolve_host(ctx: &FetchContext, url: &CanonicalUrl) -> crate::host::HostId {
    let (host_id, is_new) = ctx.hosts.get_or_create(url);
    if is_new && ctx.config.robots_enabled {
        let robots_url = url.join("/robots.txt").unwrap_or_else(|_| url.clone());
        let job = Job::new_robots(robots_url, host_id);
        ctx.hosts.begin_robots_fetch(host_id, job.id);
        ctx.queue.enqueue(job);
    }
    host_id
}

impl FetchContext {
    pub fn quota_exceeded(&self) -> bool {
        match self.config.quota {
            Some(quota) => self.bytes_downloaded.load(Ordering::Relaxed) >= quota,
            None => false,
        }
    }

    pub fn record_bytes(&self, n: u64) {
        self.bytes_downloaded.fetch_add(n, Ordering::Relaxed);
    }
}

/// Runs one non-PART job to completion (spec §4.5 points 3-7). PART jobs
/// are dispatched to `crate::parts` by the worker before this is called.
pub fn run_job(ctx: &FetchContext, job: Job) -> FetchOutcome {
    let host_id = job.host_id;
    let (scheme, host, port) = ctx.hosts.with_host(host_id, |h| (h.scheme.clone(), h.host.clone(), h.port));

    if job.flags != JobFlags::Robots && !ctx.hosts.is_path_allowed(host_id, job.url.path()) {
        info!(url = %job.url, "dropped: disallowed by robots.txt");
        return FetchOutcome::Dropped;
    }

    if ctx.config.https_enforce_hard() && scheme != crate::url_canon::Scheme::Https {
        block_host(ctx, host_id);
        ctx.exit_status.record(CoordinatorError::Connect("https-enforce=hard: no HTTPS available".into()).exit_code());
        return FetchOutcome::Dropped;
    }

    if let Err(e) = ctx.dns.0.resolve(&host, port, FamilyPreference::Any, ctx.config.dns_timeout) {
        warn!(%host, "dns resolution failed: {e}");
        ctx.hosts.record_failure(host_id);
        ctx.exit_status.record(CoordinatorError::Dns(e).exit_code());
        return requeue_or_drop(ctx, job);
    }
    ctx.stats.dns_resolved(&host);

    let response = match send_with_auth_retry(ctx, &job) {
        Ok(r) => r,
        Err(e) => {
            warn!(url = %job.url, "request failed: {e}");
            ctx.hosts.record_failure(host_id);
            ctx.exit_status.record(e.exit_code());
            return requeue_or_drop(ctx, job);
        }
    };
    ctx.stats.tcp_connected(&host, port);
    if scheme == crate::url_canon::Scheme::Https {
        ctx.stats.tls_done(&host);
    }
    record_set_cookies(ctx, &host, &response);

    ctx.hosts.record_success(host_id);
    classify(ctx, job, response)
}

/// Permanently blocks `host_id` and drops every job still sitting in that
/// host's queue (spec §3 invariant: "if blocked, no further jobs for this
/// host are dispatched, ever"). Without draining, those jobs would stay
/// `pending` forever behind a host `dequeue` now refuses to ever serve
/// again, so the queue could never report `empty()` and the controller's
/// shutdown loop would spin forever (spec §4.4, §4.8).
fn block_host(ctx: &FetchContext, host_id: HostId) {
    ctx.hosts.mark_final(host_id);
    ctx.stats.host_blocked(host_id);
    for dropped in ctx.queue.drain_host(host_id) {
        warn!(url = %dropped.url, "dropped: host permanently blocked");
        ctx.stats.job_failed(dropped.id, "host permanently blocked");
    }
}

fn requeue_or_drop(ctx: &FetchContext, mut job: Job) -> FetchOutcome {
    if job.retries + 1 >= ctx.config.tries {
        ctx.stats.job_failed(job.id, "exhausted retries");
        return FetchOutcome::Dropped;
    }
    job.retries += 1;
    let backoff = ctx.config.waitretry.saturating_mul(job.retries);
    std::thread::sleep(backoff.min(Duration::from_secs(60)));
    ctx.queue.enqueue(job);
    FetchOutcome::Requeued
}

fn send_with_auth_retry(ctx: &FetchContext, job: &Job) -> Result<Response, CoordinatorError> {
    let resp = build_and_send(ctx, job, None)?;
    if resp.status() != StatusCode::UNAUTHORIZED {
        return Ok(resp);
    }
    let Some((user, password)) = ctx.credentials.credentials_for(job.url.host()) else {
        return Ok(resp);
    };
    let Some(header) = resp.headers().get(reqwest::header::WWW_AUTHENTICATE) else {
        return Ok(resp);
    };
    let challenges = auth::parse_challenges(header.to_str().unwrap_or(""));
    let Some(challenge) = auth::strongest(&challenges) else {
        return Ok(resp);
    };
    let authorization = auth::authorization_header(challenge, "GET", job.url.path(), &user, &password);
    let retried = build_and_send(ctx, job, Some(authorization))?;
    if retried.status() == StatusCode::UNAUTHORIZED {
        return Err(CoordinatorError::Auth(format!("authentication rejected twice for {}", job.url)));
    }
    Ok(retried)
}

/// Records every `Set-Cookie` header on the response (spec §4.5 point 5
/// lists this explicitly for redirects; applied to every response here
/// since ordinary 2xx responses may set cookies too).
fn record_set_cookies(ctx: &FetchContext, host: &str, response: &Response) {
    for value in response.headers().get_all(reqwest::header::SET_COOKIE) {
        if let Ok(text) = value.to_str() {
            ctx.cookies.record(host, text);
        }
    }
}

fn build_and_send(ctx: &FetchContext, job: &Job, authorization: Option<String>) -> Result<Response, CoordinatorError> {
    let method = if ctx.config.spider { reqwest::Method::HEAD } else { reqwest::Method::GET };
    let mut builder = ctx.client.request(method, job.url.to_url());

    if let Some(referer) = &job.referer {
        builder = builder.header(reqwest::header::REFERER, referer.to_string());
    }
    if let Some(cookie) = ctx.cookies.header_for(job.url.host()) {
        builder = builder.header(reqwest::header::COOKIE, cookie);
    }
    if let Some(auth_header) = authorization {
        builder = builder.header(reqwest::header::AUTHORIZATION, auth_header);
    }
    if ctx.config.continue_download {
        let local = save::local_path(&ctx.config, &job.url);
        if let Ok(metadata) = std::fs::metadata(&local) {
            builder = builder.header(reqwest::header::RANGE, format!("bytes={}-", metadata.len()));
        }
    }
    if ctx.config.timestamping {
        let local = save::local_path(&ctx.config, &job.url);
        if let Ok(metadata) = std::fs::metadata(&local) {
            if let Ok(modified) = metadata.modified() {
                let httpdate: chrono::DateTime<chrono::Utc> = (modified + Duration::from_secs(1)).into();
                builder = builder.header(
                    reqwest::header::IF_MODIFIED_SINCE,
                    httpdate.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
                );
            }
        }
    }

    builder.send().map_err(|e| {
        if e.is_connect() {
            CoordinatorError::Connect(e.to_string())
        } else if e.is_timeout() {
            CoordinatorError::Connect(format!("timed out: {e}"))
        } else {
            CoordinatorError::HttpProtocol(e.to_string())
        }
    })
}

fn classify(ctx: &FetchContext, job: Job, response: Response) -> FetchOutcome {
    let status = response.status();
    if status.is_redirection() {
        return handle_redirect(ctx, job, response);
    }
    match status {
        StatusCode::NOT_MODIFIED => handle_not_modified(ctx, job),
        StatusCode::NOT_FOUND => {
            ctx.exit_status.record(CoordinatorError::RemoteMissing(job.url.to_string()).exit_code());
            FetchOutcome::Dropped
        }
        s if s.is_server_error() => {
            ctx.hosts.record_failure(job.host_id);
            requeue_or_drop(ctx, job)
        }
        s if s.is_success() || s == StatusCode::PARTIAL_CONTENT => handle_success(ctx, job, response),
        other => {
            ctx.exit_status.record(CoordinatorError::HttpProtocol(format!("unexpected status {other}")).exit_code());
            FetchOutcome::Dropped
        }
    }
}

fn handle_not_modified(ctx: &FetchContext, job: Job) -> FetchOutcome {
    info!(url = %job.url, "304: local copy is current");
    if ctx.config.recursive {
        let local = save::local_path(&ctx.config, &job.url);
        if let Ok(bytes) = std::fs::read(&local) {
            discover_and_enqueue(ctx, &job, &bytes, content_type_guess(&local));
        }
    }
    FetchOutcome::Completed
}

fn content_type_guess(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("css") => "text/css",
        Some("xml") => "application/xml",
        _ => "text/html",
    }
}

fn handle_redirect(ctx: &FetchContext, job: Job, response: Response) -> FetchOutcome {
    if job.redirect_depth >= ctx.config.max_redirect {
        ctx.exit_status.record(CoordinatorError::RedirectedTooMany(ctx.config.max_redirect).exit_code());
        return FetchOutcome::Dropped;
    }
    let Some(location) = response.headers().get(reqwest::header::LOCATION).and_then(|v| v.to_str().ok()) else {
        ctx.exit_status.record(CoordinatorError::HttpProtocol("redirect without Location".into()).exit_code());
        return FetchOutcome::Dropped;
    };
    let target = match job.url.join(location) {
        Ok(u) => u,
        Err(e) => {
            ctx.exit_status.record(CoordinatorError::HttpProtocol(format!("bad redirect target: {e}")).exit_code());
            return FetchOutcome::Dropped;
        }
    };
    // Same canonical URL seen twice in *this* chain is a redirect loop
    // (spec §7); tracked on the job itself, not the global `Blacklist`,
    // which is process-wide at-most-once dedup (spec §4.3) and says
    // nothing about whether two different chains converge on one URL.
    if target == job.url || job.redirect_chain.contains(&target) {
        ctx.exit_status.record(CoordinatorError::RedirectedTooMany(ctx.config.max_redirect).exit_code());
        warn!(url = %target, "redirect loop detected");
        return FetchOutcome::Dropped;
    }
    if !ctx.blacklist.try_insert(&target) {
        // Some other chain already reached this URL: ordinary dedup, not
        // a loop (spec §4.3 "at-most-once", silent skip as for discovered
        // links at pipeline.rs's link-discovery path).
        return FetchOutcome::Completed;
    }
    let target_host = resolve_host(ctx, &target);
    let redirect_job = job.redirect_to(target, target_host);
    ctx.queue.enqueue(redirect_job);
    FetchOutcome::Completed
}

fn handle_success(ctx: &FetchContext, job: Job, mut response: Response) -> FetchOutcome {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let content_length = response.content_length();

    if let Some(total) = content_length {
        if let Some(chunk_size) = ctx.config.chunk_size {
            if total > chunk_size && job.metalink.is_none() {
                return crate::parts::start_chunked_download(ctx, job, total, chunk_size);
            }
        }
    }
    if let Some((metalink_url, _is_duplicate)) = metalink_link_header(&response) {
        if let Ok(target) = job.url.join(&metalink_url) {
            if ctx.blacklist.try_insert(&target) {
                let target_host = resolve_host(ctx, &target);
                ctx.queue.enqueue(job.child_link(target, target_host));
            }
            return FetchOutcome::Completed;
        }
    }

    let mut body = Vec::new();
    if ctx.config.spider {
        ctx.stats.response_received(job.id, response.status().as_u16(), 0);
        return FetchOutcome::Completed;
    }
    if let Err(e) = response.read_to_end(&mut body) {
        ctx.exit_status.record(CoordinatorError::Io(e).exit_code());
        return FetchOutcome::Dropped;
    }
    ctx.record_bytes(body.len() as u64);
    ctx.stats.response_received(job.id, response.status().as_u16(), body.len() as u64);
    ctx.progress.slot_complete(job.id);

    if job.flags == JobFlags::Robots {
        let text = String::from_utf8_lossy(&body);
        ctx.hosts.set_robots_policy(job.host_id, RobotsPolicy::parse(&text, &ctx.config.user_agent));
        return FetchOutcome::Completed;
    }

    let path = save::local_path(&ctx.config, &job.url);
    if let Err(e) = save::save(&path, &body, ctx.config.clobber) {
        ctx.exit_status.record(e.exit_code());
        return FetchOutcome::Dropped;
    }

    if content_type.contains("metalink") {
        if let Ok(ml) = metalink::parse(&String::from_utf8_lossy(&body)) {
            return crate::parts::start_metalink_download(ctx, job, ml);
        }
    }

    if ctx.config.recursive || ctx.config.page_requisites {
        discover_and_enqueue(ctx, &job, &body, &content_type);
    }

    if ctx.quota_exceeded() {
        ctx.exit_status.record(CoordinatorError::QuotaExceeded.exit_code());
    }
    FetchOutcome::Completed
}

fn metalink_link_header(response: &Response) -> Option<(String, bool)> {
    let header = response.headers().get(reqwest::header::LINK)?.to_str().ok()?;
    for part in header.split(',') {
        let is_describedby = part.contains("rel=\"describedby\"") || part.contains("rel=describedby");
        let is_metalink_type = part.contains("application/metalink");
        if is_describedby && is_metalink_type {
            if let Some(start) = part.find('<') {
                if let Some(end) = part.find('>') {
                    return Some((part[start + 1..end].to_string(), false));
                }
            }
        }
    }
    None
}

fn discover_and_enqueue(ctx: &FetchContext, job: &Job, body: &[u8], content_type: &str) {
    let text = String::from_utf8_lossy(body);
    let links: Vec<(String, LinkKind)> = if content_type.contains("css") {
        css::extract(&text).into_iter().map(|l| (l.href, l.kind)).collect()
    } else if content_type.contains("xml") {
        sitemap::parse_xml_maybe_gzip(body).into_iter().map(|u| (u, LinkKind::Navigation)).collect()
    } else if content_type.contains("text/plain") {
        sitemap::parse_text(&text).into_iter().map(|u| (u, LinkKind::Navigation)).collect()
    } else {
        html::extract(&text).into_iter().map(|l| (l.href, l.kind)).collect()
    };

    let at_max_depth = job.recursion_level >= ctx.config.level;
    for (href, kind) in links {
        if at_max_depth && kind == LinkKind::Navigation {
            continue; // spec §4.5 rule g: only requisites at max depth.
        }
        if !ctx.config.recursive && kind == LinkKind::Navigation {
            continue;
        }
        let Ok(target) = job.url.join(&href) else { continue };
        if !recursion_allowed(ctx, job, &target) {
            continue;
        }
        if !ctx.blacklist.try_insert(&target) {
            continue;
        }
        let target_host = resolve_host(ctx, &target);
        ctx.queue.enqueue(job.child_link(target, target_host));
    }
}

/// Spec §4.5 recursion rules (a)-(f); rule (g) is applied by the caller
/// before reaching here.
fn recursion_allowed(ctx: &FetchContext, job: &Job, target: &CanonicalUrl) -> bool {
    if job.recursion_level >= ctx.config.level {
        return false;
    }
    if ctx.config.https_only && target.scheme() != &crate::url_canon::Scheme::Https {
        return false;
    }
    if ctx.config.exclude_domains.iter().any(|d| target.host() == d || target.host().ends_with(&format!(".{d}"))) {
        return false;
    }
    if !ctx.config.span_hosts {
        let allowed = target.host() == job.url.host()
            || ctx.config.include_domains.iter().any(|d| target.host() == d || target.host().ends_with(&format!(".{d}")));
        if !allowed {
            return false;
        }
    }
    if ctx.config.no_parent && !target.is_under(&job.url) {
        return false;
    }
    true
}
