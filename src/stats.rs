//! `StatsSink` / `ProgressSink` (spec §9 Design Notes): the coordinator
//! never talks to a terminal directly. Callback-style statistics hooks
//! become small trait interfaces with no-op defaults; a concrete
//! `TracingStatsSink` gives the end-to-end tests something to assert on.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::host::HostId;
use crate::job::JobId;

/// Per-event hooks a Fetch Pipeline calls into (spec §9).
pub trait StatsSink: Send + Sync {
    fn dns_resolved(&self, _host: &str) {}
    fn tcp_connected(&self, _host: &str, _port: u16) {}
    fn tls_done(&self, _host: &str) {}
    fn response_received(&self, _job: JobId, _status: u16, _bytes: u64) {}
    fn job_failed(&self, _job: JobId, _detail: &str) {}
    fn host_blocked(&self, _host: HostId) {}
}

#[derive(Default)]
pub struct NoopStatsSink;

impl StatsSink for NoopStatsSink {}

/// Counts events and logs them with `tracing`; used by integration tests
/// and as the default for `wgrs -v`.
#[derive(Default)]
pub struct TracingStatsSink {
    pub dns_resolutions: AtomicU64,
    pub tcp_connects: AtomicU64,
    pub tls_handshakes: AtomicU64,
    pub responses: AtomicU64,
    pub bytes_received: AtomicU64,
    pub failures: AtomicU64,
}

impl StatsSink for TracingStatsSink {
    fn dns_resolved(&self, host: &str) {
        self.dns_resolutions.fetch_add(1, Ordering::Relaxed);
        info!(host, "dns resolved");
    }

    fn tcp_connected(&self, host: &str, port: u16) {
        self.tcp_connects.fetch_add(1, Ordering::Relaxed);
        info!(host, port, "tcp connected");
    }

    fn tls_done(&self, host: &str) {
        self.tls_handshakes.fetch_add(1, Ordering::Relaxed);
        info!(host, "tls handshake complete");
    }

    fn response_received(&self, job: JobId, status: u16, bytes: u64) {
        self.responses.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        info!(job_id = job.0, status, bytes, "response received");
    }

    fn job_failed(&self, job: JobId, detail: &str) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        info!(job_id = job.0, detail, "job failed");
    }

    fn host_blocked(&self, host: HostId) {
        info!(host_id = host.0, "host blocked");
    }
}

/// Progress interface (spec §9): slot-begin, bytes-downloaded,
/// slot-complete. The terminal progress bar itself is out of scope
/// (spec §1) — only this seam is built.
pub trait ProgressSink: Send + Sync {
    fn slot_begin(&self, _job: JobId, _total: Option<u64>) {}
    fn bytes_downloaded(&self, _job: JobId, _so_far: u64) {}
    fn slot_complete(&self, _job: JobId) {}
}

#[derive(Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {}
