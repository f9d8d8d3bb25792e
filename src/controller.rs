//! Main Controller (spec §4.8): starts the worker pool and the input
//! driver, then waits on the "job completed" condition to decide when
//! to signal shutdown. Grounded in the teacher's
//! `InvocationContext::finish()` (`invocation_context.rs`): a
//! `Mutex<Vec<JoinHandle<()>>>` collected at startup and drained/joined
//! at the end, generalized here to worker threads instead of
//! fire-and-forget analytics uploads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{CoordinatorError, ExitCode};
use crate::fetch::FetchContext;
use crate::worker;

/// Polling granularity for the controller's own wake loop (spec §4.8
/// points a-c): it has nothing of its own to block on beyond "is the
/// queue now empty", so it polls rather than sharing the queue's
/// condvars directly.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs the coordinator to completion: spawns `threads` workers plus the
/// input driver, waits for the shutdown condition, joins every thread,
/// and returns the final exit status (spec §4.8 "Exit status is the
/// minimum non-zero status among the taxonomy in §7").
pub fn run(ctx: Arc<FetchContext>, needs_input_driver: bool) -> u8 {
    let terminate = Arc::new(AtomicBool::new(false));
    let sigint = Arc::new(AtomicBool::new(false));
    install_signal_handlers(terminate.clone(), sigint.clone());

    let (input_handle, input_closed) = if needs_input_driver {
        let (handle, closed) = crate::input::spawn(ctx.clone());
        (Some(handle), closed)
    } else {
        (None, Arc::new(AtomicBool::new(true)))
    };

    let mut worker_handles = Vec::with_capacity(ctx.config.threads);
    for worker_id in 0..ctx.config.threads {
        let ctx = ctx.clone();
        let terminate = terminate.clone();
        let input_closed = input_closed.clone();
        worker_handles.push(
            thread::Builder::new()
                .name(format!("wgrs-worker-{worker_id}"))
                .spawn(move || worker::run(ctx, terminate, input_closed))
                .expect("failed to spawn worker thread"),
        );
    }

    loop {
        if sigint.load(Ordering::SeqCst) {
            // SIGINT aborts without a graceful drain (spec §4.8 point d).
            info!("SIGINT received, aborting");
            std::process::exit(ExitCode::Generic.as_u8() as i32);
        }
        if terminate.load(Ordering::SeqCst) {
            info!("SIGTERM received, draining in-flight work before shutdown");
            break;
        }
        if ctx.quota_exceeded() {
            info!("download quota reached, signalling shutdown");
            ctx.exit_status.record(CoordinatorError::QuotaExceeded.exit_code());
            terminate.store(true, Ordering::SeqCst);
            break;
        }
        if ctx.queue.empty() && input_closed.load(Ordering::SeqCst) {
            debug!("queue drained and input closed, shutting down");
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    // Wake any worker still parked on the queue's condvar so it notices
    // `terminate`/drained-and-closed promptly instead of waiting out its
    // poll timeout (spec §4.5 point 1: signalled "by `enqueue` and by the
    // input driver closing").
    terminate.store(true, Ordering::SeqCst);
    ctx.queue.notify_closed();

    if let Some(handle) = input_handle {
        let _ = handle.join();
    }
    for handle in worker_handles {
        let _ = handle.join();
    }

    ctx.exit_status.current()
}

/// SIGTERM sets the terminate flag (graceful drain); SIGINT sets a
/// separate flag the controller checks first and aborts on immediately
/// (spec §4.8 points c/d). Grounded in the wider pack's reach for a real
/// signal-handling crate over hand-rolled `libc` calls
/// (`signal-hook`, used the same way by `Dicklesworthstone-asupersync`).
fn install_signal_handlers(terminate: Arc<AtomicBool>, sigint: Arc<AtomicBool>) {
    if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGTERM, terminate) {
        debug!("could not install SIGTERM handler: {e}");
    }
    if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGINT, sigint) {
        debug!("could not install SIGINT handler: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex;

    use crate::blacklist::Blacklist;
    use crate::cli::Cli;
    use crate::config::Config;
    use crate::dns::{SharedDnsCache, SystemResolver};
    use crate::error::ExitStatus;
    use crate::fetch::client::build_client;
    use crate::fetch::cookies::InMemoryCookieStore;
    use crate::fetch::credentials::InMemoryCredentialStore;
    use crate::host::HostRegistry;
    use crate::queue::JobQueue;
    use crate::stats::{NoopProgressSink, NoopStatsSink};
    use clap::Parser;

    fn test_ctx(args: &[&str]) -> Arc<FetchContext> {
        let full: Vec<String> = std::iter::once("wgrs".to_string()).chain(args.iter().map(|s| s.to_string())).collect();
        let cli = Cli::parse_from(full);
        let config = Arc::new(Config::from_cli(cli).unwrap());
        Arc::new(FetchContext {
            client: build_client(&config).unwrap(),
            dns: SharedDnsCache::new(Box::new(SystemResolver)),
            hosts: Arc::new(HostRegistry::new(config.robots_enabled)),
            blacklist: Arc::new(Blacklist::new()),
            queue: Arc::new(JobQueue::new()),
            stats: Arc::new(NoopStatsSink),
            progress: Arc::new(NoopProgressSink),
            exit_status: Arc::new(ExitStatus::new()),
            bytes_downloaded: Arc::new(AtomicU64::new(0)),
            parts: Mutex::new(HashMap::new()),
            cookies: Arc::new(InMemoryCookieStore::new()),
            credentials: Arc::new(InMemoryCredentialStore::new(config.user.clone(), config.password.clone())),
            config,
        })
    }

    #[test]
    fn zero_quota_shuts_down_immediately_with_generic_exit_status() {
        // A zero quota trips the controller's shutdown check on its very
        // first poll, regardless of whether the single seed job (an
        // address nothing listens on) ever resolves.
        let ctx = test_ctx(&["--quota=0", "--threads=1", "http://127.0.0.1:9/"]);
        let status = run(ctx, true);
        assert_eq!(status, ExitCode::Generic.as_u8());
    }

    #[test]
    fn no_input_driver_and_nothing_enqueued_shuts_down_with_success() {
        let ctx = test_ctx(&["--threads=1", "http://127.0.0.1:9/"]);
        // Seeds are normally enqueued by the input driver; skipping it
        // here (`needs_input_driver = false`) means the queue never
        // receives the CLI seed, so the controller sees "empty and
        // closed" on its very first poll.
        let status = run(ctx, false);
        assert_eq!(status, ExitCode::Success.as_u8());
    }
}
