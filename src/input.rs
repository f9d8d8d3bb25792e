//! Input Driver (spec §4.7): turns CLI positionals, `--input-file`, and
//! stdin into seed Jobs. Streaming stdin runs on its own thread, the
//! teacher's background-thread-reporting shape
//! (`invocation_context.rs::capture_command_invoked`) adapted from
//! fire-and-forget reporting to a producer that must signal when it's
//! done so workers know to stop waiting for more seeds.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::error::CoordinatorError;
use crate::fetch::pipeline::{resolve_host, FetchContext};
use crate::job::Job;
use crate::parsers::{css, html, sitemap};
use crate::url_canon::CanonicalUrl;

/// Spawns the input driver on a dedicated thread and returns its handle
/// plus the `input_closed` flag the worker pool polls (spec §4.7: "closing
/// the input signals the main controller").
pub fn spawn(ctx: Arc<FetchContext>) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let closed = Arc::new(AtomicBool::new(false));
    let closed_for_thread = closed.clone();
    let handle = std::thread::spawn(move || {
        run(&ctx);
        closed_for_thread.store(true, Ordering::SeqCst);
        ctx.queue.notify_closed();
        info!("input driver closed");
    });
    (handle, closed)
}

fn run(ctx: &FetchContext) {
    for raw in &ctx.config.seeds {
        enqueue_seed(ctx, raw);
    }

    let Some(path) = ctx.config.input_file.clone() else { return };
    if path.as_os_str() == "-" {
        read_stdin(ctx);
    } else {
        read_file(ctx, &path);
    }
}

fn read_stdin(ctx: &FetchContext) {
    use std::io::BufRead;
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    enqueue_seed(ctx, trimmed);
                }
            }
            Err(e) => {
                warn!("error reading stdin: {e}");
                break;
            }
        }
    }
}

fn read_file(ctx: &FetchContext, path: &Path) {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!(path = %path.display(), "could not read input file: {e}");
            ctx.exit_status.record(CoordinatorError::Io(e).exit_code());
            return;
        }
    };

    if let Some(urls) = extract_as_document(path, &bytes) {
        for url in urls {
            enqueue_seed(ctx, &url);
        }
        return;
    }

    for line in String::from_utf8_lossy(&bytes).lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            enqueue_seed(ctx, trimmed);
        }
    }
}

/// HTML/CSS/XML-sitemap input files are parsed directly for URLs without
/// a network fetch (spec §4.7); anything else falls back to one seed URL
/// per non-empty, non-comment line in `read_file`.
fn extract_as_document(path: &Path, bytes: &[u8]) -> Option<Vec<String>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => {
            Some(html::extract(&String::from_utf8_lossy(bytes)).into_iter().map(|l| l.href).collect())
        }
        Some("css") => Some(css::extract(&String::from_utf8_lossy(bytes)).into_iter().map(|l| l.href).collect()),
        Some("xml") => Some(sitemap::parse_xml_maybe_gzip(bytes)),
        _ => None,
    }
}

fn enqueue_seed(ctx: &FetchContext, raw: &str) {
    let url = match CanonicalUrl::parse(raw) {
        Ok(u) => u,
        Err(e) => {
            warn!(seed = raw, "skipping unparseable seed URL: {e}");
            ctx.exit_status.record(CoordinatorError::Input(format!("bad seed URL {raw:?}: {e}")).exit_code());
            return;
        }
    };
    if !ctx.blacklist.try_insert(&url) {
        return;
    }
    let host_id = resolve_host(ctx, &url);
    info!(url = %url, "seed enqueued");
    ctx.queue.enqueue(Job::new_seed(url, host_id));
}
