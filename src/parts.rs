//! Part Scheduler (spec §4.6): Metalink and chunked-download piece
//! dispatch, mirror selection and failover, positioned writes, and
//! whole-file hash verification.
//!
//! Hash verification fans out over `rayon`, the same crate and pattern
//! the teacher uses for parallel upload batching
//! (`sourcemaps/upload.rs::into_par_iter`), repurposed here for CPU-bound
//! digest computation instead of network upload.

use std::fs::OpenOptions;
#[cfg(unix)]
use std::os::unix::fs::FileExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use md5::Md5;
use rayon::prelude::*;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::CoordinatorError;
use crate::fetch::save;
use crate::fetch::{FetchContext, FetchOutcome};
use crate::job::{HashAlgorithm, Job, Metalink, PartJob, PartState};

/// State shared by every PART job belonging to one parent job, owned by
/// `FetchContext::parts` (spec §9: explicit long-lived objects, not
/// reintroduced global state).
pub struct PartDownload {
    parent: Job,
    metalink: Arc<Metalink>,
    state: Mutex<PartState>,
    next_worker: AtomicUsize,
}

/// Triggered when a HEAD/GET response reports a Content-Length exceeding
/// `chunk-size` and chunking is enabled (spec §4.6 point ii): builds a
/// synthetic single-mirror Metalink and dispatches PART jobs for it.
pub fn start_chunked_download(ctx: &FetchContext, job: Job, total_size: u64, chunk_size: u64) -> FetchOutcome {
    let filename = save::local_path(&ctx.config, &job.url).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let metalink = Metalink::synthetic_chunked(job.url.clone(), total_size, chunk_size, filename);
    start_metalink_download(ctx, job, metalink)
}

/// Triggered when a Metalink document is parsed yielding >=1 mirror
/// (spec §4.6 point i).
pub fn start_metalink_download(ctx: &FetchContext, job: Job, mut metalink: Metalink) -> FetchOutcome {
    if metalink.mirrors.is_empty() {
        metalink.mirrors.push(crate::job::Mirror { priority: 1, url: job.url.clone(), location: None });
    }
    let piece_count = metalink.pieces.len();
    if piece_count == 0 {
        return FetchOutcome::Completed;
    }

    let path = save::local_path(&ctx.config, &job.url).with_file_name(&metalink.filename);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    // Pre-allocate the destination so positioned writes never race file
    // growth (spec §5: "two workers may write to the same file
    // concurrently but never to overlapping byte ranges").
    if let Ok(file) = OpenOptions::new().create(true).write(true).open(&path) {
        let _ = file.set_len(metalink.total_size);
    }

    let download = Arc::new(PartDownload {
        parent: job.clone(),
        metalink: Arc::new(metalink),
        state: Mutex::new(PartState::new(piece_count)),
        next_worker: AtomicUsize::new(0),
    });
    ctx.parts.lock().unwrap().insert(job.id, download.clone());

    for piece_index in 0..piece_count {
        let mirror_index = download.next_worker.fetch_add(1, Ordering::Relaxed) % download.metalink.mirrors.len();
        let mut part_job = job.child_link(job.url.clone(), job.host_id);
        part_job.part = Some(PartJob { parent: job.id, piece_index, mirror_index });
        ctx.queue.enqueue(part_job);
    }
    FetchOutcome::Completed
}

/// Runs one PART job: `Range` request against the selected mirror, then
/// a positioned write at the piece's offset (spec §4.6).
pub fn run_part_job(ctx: &FetchContext, job: Job) -> FetchOutcome {
    let part = job.part.clone().expect("run_part_job called with a non-PART job");
    let Some(download) = ctx.parts.lock().unwrap().get(&part.parent).cloned() else {
        warn!(job_id = job.id.0, "part job for unknown parent, dropping");
        return FetchOutcome::Dropped;
    };

    let piece = &download.metalink.pieces[part.piece_index];
    let mirror_count = download.metalink.mirrors.len();
    let mirror_index = part.mirror_index % mirror_count;
    let mirror = &download.metalink.mirrors[mirror_index];

    let range = format!("bytes={}-{}", piece.position, piece.position + piece.length - 1);
    let result = ctx
        .client
        .get(mirror.url.to_url())
        .header(reqwest::header::RANGE, range)
        .send()
        .map_err(|e| CoordinatorError::Connect(e.to_string()))
        .and_then(|resp| {
            if resp.status().is_success() || resp.status() == reqwest::StatusCode::PARTIAL_CONTENT {
                resp.bytes().map_err(|e| CoordinatorError::HttpProtocol(e.to_string()))
            } else {
                Err(CoordinatorError::HttpProtocol(format!("mirror returned {}", resp.status())))
            }
        });

    let bytes = match result {
        Ok(b) => b,
        Err(e) => {
            warn!(mirror = %mirror.url, piece = part.piece_index, "part fetch failed: {e}");
            let (host_id, _) = ctx.hosts.get_or_create(&mirror.url);
            ctx.hosts.record_failure(host_id);
            if part.mirror_index + 1 >= mirror_count * 3 {
                ctx.stats.job_failed(job.id, "exhausted mirror retries for part");
                return FetchOutcome::Dropped;
            }
            let mut retry_job = job.clone();
            retry_job.part = Some(PartJob { parent: part.parent, piece_index: part.piece_index, mirror_index: part.mirror_index + 1 });
            ctx.queue.enqueue(retry_job);
            return FetchOutcome::Requeued;
        }
    };

    if let Err(e) = write_piece(ctx, &download, piece.position, &bytes) {
        ctx.exit_status.record(e.exit_code());
        return FetchOutcome::Dropped;
    }
    ctx.record_bytes(bytes.len() as u64);

    let all_done = {
        let mut state = download.state.lock().unwrap();
        state.done[part.piece_index] = true;
        state.all_done()
    };

    if all_done {
        ctx.parts.lock().unwrap().remove(&part.parent);
        finish_download(ctx, &download);
    }
    FetchOutcome::Completed
}

#[cfg(unix)]
fn write_piece(ctx: &FetchContext, download: &PartDownload, position: u64, bytes: &[u8]) -> Result<(), CoordinatorError> {
    let path = save::local_path(&ctx.config, &download.parent.url).with_file_name(&download.metalink.filename);
    let file = OpenOptions::new().write(true).open(&path)?;
    file.write_at(bytes, position)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_piece(ctx: &FetchContext, download: &PartDownload, position: u64, bytes: &[u8]) -> Result<(), CoordinatorError> {
    use std::io::{Seek, SeekFrom, Write as _};
    let path = save::local_path(&ctx.config, &download.parent.url).with_file_name(&download.metalink.filename);
    let mut file = OpenOptions::new().write(true).open(&path)?;
    file.seek(SeekFrom::Start(position))?;
    file.write_all(bytes)?;
    Ok(())
}

/// Whole-file hash verification once every part is `done` (spec §4.6).
/// Per-piece hashes (if any) are checked in parallel via `rayon`; the
/// whole-file hash (if any) is checked after.
fn finish_download(ctx: &FetchContext, download: &PartDownload) {
    let path = save::local_path(&ctx.config, &download.parent.url).with_file_name(&download.metalink.filename);
    let Ok(data) = std::fs::read(&path) else {
        warn!(path = %path.display(), "could not reread completed download for verification");
        return;
    };
    let data = Arc::new(data);

    let piece_results: Vec<bool> = download
        .metalink
        .pieces
        .par_iter()
        .map(|piece| match &piece.hash {
            Some(hash) => {
                let start = piece.position as usize;
                let end = (piece.position + piece.length) as usize;
                let slice = &data[start.min(data.len())..end.min(data.len())];
                digest_hex(hash.algorithm, slice) == hash.digest_hex
            }
            None => true,
        })
        .collect();

    if piece_results.iter().any(|ok| !ok) {
        ctx.exit_status.record(CoordinatorError::Integrity(format!("piece hash mismatch for {}", download.metalink.filename)).exit_code());
        warn!(file = %download.metalink.filename, "piece hash verification failed");
        return;
    }

    if let Some(hash) = &download.metalink.whole_file_hash {
        if digest_hex(hash.algorithm, &data) != hash.digest_hex {
            ctx.exit_status.record(CoordinatorError::Integrity(format!("whole-file hash mismatch for {}", download.metalink.filename)).exit_code());
            warn!(file = %download.metalink.filename, "whole-file hash verification failed");
            return;
        }
    }
    info!(file = %download.metalink.filename, pieces = download.metalink.pieces.len(), "metalink download complete and verified");
}

fn digest_hex(algorithm: HashAlgorithm, data: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let digest = Sha256::digest(data);
            digest.iter().map(|b| format!("{b:02x}")).collect()
        }
        HashAlgorithm::Sha1 => {
            let digest = Sha1::digest(data);
            digest.iter().map(|b| format!("{b:02x}")).collect()
        }
        HashAlgorithm::Md5 => {
            let digest = Md5::digest(data);
            digest.iter().map(|b| format!("{b:02x}")).collect()
        }
    }
}
