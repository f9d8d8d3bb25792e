//! Worker Pool (spec §4.5 points 1-2): a fixed pool of N OS threads, each
//! looping dequeue → dispatch → complete, with `--wait`/`--random-wait`
//! pacing between dispatches. Grounded in the teacher's retry/backoff loop
//! (`sourcemaps/upload.rs::upload_to_s3`) for the overall shape, and in
//! the teacher's own jitter idiom (`rust/cyclotron-fetch/src/fetch.rs`,
//! `.auto-resolution/rust/property-defs-rs/src/batch_ingestion.rs`:
//! `rand::random::<u64>() % N`) for `--random-wait`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::fetch::pipeline::{self, FetchContext};
use crate::job::Job;
use crate::parts;
use crate::queue::Dequeued;

/// Runs one worker's main loop until told to stop (spec §4.5 point 1):
/// "if none and the input driver is closed and no work is in flight,
/// exit. Otherwise sleep on a condition variable that is signalled by
/// `enqueue` and by the input driver closing."
pub fn run(ctx: Arc<FetchContext>, terminate: Arc<AtomicBool>, input_closed: Arc<AtomicBool>) {
    let mut dispatched_one = false;
    loop {
        if terminate.load(Ordering::SeqCst) {
            debug!("worker observed terminate flag, exiting");
            return;
        }

        match ctx.queue.dequeue(Instant::now(), &ctx.hosts) {
            Dequeued::Job(job) => {
                pace(&ctx, &mut dispatched_one);
                let host_id = job.host_id;
                dispatch(&ctx, job);
                ctx.queue.complete(host_id);
            }
            Dequeued::WaitUntil(deadline) => {
                ctx.queue.wait_for_work(deadline);
            }
            Dequeued::Empty => {
                if input_closed.load(Ordering::SeqCst) {
                    debug!("queue drained and input closed, worker exiting");
                    return;
                }
                // Nothing pending yet, but the input driver may still
                // enqueue seeds; poll rather than busy-loop.
                ctx.queue.wait_for_work(Instant::now() + Duration::from_millis(200));
            }
        }
    }
}

fn dispatch(ctx: &FetchContext, job: Job) {
    if job.part.is_some() {
        parts::run_part_job(ctx, job);
    } else {
        pipeline::run_job(ctx, job);
    }
}

/// Applies `--wait`/`--random-wait` between dispatches (spec §6 CLI
/// surface). The first job a worker ever dispatches is never delayed.
fn pace(ctx: &FetchContext, dispatched_one: &mut bool) {
    if !*dispatched_one {
        *dispatched_one = true;
        return;
    }
    if ctx.config.wait.is_zero() {
        return;
    }
    let delay = if ctx.config.random_wait { jittered(ctx.config.wait) } else { ctx.config.wait };
    std::thread::sleep(delay);
}

/// Randomizes a wait between 0.5x and 1.5x of the configured base
/// (spec §6 `--random-wait` doc: "Randomize the wait between 0.5x and
/// 1.5x of `--wait`"), using the teacher's `rand::random::<u64>() % N`
/// jitter idiom rather than a full-featured distribution.
fn jittered(base: Duration) -> Duration {
    let base_millis = (base.as_millis() as u64).max(1);
    let jitter = rand::random::<u64>() % (base_millis + 1);
    Duration::from_millis(base_millis / 2 + jitter)
}
