//! Job Queue (spec §4.4): global queue of pending jobs, segmented by
//! host, with pop-by-availability semantics. One coarse mutex plus two
//! condition variables (spec §5): `work_available` (signalled on enqueue
//! and on input-closed) and `work_completed` (signalled on job
//! completion). Critical sections never perform network I/O.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::Instant;

use tracing::trace;

use crate::host::{HostId, HostRegistry};
use crate::job::{Job, JobFlags};

/// Default concurrent in-flight connections allowed per host (spec §8:
/// "for all hosts H, at any instant the number of concurrent in-flight
/// connections to H is <= min(N, per-host-limit); default per-host-limit
/// = 1").
const DEFAULT_PER_HOST_LIMIT: usize = 1;

struct HostQueue {
    robots_job: Option<Job>,
    pending: VecDeque<Job>,
    in_flight: usize,
}

impl HostQueue {
    fn new() -> Self {
        HostQueue { robots_job: None, pending: VecDeque::new(), in_flight: 0 }
    }

    fn is_empty(&self) -> bool {
        self.robots_job.is_none() && self.pending.is_empty()
    }
}

struct State {
    hosts: HashMap<HostId, HostQueue>,
    host_order: VecDeque<HostId>,
    in_flight: usize,
}

pub enum Dequeued {
    Job(Job),
    /// No host is ready right now; retry after this instant.
    WaitUntil(Instant),
    /// No pending jobs and nothing in flight.
    Empty,
}

/// `enqueue(job)`, `dequeue(now) -> job | wait-until | empty`,
/// `complete(job)`, `size()` (spec §4.4 contract).
pub struct JobQueue {
    state: Mutex<State>,
    work_available: Condvar,
    work_completed: Condvar,
    per_host_limit: usize,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::with_per_host_limit(DEFAULT_PER_HOST_LIMIT)
    }

    pub fn with_per_host_limit(per_host_limit: usize) -> Self {
        JobQueue {
            state: Mutex::new(State { hosts: HashMap::new(), host_order: VecDeque::new(), in_flight: 0 }),
            work_available: Condvar::new(),
            work_completed: Condvar::new(),
            per_host_limit: per_host_limit.max(1),
        }
    }

    pub fn enqueue(&self, job: Job) {
        let mut state = self.state.lock().unwrap();
        let host_id = job.host_id;
        let is_robots = job.flags == JobFlags::Robots;
        let hq = state.hosts.entry(host_id).or_insert_with(HostQueue::new);
        let was_empty = hq.is_empty();
        if is_robots {
            hq.robots_job = Some(job);
        } else {
            hq.pending.push_back(job);
        }
        if was_empty {
            state.host_order.push_back(host_id);
        }
        trace!(?host_id, "job enqueued");
        drop(state);
        self.work_available.notify_all();
    }

    /// Pops the first ready job. A host is ready iff its robots
    /// prerequisite is satisfied (or the popped job *is* the robots job)
    /// and `HostRegistry` reports `earliest_retry <= now` and not
    /// blocked (spec §4.4 ordering rule).
    pub fn dequeue(&self, now: Instant, registry: &HostRegistry) -> Dequeued {
        let mut state = self.state.lock().unwrap();
        let mut earliest_wait: Option<Instant> = None;
        let host_ids: Vec<HostId> = state.host_order.iter().copied().collect();

        for host_id in host_ids {
            let blocked_or_not_ready = registry.with_host(host_id, |h| {
                if h.is_blocked() {
                    return (true, None);
                }
                match h.earliest_retry() {
                    Some(t) if t > now => (true, Some(t)),
                    _ => (false, None),
                }
            });
            if blocked_or_not_ready.0 {
                if !registry.with_host(host_id, |h| h.is_blocked()) {
                    if let Some(t) = blocked_or_not_ready.1 {
                        earliest_wait = Some(earliest_wait.map_or(t, |cur| cur.min(t)));
                    }
                }
                continue;
            }

            let robots_satisfied = registry.with_host(host_id, |h| h.robots_satisfied());
            let Some(hq) = state.hosts.get_mut(&host_id) else { continue };

            if hq.in_flight >= self.per_host_limit {
                // At the per-host concurrency cap (spec §8); this host
                // will free up when its in-flight job completes, not at
                // a fixed time, so fall through to the generic poll wait.
                continue;
            }

            if !robots_satisfied {
                if let Some(job) = hq.robots_job.take() {
                    hq.in_flight += 1;
                    self.prune_host_if_empty(&mut state, host_id);
                    state.in_flight += 1;
                    return Dequeued::Job(job);
                }
                // robots fetch already in flight for this host: not ready.
                continue;
            }

            if let Some(job) = hq.pending.pop_front() {
                hq.in_flight += 1;
                self.prune_host_if_empty(&mut state, host_id);
                state.in_flight += 1;
                return Dequeued::Job(job);
            }
        }

        if let Some(wait) = earliest_wait {
            return Dequeued::WaitUntil(wait);
        }
        if self.is_drained(&state) {
            Dequeued::Empty
        } else {
            // Every remaining host is blocked or has nothing ready, and
            // nothing has an explicit retry time (e.g. waiting on an
            // in-flight robots fetch elsewhere); caller should wait on
            // the condvar rather than busy-loop.
            Dequeued::WaitUntil(now + std::time::Duration::from_millis(200))
        }
    }

    fn prune_host_if_empty(&self, state: &mut State, host_id: HostId) {
        if let Some(hq) = state.hosts.get(&host_id) {
            if hq.is_empty() {
                state.host_order.retain(|h| *h != host_id);
            }
        }
    }

    fn is_drained(&self, state: &State) -> bool {
        state.in_flight == 0 && state.hosts.values().all(|hq| hq.is_empty())
    }

    /// Removes every job still pending for `host_id` — its robots job, if
    /// any, plus its FIFO — and returns them. A permanently blocked host
    /// (spec §3 invariant: "if blocked, no further jobs for this host are
    /// dispatched, ever") must never leave jobs sitting in `pending`,
    /// since `dequeue` will skip that host forever and `is_drained`/
    /// `empty()` would then never observe the queue as drained (spec §4.4
    /// shutdown predicate). Does not touch `in_flight`: a job already
    /// dispatched to a worker still completes normally via `complete`.
    pub fn drain_host(&self, host_id: HostId) -> Vec<Job> {
        let mut state = self.state.lock().unwrap();
        let mut dropped = Vec::new();
        if let Some(hq) = state.hosts.get_mut(&host_id) {
            dropped.extend(hq.robots_job.take());
            dropped.extend(hq.pending.drain(..));
        }
        self.prune_host_if_empty(&mut state, host_id);
        drop(state);
        if !dropped.is_empty() {
            self.work_completed.notify_all();
        }
        dropped
    }

    /// Marks the in-flight job for `host_id` as finished, freeing up one
    /// of that host's concurrency slots (spec §4.4 `complete(job)`).
    pub fn complete(&self, host_id: HostId) {
        let mut state = self.state.lock().unwrap();
        state.in_flight = state.in_flight.saturating_sub(1);
        if let Some(hq) = state.hosts.get_mut(&host_id) {
            hq.in_flight = hq.in_flight.saturating_sub(1);
        }
        drop(state);
        self.work_completed.notify_all();
        self.work_available.notify_all();
    }

    pub fn size(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.hosts.values().map(|hq| hq.pending.len() + hq.robots_job.is_some() as usize).sum()
    }

    /// True iff no job is pending and no worker is in-flight (spec §4.4:
    /// the shutdown predicate).
    pub fn empty(&self) -> bool {
        let state = self.state.lock().unwrap();
        self.is_drained(&state)
    }

    /// Blocks the calling worker until new work might be available, or
    /// until `deadline`, whichever comes first. Used when `dequeue`
    /// returns `WaitUntil`.
    pub fn wait_for_work(&self, deadline: Instant) {
        let state = self.state.lock().unwrap();
        let now = Instant::now();
        if deadline > now {
            let _ = self.work_available.wait_timeout(state, deadline - now).unwrap();
        }
    }

    /// Wakes every worker blocked in `wait_for_work`, used when the input
    /// driver closes (spec §4.5 point 1, §4.7).
    pub fn notify_closed(&self) {
        self.work_available.notify_all();
    }

    #[cfg(test)]
    pub fn wait_for_completion(&self) {
        let mut state = self.state.lock().unwrap();
        while !self.is_drained(&state) {
            state = self.work_completed.wait(state).unwrap();
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url_canon::CanonicalUrl;

    fn job_for(registry: &HostRegistry, url: &str) -> Job {
        let u = CanonicalUrl::parse(url).unwrap();
        let (host_id, _) = registry.get_or_create(&u);
        Job::new_seed(u, host_id)
    }

    #[test]
    fn fifo_within_a_host() {
        let registry = HostRegistry::new(false);
        let queue = JobQueue::new();
        let a = job_for(&registry, "http://example.com/a");
        let b = job_for(&registry, "http://example.com/b");
        let host_id = a.host_id;
        queue.enqueue(a.clone());
        queue.enqueue(b.clone());
        match queue.dequeue(Instant::now(), &registry) {
            Dequeued::Job(j) => assert_eq!(j.id, a.id),
            _ => panic!("expected a job"),
        }
        queue.complete(host_id);
        match queue.dequeue(Instant::now(), &registry) {
            Dequeued::Job(j) => assert_eq!(j.id, b.id),
            _ => panic!("expected a job"),
        }
    }

    #[test]
    fn per_host_limit_caps_concurrent_in_flight_jobs() {
        let registry = HostRegistry::new(false);
        let queue = JobQueue::new();
        let a = job_for(&registry, "http://example.com/a");
        let b = job_for(&registry, "http://example.com/b");
        let host_id = a.host_id;
        queue.enqueue(a.clone());
        queue.enqueue(b.clone());

        match queue.dequeue(Instant::now(), &registry) {
            Dequeued::Job(j) => assert_eq!(j.id, a.id),
            _ => panic!("expected the first job"),
        }
        // Host is already at its per-host limit (default 1): the second
        // job must not be dispatched yet, even though it's ready.
        assert!(matches!(queue.dequeue(Instant::now(), &registry), Dequeued::WaitUntil(_)));

        queue.complete(host_id);
        match queue.dequeue(Instant::now(), &registry) {
            Dequeued::Job(j) => assert_eq!(j.id, b.id),
            _ => panic!("expected the second job once the slot freed up"),
        }
    }

    #[test]
    fn robots_job_dispatched_before_other_jobs_for_host() {
        let registry = HostRegistry::new(true);
        let queue = JobQueue::new();
        let u = CanonicalUrl::parse("http://example.com/page.html").unwrap();
        let (host_id, _) = registry.get_or_create(&u);
        let robots_url = CanonicalUrl::parse("http://example.com/robots.txt").unwrap();
        let robots_job = Job::new_robots(robots_url, host_id);
        let page_job = Job::new_seed(u, host_id);

        queue.enqueue(page_job.clone());
        queue.enqueue(robots_job.clone());

        match queue.dequeue(Instant::now(), &registry) {
            Dequeued::Job(j) => assert_eq!(j.id, robots_job.id),
            _ => panic!("expected the robots job first"),
        }
        // Page job must not be dispatched until robots is resolved.
        assert!(matches!(queue.dequeue(Instant::now(), &registry), Dequeued::WaitUntil(_)));

        registry.set_robots_policy(host_id, crate::robots::RobotsPolicy::allow_all());
        // The robots fetch itself completes before its host's single
        // concurrency slot is free for the next job (spec §8 per-host cap).
        queue.complete(host_id);
        match queue.dequeue(Instant::now(), &registry) {
            Dequeued::Job(j) => assert_eq!(j.id, page_job.id),
            _ => panic!("expected the page job once robots resolved"),
        }
    }

    #[test]
    fn blocked_host_never_dequeues() {
        let registry = HostRegistry::new(false);
        let queue = JobQueue::new();
        let job = job_for(&registry, "http://example.com/a");
        registry.mark_final(job.host_id);
        queue.enqueue(job);
        assert!(matches!(queue.dequeue(Instant::now(), &registry), Dequeued::WaitUntil(_)));
    }

    #[test]
    fn draining_a_blocked_host_lets_the_queue_report_empty() {
        // Without draining, a job left pending behind a permanently
        // blocked host means `dequeue` skips it forever and `empty()`
        // never becomes true, hanging the controller's shutdown loop.
        let registry = HostRegistry::new(false);
        let queue = JobQueue::new();
        let a = job_for(&registry, "http://example.com/a");
        let b = job_for(&registry, "http://example.com/b");
        let host_id = a.host_id;
        queue.enqueue(a.clone());
        queue.enqueue(b.clone());
        assert!(!queue.empty());

        registry.mark_final(host_id);
        let dropped = queue.drain_host(host_id);
        assert_eq!(dropped.iter().map(|j| j.id).collect::<Vec<_>>(), vec![a.id, b.id]);
        assert!(queue.empty(), "draining the blocked host's pending jobs must make the queue report empty");
    }

    #[test]
    fn draining_a_blocked_host_also_removes_its_pending_robots_job() {
        let registry = HostRegistry::new(true);
        let queue = JobQueue::new();
        let u = CanonicalUrl::parse("http://example.com/a").unwrap();
        let (host_id, _) = registry.get_or_create(&u);
        let robots_url = CanonicalUrl::parse("http://example.com/robots.txt").unwrap();
        let robots_job = Job::new_robots(robots_url, host_id);
        queue.enqueue(robots_job.clone());

        registry.mark_final(host_id);
        let dropped = queue.drain_host(host_id);
        assert_eq!(dropped.iter().map(|j| j.id).collect::<Vec<_>>(), vec![robots_job.id]);
        assert!(queue.empty());
    }

    #[test]
    fn empty_queue_with_no_in_flight_reports_empty() {
        let registry = HostRegistry::new(false);
        let queue = JobQueue::new();
        assert!(matches!(queue.dequeue(Instant::now(), &registry), Dequeued::Empty));
        let job = job_for(&registry, "http://example.com/a");
        queue.enqueue(job);
        assert!(!queue.empty());
        let dequeued = queue.dequeue(Instant::now(), &registry);
        let host_id = match dequeued {
            Dequeued::Job(j) => j.host_id,
            _ => panic!("expected a job"),
        };
        assert!(!queue.empty(), "in-flight job keeps queue non-empty");
        queue.complete(host_id);
        assert!(queue.empty());
    }
}
