//! Job, Part, and Metalink data types (spec §3).

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::host::HostId;
use crate::url_canon::CanonicalUrl;

static NEXT_JOB_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u32);

fn next_job_id() -> JobId {
    JobId(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
}

/// One mirror: an interchangeable origin URL for the same file, with a
/// priority (spec §3, GLOSSARY). Mirrors are sorted ascending by priority
/// at parse time.
#[derive(Debug, Clone)]
pub struct Mirror {
    pub priority: u32,
    pub url: CanonicalUrl,
    pub location: Option<String>,
}

/// One byte-range piece of a Metalink/chunked file (spec §3).
#[derive(Debug, Clone)]
pub struct Piece {
    pub position: u64,
    pub length: u64,
    pub hash: Option<PieceHash>,
}

#[derive(Debug, Clone)]
pub struct PieceHash {
    pub algorithm: HashAlgorithm,
    pub digest_hex: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

/// A Metalink document: total size, filename, ordered pieces, ordered
/// mirrors (spec §3). Also used to model a plain chunked download: a
/// synthetic Metalink with the origin URL as the sole mirror and
/// fixed-size pieces (spec §4.6).
#[derive(Debug, Clone)]
pub struct Metalink {
    pub total_size: u64,
    pub filename: String,
    pub pieces: Vec<Piece>,
    pub mirrors: Vec<Mirror>,
    /// Whole-file hash, checked after all pieces are done (spec §4.6).
    pub whole_file_hash: Option<PieceHash>,
}

impl Metalink {
    /// Builds the synthetic single-mirror, fixed-size-piece Metalink used
    /// for plain chunked downloads (spec §4.6 point ii).
    pub fn synthetic_chunked(origin: CanonicalUrl, total_size: u64, chunk_size: u64, filename: String) -> Self {
        let mut pieces = Vec::new();
        let mut pos = 0u64;
        while pos < total_size {
            let len = chunk_size.min(total_size - pos);
            pieces.push(Piece {
                position: pos,
                length: len,
                hash: None,
            });
            pos += len;
        }
        Metalink {
            total_size,
            filename,
            pieces,
            mirrors: vec![Mirror {
                priority: 1,
                url: origin,
                location: None,
            }],
            whole_file_hash: None,
        }
    }

    /// Sorts mirrors ascending by priority, per spec §3.
    pub fn sort_mirrors(&mut self) {
        self.mirrors.sort_by_key(|m| m.priority);
    }
}

/// Tracks completion of each piece of a job with `parts` (spec §3
/// invariant: "a job with parts is done iff all parts are done").
#[derive(Debug)]
pub struct PartState {
    pub done: Vec<bool>,
    pub in_use: Vec<bool>,
}

impl PartState {
    pub fn new(count: usize) -> Self {
        PartState {
            done: vec![false; count],
            in_use: vec![false; count],
        }
    }

    pub fn all_done(&self) -> bool {
        self.done.iter().all(|d| *d)
    }

    pub fn done_count(&self) -> usize {
        self.done.iter().filter(|d| **d).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFlags {
    Normal,
    Sitemap,
    Robots,
}

/// A unit of work referencing one URL plus context (spec §3, GLOSSARY).
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub url: CanonicalUrl,
    pub referer: Option<CanonicalUrl>,
    pub redirect_depth: u32,
    pub recursion_level: u32,
    pub local_filename: Option<String>,
    pub host_id: HostId,
    pub metalink: Option<Arc<Metalink>>,
    pub flags: JobFlags,
    pub is_redirect: bool,
    pub deferred: bool,
    /// Set when this job is a PART of a parent job's Metalink (spec §4.6).
    pub part: Option<PartJob>,
    /// Transient-failure retry count (spec §4.5 point 5, §7: "retried up
    /// to `tries`").
    pub retries: u32,
    /// Every URL already fetched earlier in this redirect chain, oldest
    /// first (spec §7: "same canonical URL seen twice in one chain are
    /// terminal for the job"). Distinct from the global `Blacklist`
    /// (spec §4.3), which is process-wide at-most-once dedup, not a
    /// per-chain visited set.
    pub redirect_chain: Vec<CanonicalUrl>,
}

#[derive(Debug, Clone)]
pub struct PartJob {
    pub parent: JobId,
    pub piece_index: usize,
    pub mirror_index: usize,
}

impl Job {
    pub fn new_seed(url: CanonicalUrl, host_id: HostId) -> Self {
        Job {
            id: next_job_id(),
            url,
            referer: None,
            redirect_depth: 0,
            recursion_level: 0,
            local_filename: None,
            host_id,
            metalink: None,
            flags: JobFlags::Normal,
            is_redirect: false,
            deferred: false,
            part: None,
            retries: 0,
            redirect_chain: Vec::new(),
        }
    }

    pub fn new_robots(url: CanonicalUrl, host_id: HostId) -> Self {
        let mut job = Job::new_seed(url, host_id);
        job.flags = JobFlags::Robots;
        job
    }

    pub fn child_link(&self, url: CanonicalUrl, host_id: HostId) -> Self {
        Job {
            id: next_job_id(),
            url,
            referer: Some(self.url.clone()),
            redirect_depth: 0,
            recursion_level: self.recursion_level + 1,
            local_filename: None,
            host_id,
            metalink: None,
            flags: JobFlags::Normal,
            is_redirect: false,
            deferred: false,
            part: None,
            retries: 0,
            redirect_chain: Vec::new(),
        }
    }

    /// Builds the job for a redirect target, extending the chain with the
    /// URL being redirected *from* so the next hop can detect a loop
    /// (spec §7).
    pub fn redirect_to(&self, url: CanonicalUrl, host_id: HostId) -> Self {
        let mut redirect_chain = self.redirect_chain.clone();
        redirect_chain.push(self.url.clone());
        Job {
            id: next_job_id(),
            url,
            referer: self.referer.clone(),
            redirect_depth: self.redirect_depth + 1,
            recursion_level: self.recursion_level,
            local_filename: self.local_filename.clone(),
            host_id,
            metalink: None,
            flags: self.flags,
            is_redirect: true,
            deferred: false,
            part: None,
            retries: 0,
            redirect_chain,
        }
    }
}
