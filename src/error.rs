//! Error taxonomy and exit status (spec §6, §7).
//!
//! Two tiers, same split the teacher uses: `thiserror`-derived enums for
//! errors that callers branch on, `anyhow::Error` for orchestration-layer
//! propagation with context. `CapturedError` is kept from the teacher's
//! `error.rs` as the top-level error the CLI entry point unwraps.

use std::sync::atomic::{AtomicU8, Ordering};

use anyhow::Error;
use thiserror::Error as ThisError;

pub struct CapturedError {
    pub inner: Error,
}

impl From<Error> for CapturedError {
    fn from(inner: Error) -> Self {
        Self { inner }
    }
}

/// The exit code taxonomy from spec §6. Lower numbers are more specific
/// and win over higher ones (spec §7: "the lowest-numbered non-zero code
/// among all observed errors wins").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    Generic = 1,
    ParseOrInit = 2,
    Io = 3,
    Network = 4,
    Tls = 5,
    Auth = 6,
    Protocol = 7,
    RemoteMissing = 8,
    Signature = 9,
}

impl ExitCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Kinds of error a job can terminate with (spec §7). `RobotsDisallowed`
/// is deliberately not here: it is an informational drop, not an error
/// (spec §4.2, §7).
#[derive(Debug, ThisError)]
pub enum CoordinatorError {
    #[error("input error: {0}")]
    Input(String),
    #[error("DNS error: {0}")]
    Dns(#[from] crate::dns::resolver::ResolveError),
    #[error("connect error: {0}")]
    Connect(String),
    #[error("TLS handshake error: {0}")]
    TlsHandshake(String),
    #[error("TLS certificate validation error: {0}")]
    TlsCertValidation(String),
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("remote resource missing (404): {0}")]
    RemoteMissing(String),
    #[error("too many redirects (> {0})")]
    RedirectedTooMany(u32),
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("download quota exceeded")]
    QuotaExceeded,
    #[error("integrity check failed: {0}")]
    Integrity(String),
    #[error("cancelled")]
    Cancelled,
}

impl CoordinatorError {
    /// Maps an error kind to the exit code taxonomy (spec §6/§7).
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CoordinatorError::Input(_) => ExitCode::ParseOrInit,
            CoordinatorError::Dns(_) => ExitCode::Network,
            CoordinatorError::Connect(_) => ExitCode::Network,
            CoordinatorError::TlsHandshake(_) => ExitCode::Tls,
            CoordinatorError::TlsCertValidation(_) => ExitCode::Tls,
            CoordinatorError::HttpProtocol(_) => ExitCode::Protocol,
            CoordinatorError::Auth(_) => ExitCode::Auth,
            CoordinatorError::RemoteMissing(_) => ExitCode::RemoteMissing,
            CoordinatorError::RedirectedTooMany(_) => ExitCode::Protocol,
            CoordinatorError::Io(_) => ExitCode::Io,
            CoordinatorError::QuotaExceeded => ExitCode::Generic,
            CoordinatorError::Integrity(_) => ExitCode::Signature,
            CoordinatorError::Cancelled => ExitCode::Generic,
        }
    }
}

/// Process-wide exit status, generalizing the teacher's
/// `pub static SKIP_SSL: Mutex<bool>` global-as-a-treat pattern
/// (`utils/client.rs`) to an atomic with "lowest non-zero wins" update
/// semantics (spec §5, §6).
pub struct ExitStatus(AtomicU8);

impl ExitStatus {
    pub const fn new() -> Self {
        ExitStatus(AtomicU8::new(0))
    }

    /// `set-status(new) = new iff new < current` (spec §5), except that
    /// 0 (success) never overwrites a previously recorded failure.
    pub fn record(&self, code: ExitCode) {
        let new = code.as_u8();
        if new == 0 {
            return;
        }
        let mut current = self.0.load(Ordering::SeqCst);
        loop {
            if current != 0 && current <= new {
                break;
            }
            match self
                .0
                .compare_exchange_weak(current, new, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn current(&self) -> u8 {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for ExitStatus {
    fn default() -> Self {
        Self::new()
    }
}
