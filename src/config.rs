//! Resolved, validated configuration (mirrors the teacher's
//! `InvocationConfig` pattern: parse once at startup, then pass an
//! immutable value to every subsystem instead of re-reading `Cli`).

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{Cli, HttpsEnforce};
use crate::dns::resolver::TimeoutSpec;
use crate::error::{CoordinatorError, ExitCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClobberPolicy {
    NoClobber,
    Timestamping,
    Overwrite,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub seeds: Vec<String>,
    pub input_file: Option<PathBuf>,

    pub recursive: bool,
    pub level: u32,
    pub no_parent: bool,
    pub span_hosts: bool,
    pub include_domains: Vec<String>,
    pub exclude_domains: Vec<String>,
    pub https_only: bool,
    pub https_enforce: HttpsEnforce,
    pub page_requisites: bool,

    pub max_redirect: u32,
    pub tries: u32,
    pub wait: Duration,
    pub waitretry: Duration,
    pub random_wait: bool,

    pub chunk_size: Option<u64>,
    pub metalink: bool,

    pub timestamping: bool,
    pub continue_download: bool,
    pub clobber: ClobberPolicy,
    pub quota: Option<u64>,

    pub threads: usize,
    pub dns_timeout: TimeoutSpec,
    pub connect_timeout: TimeoutSpec,
    pub read_timeout: TimeoutSpec,

    pub user_agent: String,
    pub referer: Option<String>,
    pub extra_headers: Vec<(String, String)>,
    pub user: Option<String>,
    pub password: Option<String>,

    pub robots_enabled: bool,
    pub spider: bool,
    pub directory_prefix: PathBuf,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Config, CoordinatorError> {
        if cli.urls.is_empty() && cli.input_file.is_none() {
            return Err(CoordinatorError::Input("no seed URLs given: pass a URL, -i FILE, or -i -".into()));
        }
        if cli.threads == 0 {
            return Err(CoordinatorError::Input("--threads must be at least 1".into()));
        }

        let mut extra_headers = Vec::with_capacity(cli.header.len());
        for raw in &cli.header {
            let (name, value) = raw
                .split_once(':')
                .ok_or_else(|| CoordinatorError::Input(format!("malformed --header {raw:?}, expected Name: Value")))?;
            extra_headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let clobber = if cli.no_clobber {
            ClobberPolicy::NoClobber
        } else if cli.timestamping {
            ClobberPolicy::Timestamping
        } else {
            ClobberPolicy::Overwrite
        };

        Ok(Config {
            seeds: cli.urls,
            input_file: cli.input_file,
            recursive: cli.recursive,
            level: cli.level,
            no_parent: cli.no_parent,
            span_hosts: cli.span_hosts,
            include_domains: cli.domains,
            exclude_domains: cli.exclude_domains,
            https_only: cli.https_only,
            https_enforce: cli.https_enforce,
            page_requisites: cli.page_requisites,
            max_redirect: cli.max_redirect,
            tries: cli.tries.max(1),
            wait: Duration::from_secs_f64(cli.wait.max(0.0)),
            waitretry: Duration::from_secs_f64(cli.waitretry.max(0.0)),
            random_wait: cli.random_wait,
            chunk_size: cli.chunk_size,
            metalink: cli.metalink,
            timestamping: cli.timestamping,
            continue_download: cli.continue_download,
            clobber,
            quota: cli.quota,
            threads: cli.threads,
            dns_timeout: TimeoutSpec::from_seconds(cli.dns_timeout),
            connect_timeout: TimeoutSpec::from_seconds(cli.connect_timeout),
            read_timeout: TimeoutSpec::from_seconds(cli.read_timeout),
            user_agent: cli.user_agent,
            referer: cli.referer,
            extra_headers,
            user: cli.user,
            password: cli.password,
            robots_enabled: cli.robots,
            spider: cli.spider,
            directory_prefix: cli.directory_prefix,
        })
    }

    pub fn exit_code_for_parse_error() -> ExitCode {
        ExitCode::ParseOrInit
    }

    /// True under `--https-enforce=hard` (spec §4.5, §8 scenario 3): no
    /// fallback from HTTPS to HTTP is permitted.
    pub fn https_enforce_hard(&self) -> bool {
        self.https_enforce == HttpsEnforce::Hard
    }
}
